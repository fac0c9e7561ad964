//! Authoring input for new capsules and comments, validated before anything is
//! sent to the store.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::BoardConfig;
use crate::lock::{self, LockError};
use crate::model::{NewComment, NewPost};
use crate::store::MediaKind;
use crate::timeline::DATE_KEY_FORMAT;

pub const TIME_FORMAT: &str = "%H:%M";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("message is empty")]
    EmptyContent,
    #[error("message is {len} characters, the limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error(transparent)]
    Unlock(#[from] LockError),
    #[error("unlock time must be in the future")]
    UnlockNotInFuture,
    #[error("cannot backdate into the future")]
    BackdateInFuture,
    #[error("{kind:?} file is {size} bytes, the limit is {max}")]
    MediaTooLarge { kind: MediaKind, size: usize, max: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    #[default]
    Publish,
    UnlockAt {
        date: String,
        time: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    pub content: String,
    pub author_name: Option<String>,
    pub schedule: Schedule,
    /// Files the capsule on an earlier day than it was written.
    pub backdate: Option<NaiveDate>,
    pub image_urls: Vec<String>,
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub content: String,
    pub author_name: Option<String>,
    pub schedule: Schedule,
}

fn check_content(content: &str, config: &BoardConfig) -> Result<String, DraftError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(DraftError::EmptyContent);
    }
    let len = trimmed.chars().count();
    if len > config.max_content_chars {
        return Err(DraftError::TooLong { len, max: config.max_content_chars });
    }
    Ok(trimmed.to_string())
}

/// Returns `(is_locked, unlock_date, unlock_time)` in store form.
fn check_schedule(schedule: &Schedule, now: NaiveDateTime) -> Result<(bool, Option<String>, Option<String>), DraftError> {
    match schedule {
        Schedule::Publish => Ok((false, None, None)),
        Schedule::UnlockAt { date, time } => {
            let at = lock::unlock_instant(date, time)?;
            if at <= now {
                return Err(DraftError::UnlockNotInFuture);
            }
            Ok((true, Some(at.format(DATE_KEY_FORMAT).to_string()), Some(at.format(TIME_FORMAT).to_string())))
        }
    }
}

fn clean_author(author: &Option<String>) -> Option<String> {
    author.as_deref().map(str::trim).filter(|a| !a.is_empty()).map(str::to_string)
}

pub fn check_media(kind: MediaKind, size: usize, config: &BoardConfig) -> Result<(), DraftError> {
    let max = match kind {
        MediaKind::Image => config.max_image_bytes,
        MediaKind::Audio => config.max_audio_bytes,
    };
    if size > max {
        return Err(DraftError::MediaTooLarge { kind, size, max });
    }
    Ok(())
}

impl PostDraft {
    pub fn validate(&self, config: &BoardConfig, now: NaiveDateTime) -> Result<NewPost, DraftError> {
        let content = check_content(&self.content, config)?;
        let (is_locked, unlock_date, unlock_time) = check_schedule(&self.schedule, now)?;
        let written_on = now.date();
        let (post_date, original_date) = match self.backdate {
            Some(day) if day > written_on => return Err(DraftError::BackdateInFuture),
            Some(day) if day < written_on => {
                (day.format(DATE_KEY_FORMAT).to_string(), Some(written_on.format(DATE_KEY_FORMAT).to_string()))
            }
            _ => (written_on.format(DATE_KEY_FORMAT).to_string(), None),
        };
        Ok(NewPost {
            content,
            author_name: clean_author(&self.author_name),
            post_date,
            post_time: now.format(TIME_FORMAT).to_string(),
            is_locked,
            unlock_date,
            unlock_time,
            original_date,
            image_urls: self.image_urls.clone(),
            audio_url: self.audio_url.clone(),
        })
    }
}

impl CommentDraft {
    pub fn validate(&self, config: &BoardConfig, now: NaiveDateTime) -> Result<NewComment, DraftError> {
        let content = check_content(&self.content, config)?;
        let (is_locked, unlock_date, unlock_time) = check_schedule(&self.schedule, now)?;
        Ok(NewComment {
            content,
            author_name: clean_author(&self.author_name),
            post_date: now.format(DATE_KEY_FORMAT).to_string(),
            post_time: now.format(TIME_FORMAT).to_string(),
            is_locked,
            unlock_date,
            unlock_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::unlock_instant;

    fn now() -> NaiveDateTime {
        unlock_instant("2025-06-01", "14:30").unwrap()
    }

    fn draft(content: &str) -> PostDraft {
        PostDraft { content: content.to_string(), ..Default::default() }
    }

    #[test]
    fn publish_now_is_filed_today() {
        let post = draft("  hello future  ").validate(&BoardConfig::default(), now()).unwrap();
        assert_eq!(post.content, "hello future");
        assert_eq!(post.post_date, "2025-06-01");
        assert_eq!(post.post_time, "14:30");
        assert!(!post.is_locked);
        assert!(post.original_date.is_none());
        assert!(post.author_name.is_none());
    }

    #[test]
    fn rejects_empty_and_oversized_content() {
        let config = BoardConfig { max_content_chars: 5, ..Default::default() };
        assert_eq!(draft("   ").validate(&config, now()), Err(DraftError::EmptyContent));
        assert_eq!(draft("çok uzun").validate(&config, now()), Err(DraftError::TooLong { len: 8, max: 5 }));
    }

    #[test]
    fn schedule_must_be_valid_and_in_future() {
        let config = BoardConfig::default();
        let mut d = draft("later");
        d.schedule = Schedule::UnlockAt { date: "2025-06-01".to_string(), time: "14:30".to_string() };
        assert_eq!(d.validate(&config, now()), Err(DraftError::UnlockNotInFuture));

        d.schedule = Schedule::UnlockAt { date: "2025-13-01".to_string(), time: "10:00".to_string() };
        assert!(matches!(d.validate(&config, now()), Err(DraftError::Unlock(LockError::Date(_)))));

        d.schedule = Schedule::UnlockAt { date: "2026-01-01".to_string(), time: "09:05:00".to_string() };
        let post = d.validate(&config, now()).unwrap();
        assert!(post.is_locked);
        assert_eq!(post.unlock_date.as_deref(), Some("2026-01-01"));
        assert_eq!(post.unlock_time.as_deref(), Some("09:05"));
    }

    #[test]
    fn backdate_keeps_real_authoring_date() {
        let config = BoardConfig::default();
        let mut d = draft("remember this");
        d.backdate = NaiveDate::from_ymd_opt(2024, 12, 31);
        let post = d.validate(&config, now()).unwrap();
        assert_eq!(post.post_date, "2024-12-31");
        assert_eq!(post.original_date.as_deref(), Some("2025-06-01"));

        d.backdate = NaiveDate::from_ymd_opt(2025, 6, 2);
        assert_eq!(d.validate(&config, now()), Err(DraftError::BackdateInFuture));
    }

    #[test]
    fn media_sizes_are_capped() {
        let config = BoardConfig { max_image_bytes: 10, ..Default::default() };
        assert!(check_media(MediaKind::Image, 10, &config).is_ok());
        assert_eq!(
            check_media(MediaKind::Image, 11, &config),
            Err(DraftError::MediaTooLarge { kind: MediaKind::Image, size: 11, max: 10 })
        );
        assert!(check_media(MediaKind::Audio, 11, &config).is_ok());
    }

    #[test]
    fn comment_author_is_trimmed() {
        let d = CommentDraft { content: "hi".to_string(), author_name: Some("  Elif ".to_string()), schedule: Schedule::Publish };
        let comment = d.validate(&BoardConfig::default(), now()).unwrap();
        assert_eq!(comment.author_name.as_deref(), Some("Elif"));
        assert_eq!(comment.post_date, "2025-06-01");
    }
}
