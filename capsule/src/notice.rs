use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

/// Oldest notices are dropped beyond this.
const MAX_NOTICES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub raised_at: NaiveDateTime,
}

/// Short-lived messages for the user, expired on the display tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notices {
    ttl: Duration,
    items: Vec<Notice>,
}

impl Notices {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, items: Vec::new() }
    }

    pub fn push(&mut self, level: NoticeLevel, message: impl Into<String>, now: NaiveDateTime) {
        self.items.push(Notice { level, message: message.into(), raised_at: now });
        if self.items.len() > MAX_NOTICES {
            let overflow = self.items.len() - MAX_NOTICES;
            self.items.drain(..overflow);
        }
    }

    pub fn info(&mut self, message: impl Into<String>, now: NaiveDateTime) {
        self.push(NoticeLevel::Info, message, now);
    }

    pub fn success(&mut self, message: impl Into<String>, now: NaiveDateTime) {
        self.push(NoticeLevel::Success, message, now);
    }

    pub fn error(&mut self, message: impl Into<String>, now: NaiveDateTime) {
        self.push(NoticeLevel::Error, message, now);
    }

    /// Drops every notice older than the ttl. Returns whether anything expired.
    pub fn tick(&mut self, now: NaiveDateTime) -> bool {
        let before = self.items.len();
        let ttl = self.ttl;
        self.items.retain(|n| now - n.raised_at <= ttl);
        before != self.items.len()
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.items.last()
    }

    pub fn all(&self) -> &[Notice] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::unlock_instant;

    #[test]
    fn notices_expire_after_ttl() {
        let start = unlock_instant("2025-01-01", "10:00:00").unwrap();
        let mut notices = Notices::new(Duration::seconds(3));
        notices.error("could not save upvote", start);
        assert!(!notices.tick(start + Duration::seconds(3)));
        assert_eq!(notices.latest().map(|n| n.level), Some(NoticeLevel::Error));
        assert!(notices.tick(start + Duration::seconds(4)));
        assert!(notices.is_empty());
    }

    #[test]
    fn oldest_notices_are_dropped_first() {
        let now = unlock_instant("2025-01-01", "10:00").unwrap();
        let mut notices = Notices::new(Duration::seconds(3));
        for i in 0..7 {
            notices.info(format!("n{i}"), now);
        }
        assert_eq!(notices.all().len(), MAX_NOTICES);
        assert_eq!(notices.all()[0].message, "n2");
    }
}
