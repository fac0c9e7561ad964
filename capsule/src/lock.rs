//! Lock evaluation: whether a capsule is open at a given instant, and how long
//! until it opens. Everything here is a pure function of its inputs.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::model::Capsule;

const DAYS_PER_YEAR: i64 = 365;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("malformed unlock date '{0}'")]
    Date(String),
    #[error("malformed unlock time '{0}'")]
    Time(String),
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, LockError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| LockError::Date(raw.to_string()))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(raw: &str) -> Result<NaiveTime, LockError> {
    let raw_trimmed = raw.trim();
    NaiveTime::parse_from_str(raw_trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw_trimmed, "%H:%M"))
        .map_err(|_| LockError::Time(raw.to_string()))
}

pub fn unlock_instant(date: &str, time: &str) -> Result<NaiveDateTime, LockError> {
    Ok(parse_date(date)?.and_time(parse_time(time)?))
}

/// True once `now` has reached the unlock instant.
///
/// Missing or malformed fields fail open: such a capsule is always readable.
pub fn is_unlocked(unlock_date: Option<&str>, unlock_time: Option<&str>, now: NaiveDateTime) -> bool {
    let (Some(date), Some(time)) = (unlock_date, unlock_time) else {
        return true;
    };
    match unlock_instant(date, time) {
        Ok(at) => now >= at,
        Err(_) => true,
    }
}

/// Effective lock state of a capsule, ignoring its persisted flag.
pub fn is_locked<C: Capsule + ?Sized>(capsule: &C, now: NaiveDateTime) -> bool {
    !is_unlocked(capsule.unlock_date(), capsule.unlock_time(), now)
}

/// The date a capsule is filed under: its unlock date while locked, its post
/// date otherwise.
pub fn anchor_date<'a, C: Capsule + ?Sized>(capsule: &'a C, now: NaiveDateTime) -> &'a str {
    match capsule.unlock_date() {
        Some(date) if is_locked(capsule, now) => date.trim(),
        _ => capsule.post_date().trim(),
    }
}

/// Companion of [`anchor_date`] used to order capsules filed on the same day.
pub fn anchor_time<'a, C: Capsule + ?Sized>(capsule: &'a C, now: NaiveDateTime) -> &'a str {
    match capsule.unlock_time() {
        Some(time) if is_locked(capsule, now) => time.trim(),
        _ => capsule.post_time().trim(),
    }
}

/// Remaining time until a capsule opens, bucketed for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Countdown {
    Open,
    MinutesHours { hours: i64, minutes: i64 },
    DaysHours { days: i64, hours: i64 },
    YearsDays { years: i64, days: i64 },
    Invalid,
}

impl Countdown {
    pub fn is_open(&self) -> bool {
        matches!(self, Countdown::Open)
    }
}

fn unit(f: &mut fmt::Formatter<'_>, n: i64, singular: &str) -> fmt::Result {
    if n == 1 {
        write!(f, "{n} {singular}")
    } else {
        write!(f, "{n} {singular}s")
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Countdown::Open => write!(f, "open"),
            Countdown::Invalid => write!(f, "invalid date"),
            Countdown::MinutesHours { hours, minutes } => {
                if hours > 0 {
                    unit(f, hours, "hour")?;
                    write!(f, " ")?;
                }
                unit(f, minutes, "minute")
            }
            Countdown::DaysHours { days, hours } => {
                unit(f, days, "day")?;
                write!(f, " ")?;
                unit(f, hours, "hour")
            }
            Countdown::YearsDays { years, days } => {
                unit(f, years, "year")?;
                write!(f, " ")?;
                unit(f, days, "day")
            }
        }
    }
}

/// Classifies the time left until `unlock_date unlock_time`.
///
/// Absent fields read as already open, malformed ones as [`Countdown::Invalid`].
pub fn countdown(unlock_date: Option<&str>, unlock_time: Option<&str>, now: NaiveDateTime) -> Countdown {
    let (Some(date), Some(time)) = (unlock_date, unlock_time) else {
        return Countdown::Open;
    };
    let Ok(at) = unlock_instant(date, time) else {
        return Countdown::Invalid;
    };
    if now >= at {
        return Countdown::Open;
    }
    let remaining = at - now;
    let days = remaining.num_days();
    let hours = remaining.num_hours() % 24;
    if days < 1 {
        // Round partial minutes up so the last minute never shows as "0 minutes".
        let total_minutes = (remaining.num_seconds() + 59) / 60;
        if total_minutes >= 24 * 60 {
            return Countdown::DaysHours { days: 1, hours: 0 };
        }
        return Countdown::MinutesHours { hours: total_minutes / 60, minutes: total_minutes % 60 };
    }
    if days <= DAYS_PER_YEAR {
        return Countdown::DaysHours { days, hours };
    }
    Countdown::YearsDays { years: days / DAYS_PER_YEAR, days: days % DAYS_PER_YEAR }
}

pub fn countdown_for<C: Capsule + ?Sized>(capsule: &C, now: NaiveDateTime) -> Countdown {
    countdown(capsule.unlock_date(), capsule.unlock_time(), now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        unlock_instant(date, time).unwrap()
    }

    #[test]
    fn absent_fields_fail_open() {
        let now = at("2000-01-01", "00:00");
        assert!(is_unlocked(None, None, now));
        assert!(is_unlocked(Some("2099-01-01"), None, now));
        assert!(is_unlocked(None, Some("10:00"), now));
        assert_eq!(countdown(Some("2099-01-01"), None, now), Countdown::Open);
    }

    #[test]
    fn malformed_fields_are_invalid_but_unlocked() {
        let now = at("2025-01-01", "00:00");
        assert!(is_unlocked(Some("2025-13-40"), Some("10:00"), now));
        assert_eq!(countdown(Some("2025-13-40"), Some("10:00"), now), Countdown::Invalid);
        assert_eq!(countdown(Some("2099-01-01"), Some("25:99"), now), Countdown::Invalid);
        assert_eq!(Countdown::Invalid.to_string(), "invalid date");
    }

    #[test]
    fn unlock_is_monotonic_in_time() {
        let date = Some("2025-06-01");
        let time = Some("12:30");
        let mut now = at("2025-05-31", "12:00");
        let mut seen_open = false;
        for _ in 0..200 {
            let open = is_unlocked(date, time, now);
            assert!(!(seen_open && !open), "lock re-closed at {now}");
            seen_open |= open;
            now += chrono::Duration::minutes(17);
        }
        assert!(seen_open);
    }

    #[test]
    fn anchor_keys_are_trimmed() {
        let post = crate::model::Post {
            id: "1".to_string(),
            content: String::new(),
            author_name: None,
            post_date: "2025-01-01 ".to_string(),
            post_time: " 09:00".to_string(),
            is_locked: true,
            unlock_date: Some(" 2025-02-01".to_string()),
            unlock_time: Some("08:00 ".to_string()),
            original_date: None,
            upvotes: 0,
            image_urls: Vec::new(),
            audio_url: None,
        };
        let sealed = at("2025-01-15", "00:00");
        assert_eq!(anchor_date(&post, sealed), "2025-02-01");
        assert_eq!(anchor_time(&post, sealed), "08:00");
        let open = at("2025-03-01", "00:00");
        assert_eq!(anchor_date(&post, open), "2025-01-01");
        assert_eq!(anchor_time(&post, open), "09:00");
    }

    #[test]
    fn boundary_instant_is_open() {
        assert!(is_unlocked(Some("2025-06-01"), Some("12:30"), at("2025-06-01", "12:30")));
        assert!(!is_unlocked(Some("2025-06-01"), Some("12:30:01"), at("2025-06-01", "12:30")));
    }

    #[test]
    fn countdown_categories() {
        let now = at("2025-01-01", "00:00");
        assert_eq!(countdown(Some("2024-12-31"), Some("23:00"), now), Countdown::Open);
        assert_eq!(countdown(Some("2025-01-01"), Some("02:05"), now), Countdown::MinutesHours { hours: 2, minutes: 5 });
        assert_eq!(countdown(Some("2025-01-04"), Some("04:00"), now), Countdown::DaysHours { days: 3, hours: 4 });
        assert_eq!(countdown(Some("2026-01-01"), Some("00:00"), now), Countdown::DaysHours { days: 365, hours: 0 });
        // Seconds short of a full day round up into the day bucket.
        let almost = at("2025-01-01", "00:00:30");
        assert_eq!(countdown(Some("2025-01-02"), Some("00:00"), almost), Countdown::DaysHours { days: 1, hours: 0 });
        assert_eq!(countdown(Some("2025-01-01"), Some("23:59"), almost), Countdown::MinutesHours { hours: 23, minutes: 59 });
    }

    #[test]
    fn year_and_day_countdown() {
        // 2024 is a leap year, so this spans 366 days.
        let c = countdown(Some("2025-01-01"), Some("00:00"), at("2024-01-01", "00:00"));
        assert_eq!(c, Countdown::YearsDays { years: 1, days: 1 });
        assert_eq!(c.to_string(), "1 year 1 day");
    }

    #[test]
    fn countdown_display() {
        assert_eq!(Countdown::MinutesHours { hours: 0, minutes: 1 }.to_string(), "1 minute");
        assert_eq!(Countdown::MinutesHours { hours: 2, minutes: 5 }.to_string(), "2 hours 5 minutes");
        assert_eq!(Countdown::DaysHours { days: 3, hours: 1 }.to_string(), "3 days 1 hour");
        assert_eq!(Countdown::Open.to_string(), "open");
    }

    #[test]
    fn seconds_form_of_time_is_accepted() {
        assert_eq!(parse_time("08:15:30").unwrap(), NaiveTime::from_hms_opt(8, 15, 30).unwrap());
        assert_eq!(parse_time("08:15").unwrap(), NaiveTime::from_hms_opt(8, 15, 0).unwrap());
    }
}
