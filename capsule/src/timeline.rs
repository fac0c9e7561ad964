//! Filtering, sorting and date-bucketing of capsules into a timeline.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::lock::{self, Countdown};
use crate::model::Capsule;

pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    All,
    /// Only capsules filed under today's date.
    Today,
    LockedOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Chronological,
    /// Upvotes descending; ties keep their chronological order.
    Popularity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineQuery {
    pub search: String,
    pub filter: FilterMode,
    pub sort: SortMode,
}

impl TimelineQuery {
    pub fn needle(&self) -> Option<String> {
        let trimmed = self.search.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
    }
}

/// What the render layer gets to see of a single capsule.
///
/// `content` is withheld while the capsule is locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapsuleView {
    pub id: String,
    pub author: String,
    pub post_date: String,
    pub post_time: String,
    pub original_date: Option<String>,
    pub unlock_date: Option<String>,
    pub unlock_time: Option<String>,
    pub locked: bool,
    pub countdown: Countdown,
    pub content: Option<String>,
    pub upvotes: u64,
    pub image_urls: Vec<String>,
    pub audio_url: Option<String>,
}

impl CapsuleView {
    pub fn of<C: Capsule + ?Sized>(capsule: &C, now: NaiveDateTime) -> Self {
        let locked = lock::is_locked(capsule, now);
        Self {
            id: capsule.id().to_string(),
            author: capsule.display_author().to_string(),
            post_date: capsule.post_date().to_string(),
            post_time: capsule.post_time().to_string(),
            original_date: capsule.original_date().map(str::to_string),
            unlock_date: capsule.unlock_date().map(str::to_string),
            unlock_time: capsule.unlock_time().map(str::to_string),
            locked,
            countdown: lock::countdown_for(capsule, now),
            content: (!locked).then(|| capsule.content().to_string()),
            upvotes: capsule.upvotes(),
            // Attachments are part of the sealed payload too.
            image_urls: if locked { Vec::new() } else { capsule.image_urls().to_vec() },
            audio_url: if locked { None } else { capsule.audio_url().map(str::to_string) },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateBucket {
    pub date: String,
    pub locked: Vec<CapsuleView>,
    pub unlocked: Vec<CapsuleView>,
}

impl DateBucket {
    fn new(date: String) -> Self {
        Self { date, locked: Vec::new(), unlocked: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.locked.len() + self.unlocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Timeline {
    /// Ascending by date key.
    pub buckets: Vec<DateBucket>,
    pub featured: Option<CapsuleView>,
    /// Number of capsules that survived filtering.
    pub matched: usize,
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket(&self, date: &str) -> Option<&DateBucket> {
        self.buckets.iter().find(|b| b.date == date)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub locked: usize,
    pub total_upvotes: u64,
}

pub fn stats<C: Capsule>(items: &[C], now: NaiveDateTime) -> Stats {
    items.iter().fold(Stats::default(), |mut acc, c| {
        acc.total += 1;
        if lock::is_locked(c, now) {
            acc.locked += 1;
        }
        acc.total_upvotes += c.upvotes();
        acc
    })
}

pub fn today_key(now: NaiveDateTime) -> String {
    now.date().format(DATE_KEY_FORMAT).to_string()
}

fn matches<C: Capsule>(capsule: &C, query: &TimelineQuery, needle: Option<&str>, today: &str, now: NaiveDateTime) -> bool {
    let locked = lock::is_locked(capsule, now);
    let passes_filter = match query.filter {
        FilterMode::All => true,
        FilterMode::Today => lock::anchor_date(capsule, now) == today,
        FilterMode::LockedOnly => locked,
    };
    if !passes_filter {
        return false;
    }
    match needle {
        // Sealed content is never searchable.
        Some(needle) => !locked && capsule.content().to_lowercase().contains(needle),
        None => true,
    }
}

/// Builds the grouped timeline for `items` as seen at `now`.
///
/// Pure: the same input, query and instant always give the same grouping.
pub fn assemble<C: Capsule>(items: &[C], query: &TimelineQuery, now: NaiveDateTime) -> Timeline {
    let needle = query.needle();
    let today = today_key(now);

    let filtered: Vec<&C> = items.iter().filter(|c| matches(*c, query, needle.as_deref(), &today, now)).collect();

    let featured = filtered
        .iter()
        .filter(|c| !lock::is_locked(**c, now))
        .fold(None::<&C>, |best, c| match best {
            Some(b) if b.upvotes() >= c.upvotes() => Some(b),
            _ => Some(*c),
        })
        .map(|c| CapsuleView::of(c, now));

    let ordered: Vec<&C> = match query.sort {
        SortMode::Chronological => filtered,
        SortMode::Popularity => filtered.into_iter().sorted_by_key(|c| Reverse(c.upvotes())).collect(),
    };

    let matched = ordered.len();
    let mut buckets: BTreeMap<String, DateBucket> = BTreeMap::new();
    for capsule in ordered {
        let view = CapsuleView::of(capsule, now);
        let key = lock::anchor_date(capsule, now).to_string();
        let bucket = buckets.entry(key.clone()).or_insert_with(|| DateBucket::new(key));
        if view.locked {
            bucket.locked.push(view);
        } else {
            bucket.unlocked.push(view);
        }
    }

    Timeline { buckets: buckets.into_values().collect(), featured, matched }
}
