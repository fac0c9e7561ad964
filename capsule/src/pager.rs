//! A bounded, independently expandable window over the chronological
//! collection, anchored at today.

use std::ops::Range;
use std::sync::Arc;

use chrono::NaiveDateTime;
use log::debug;

use crate::lock;
use crate::model::Capsule;
use crate::timeline::today_key;

pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Past,
    Future,
}

/// A pending page expansion, only valid against the generation it was
/// issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub generation: Generation,
    pub direction: Direction,
    pub range: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    Applied { added: usize },
    /// A newer load replaced the backing collection first.
    Stale,
    /// Nothing was in flight for this ticket.
    Unexpected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    Stale,
}

/// Sorts capsules ascending by their anchor date, then anchor time. Stable.
pub fn sort_by_anchor<C: Capsule>(items: &mut [C], now: NaiveDateTime) {
    items.sort_by(|a, b| {
        (lock::anchor_date(a, now), lock::anchor_time(a, now)).cmp(&(lock::anchor_date(b, now), lock::anchor_time(b, now)))
    });
}

#[derive(Debug, Clone)]
pub struct Pager<C> {
    page_size: usize,
    backing: Arc<Vec<C>>,
    window: Range<usize>,
    has_past: bool,
    has_future: bool,
    issued: Generation,
    applied: Generation,
    initial_load_pending: bool,
    expanding: Option<Direction>,
}

impl<C: Capsule + Clone> Pager<C> {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            backing: Arc::new(Vec::new()),
            window: 0..0,
            has_past: false,
            has_future: false,
            issued: 0,
            applied: 0,
            initial_load_pending: false,
            expanding: None,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn window(&self) -> &[C] {
        &self.backing[self.window.clone()]
    }

    pub fn window_range(&self) -> Range<usize> {
        self.window.clone()
    }

    pub fn backing(&self) -> &[C] {
        &self.backing
    }

    pub fn backing_mut(&mut self) -> &mut [C] {
        Arc::make_mut(&mut self.backing).as_mut_slice()
    }

    pub fn has_past(&self) -> bool {
        self.has_past
    }

    pub fn has_future(&self) -> bool {
        self.has_future
    }

    /// Generation of the collection currently backing the window.
    pub fn generation(&self) -> Generation {
        self.applied
    }

    pub fn is_loading_initial(&self) -> bool {
        self.initial_load_pending
    }

    pub fn is_expanding(&self) -> bool {
        self.expanding.is_some()
    }

    /// Tags a new full fetch. The first one also blocks expansion until it lands.
    pub fn begin_load(&mut self) -> Generation {
        self.issued += 1;
        if self.applied == 0 {
            self.initial_load_pending = true;
        }
        self.issued
    }

    /// Replaces the backing collection and re-derives the window from scratch.
    pub fn finish_load(&mut self, generation: Generation, mut items: Vec<C>, now: NaiveDateTime) -> LoadOutcome {
        if generation <= self.applied {
            debug!("[Pager] dropping load {generation}, already at {}", self.applied);
            return LoadOutcome::Stale;
        }
        sort_by_anchor(&mut items, now);
        self.backing = Arc::new(items);
        self.applied = generation;
        self.initial_load_pending = false;
        // Any expansion in flight was computed against the old collection.
        self.expanding = None;
        self.window = anchored_window(&self.backing, self.page_size, now);
        self.refresh_flags();
        LoadOutcome::Applied
    }

    /// Marks a load as failed. Only matters for the initial one.
    pub fn abort_load(&mut self, generation: Generation) {
        if generation == self.issued && self.applied == 0 {
            self.initial_load_pending = false;
        }
    }

    pub fn begin_expand_past(&mut self) -> Option<Expansion> {
        if !self.can_expand() || !self.has_past {
            return None;
        }
        let start = self.window.start.saturating_sub(self.page_size);
        self.expanding = Some(Direction::Past);
        Some(Expansion { generation: self.applied, direction: Direction::Past, range: start..self.window.start })
    }

    pub fn begin_expand_future(&mut self) -> Option<Expansion> {
        if !self.can_expand() || !self.has_future {
            return None;
        }
        let end = (self.window.end + self.page_size).min(self.backing.len());
        self.expanding = Some(Direction::Future);
        Some(Expansion { generation: self.applied, direction: Direction::Future, range: self.window.end..end })
    }

    pub fn apply_expansion(&mut self, expansion: &Expansion) -> ExpandOutcome {
        if expansion.generation != self.applied {
            return ExpandOutcome::Stale;
        }
        if self.expanding != Some(expansion.direction) {
            return ExpandOutcome::Unexpected;
        }
        self.expanding = None;
        let added = expansion.range.len();
        match expansion.direction {
            Direction::Past if expansion.range.end == self.window.start => self.window.start = expansion.range.start,
            Direction::Future if expansion.range.start == self.window.end => self.window.end = expansion.range.end,
            _ => return ExpandOutcome::Unexpected,
        }
        self.refresh_flags();
        ExpandOutcome::Applied { added }
    }

    /// Convenience for callers that need no suspension between the phases.
    pub fn expand_past(&mut self) -> bool {
        match self.begin_expand_past() {
            Some(ticket) => matches!(self.apply_expansion(&ticket), ExpandOutcome::Applied { .. }),
            None => false,
        }
    }

    pub fn expand_future(&mut self) -> bool {
        match self.begin_expand_future() {
            Some(ticket) => matches!(self.apply_expansion(&ticket), ExpandOutcome::Applied { .. }),
            None => false,
        }
    }

    fn can_expand(&self) -> bool {
        !self.initial_load_pending && self.expanding.is_none()
    }

    fn refresh_flags(&mut self) {
        self.has_past = self.window.start > 0;
        self.has_future = self.window.end < self.backing.len();
    }
}

fn anchored_window<C: Capsule>(items: &[C], page_size: usize, now: NaiveDateTime) -> Range<usize> {
    let today = today_key(now);
    match items.iter().position(|c| lock::anchor_date(c, now) >= today.as_str()) {
        Some(start) => start..(start + page_size).min(items.len()),
        None => items.len().saturating_sub(page_size)..items.len(),
    }
}
