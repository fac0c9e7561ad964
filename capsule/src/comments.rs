//! Per-post comment threads: counts fetched eagerly, bodies fetched lazily on
//! first expansion.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use log::debug;
use serde::Serialize;

use crate::lock;
use crate::model::{Comment, PostId};
use crate::timeline::{self, Timeline, TimelineQuery};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadState {
    Loading { request: u64 },
    Loaded(Vec<Comment>),
    Failed,
}

/// A thread fetch tagged with the request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadFetch {
    pub parent: PostId,
    pub request: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadView {
    pub parent: PostId,
    pub count: usize,
    pub locked: usize,
    pub loading: bool,
    pub failed: bool,
    /// Comments grouped by anchor date, same rules as posts.
    pub timeline: Timeline,
}

#[derive(Debug, Clone, Default)]
pub struct CommentThreads {
    counts: HashMap<PostId, usize>,
    threads: HashMap<PostId, ThreadState>,
    expanded: HashSet<PostId>,
    /// Latest outstanding request per parent.
    pending: HashMap<PostId, u64>,
    /// Request whose result is currently loaded, per parent.
    versions: HashMap<PostId, u64>,
    next_request: u64,
}

impl CommentThreads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_counts(&mut self, counts: HashMap<PostId, usize>) {
        self.counts = counts;
    }

    pub fn count(&self, parent: &str) -> usize {
        self.counts.get(parent).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &HashMap<PostId, usize> {
        &self.counts
    }

    pub fn is_expanded(&self, parent: &str) -> bool {
        self.expanded.contains(parent)
    }

    pub fn state(&self, parent: &str) -> Option<&ThreadState> {
        self.threads.get(parent)
    }

    /// Opens a thread. Returns a fetch only if the thread has never been
    /// loaded (or its last load failed).
    pub fn expand(&mut self, parent: &str) -> Option<ThreadFetch> {
        self.expanded.insert(parent.to_string());
        let needs_fetch = matches!(self.threads.get(parent), Some(ThreadState::Failed) | None);
        needs_fetch.then(|| self.issue(parent))
    }

    pub fn collapse(&mut self, parent: &str) {
        self.expanded.remove(parent);
    }

    pub fn toggle(&mut self, parent: &str) -> Option<ThreadFetch> {
        if self.is_expanded(parent) {
            self.collapse(parent);
            None
        } else {
            self.expand(parent)
        }
    }

    /// Forces a fresh fetch, e.g. after a new comment was created.
    pub fn refresh(&mut self, parent: &str) -> ThreadFetch {
        self.issue(parent)
    }

    fn issue(&mut self, parent: &str) -> ThreadFetch {
        self.next_request += 1;
        let request = self.next_request;
        // A refresh keeps showing the old comments until the new ones land.
        if !matches!(self.threads.get(parent), Some(ThreadState::Loaded(_))) {
            self.threads.insert(parent.to_string(), ThreadState::Loading { request });
        }
        self.pending.insert(parent.to_string(), request);
        ThreadFetch { parent: parent.to_string(), request }
    }

    /// Applies a fetch result if it answers the latest request for its parent.
    pub fn finish_fetch(&mut self, fetch: &ThreadFetch, result: Result<Vec<Comment>, ()>) -> bool {
        if self.pending.get(&fetch.parent) != Some(&fetch.request) {
            debug!("[Comments] dropping stale thread fetch {} for {}", fetch.request, fetch.parent);
            return false;
        }
        self.pending.remove(&fetch.parent);
        match result {
            Ok(comments) => {
                self.versions.insert(fetch.parent.clone(), fetch.request);
                self.counts.insert(fetch.parent.clone(), comments.len());
                self.threads.insert(fetch.parent.clone(), ThreadState::Loaded(comments));
            }
            Err(()) => {
                // Cached comments survive a failed refresh.
                if !matches!(self.threads.get(&fetch.parent), Some(ThreadState::Loaded(_))) {
                    self.threads.insert(fetch.parent.clone(), ThreadState::Failed);
                }
            }
        }
        true
    }

    /// Identifies the loaded copy of a thread; changes on every applied fetch.
    pub fn version(&self, parent: &str) -> u64 {
        self.versions.get(parent).copied().unwrap_or(0)
    }

    pub fn comments(&self, parent: &str) -> Option<&[Comment]> {
        match self.threads.get(parent) {
            Some(ThreadState::Loaded(comments)) => Some(comments),
            _ => None,
        }
    }

    pub fn comments_mut(&mut self, parent: &str) -> Option<&mut Vec<Comment>> {
        match self.threads.get_mut(parent) {
            Some(ThreadState::Loaded(comments)) => Some(comments),
            _ => None,
        }
    }

    pub fn bump_count(&mut self, parent: &str) {
        *self.counts.entry(parent.to_string()).or_insert(0) += 1;
    }

    pub fn view(&self, parent: &str, now: NaiveDateTime) -> ThreadView {
        let state = self.threads.get(parent);
        let (timeline, locked) = match state {
            Some(ThreadState::Loaded(comments)) => (
                timeline::assemble(comments, &TimelineQuery::default(), now),
                comments.iter().filter(|c| lock::is_locked(*c, now)).count(),
            ),
            _ => (Timeline::default(), 0),
        };
        ThreadView {
            parent: parent.to_string(),
            count: self.count(parent),
            locked,
            loading: matches!(state, Some(ThreadState::Loading { .. })) || self.pending.contains_key(parent),
            failed: matches!(state, Some(ThreadState::Failed)),
            timeline,
        }
    }
}
