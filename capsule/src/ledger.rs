//! At-most-once-per-client upvotes with optimistic application.
//!
//! An upvote is applied locally right away and handed back as an
//! [`UpvoteRollback`]. Once persistence reports back, failed upvotes are
//! undone through [`Ledger::rollback`]. Settlements are released strictly in
//! issue order, so rollbacks never overtake an earlier upvote.

use std::collections::{HashSet, VecDeque};

use log::{debug, info};

use crate::model::{Capsule, PostId, Target};
use crate::pager::Generation;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("already upvoted {0}")]
    AlreadyEngaged(String),
    #[error("nothing to upvote with id {0}")]
    UnknownId(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpvoteRollback {
    pub seq: u64,
    pub target: Target,
    pub id: String,
    /// Parent post for comment upvotes.
    pub parent: Option<PostId>,
    pub prev_count: u64,
    pub new_count: u64,
    /// Collection generation the optimistic patch was applied to.
    pub generation: Generation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    Confirmed(UpvoteRollback),
    Failed(UpvoteRollback),
}

#[derive(Clone, Debug)]
struct Pending {
    rollback: UpvoteRollback,
    outcome: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct Ledger {
    target: Target,
    engaged: HashSet<String>,
    pending: VecDeque<Pending>,
    next_seq: u64,
}

impl Ledger {
    pub fn new(target: Target, engaged: HashSet<String>) -> Self {
        Self { target, engaged, pending: VecDeque::new(), next_seq: 1 }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn is_engaged(&self, id: &str) -> bool {
        self.engaged.contains(id)
    }

    pub fn engaged(&self) -> &HashSet<String> {
        &self.engaged
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Applies an optimistic upvote to `id` within `items`.
    pub fn upvote<C: Capsule>(
        &mut self,
        items: &mut [C],
        id: &str,
        parent: Option<PostId>,
        generation: Generation,
    ) -> Result<UpvoteRollback, LedgerError> {
        if self.engaged.contains(id) {
            debug!("[Ledger] {} {id} already engaged", self.target.as_str());
            return Err(LedgerError::AlreadyEngaged(id.to_string()));
        }
        let item = items.iter_mut().find(|c| c.id() == id).ok_or_else(|| LedgerError::UnknownId(id.to_string()))?;
        let prev_count = item.upvotes();
        let new_count = prev_count.saturating_add(1);
        item.set_upvotes(new_count);
        self.engaged.insert(id.to_string());

        let rollback =
            UpvoteRollback { seq: self.next_seq, target: self.target, id: id.to_string(), parent, prev_count, new_count, generation };
        self.next_seq += 1;
        self.pending.push_back(Pending { rollback: rollback.clone(), outcome: None });
        Ok(rollback)
    }

    /// Records the persistence outcome for `seq` and releases every settlement
    /// that is now at the head of the queue.
    pub fn settle(&mut self, seq: u64, persisted: bool) -> Vec<Settlement> {
        if let Some(entry) = self.pending.iter_mut().find(|p| p.rollback.seq == seq) {
            entry.outcome = Some(persisted);
        }
        let mut released = Vec::new();
        while let Some(Pending { outcome: Some(persisted), .. }) = self.pending.front() {
            let persisted = *persisted;
            let Some(entry) = self.pending.pop_front() else { break };
            released.push(if persisted { Settlement::Confirmed(entry.rollback) } else { Settlement::Failed(entry.rollback) });
        }
        released
    }

    /// Undoes a failed upvote. The count is only restored if the collection
    /// has not been re-fetched since; a newer fetch already carries the
    /// authoritative count.
    pub fn rollback<C: Capsule>(&mut self, items: &mut [C], rollback: &UpvoteRollback, generation: Generation) -> bool {
        let unmarked = self.engaged.remove(&rollback.id);
        if rollback.generation == generation {
            if let Some(item) = items.iter_mut().find(|c| c.id() == rollback.id) {
                item.set_upvotes(rollback.prev_count);
            }
        }
        info!("[Ledger] rolled back upvote on {} {}", rollback.target.as_str(), rollback.id);
        unmarked
    }
}
