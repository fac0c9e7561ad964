//! Drives a [`Board`] from timers, user commands and store completions.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, MissedTickBehavior};

use crate::board::{Board, BoardEvent, Effect};
use crate::clock::Clock;
use crate::config::BoardConfig;
use crate::engagement::{EngagementRecord, EngagementStoreError};
use crate::model::Target;
use crate::store::{EntityStore, Store, StoreError};

#[derive(Debug)]
pub enum BoardMsg {
    Command(BoardEvent),
    Exit,
}

/// Observes every snapshot the engine settles on.
pub trait BoardEventHandler {
    fn on_snapshot(&self, board: &Board);
    fn on_exit(&self, _board: &Board) {}
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("engagement record unavailable: {0}")]
    Engagement(#[from] EngagementStoreError),
}

pub struct Engine<H: BoardEventHandler> {
    board: Board,
    store: Store,
    engagement: EngagementRecord,
    clock: Arc<dyn Clock>,
    receiver: UnboundedReceiver<BoardMsg>,
    handlers: Vec<H>,
}

impl<H: BoardEventHandler> Engine<H> {
    pub fn new(
        config: BoardConfig,
        store: Store,
        engagement: EngagementRecord,
        clock: Arc<dyn Clock>,
        receiver: UnboundedReceiver<BoardMsg>,
    ) -> Result<Self, EngineError> {
        let upvoted_posts = engagement.ids(Target::Post)?;
        let upvoted_comments = engagement.ids(Target::Comment)?;
        info!("[Engine] restored {} post and {} comment upvotes", upvoted_posts.len(), upvoted_comments.len());
        let board = Board::new(config, clock.now(), upvoted_posts, upvoted_comments);
        Ok(Self { board, store, engagement, clock, receiver, handlers: Vec::new() })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Runs until [`BoardMsg::Exit`] arrives or every sender is dropped.
    pub async fn start(&mut self, handlers: Vec<H>) {
        self.handlers = handlers;
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<BoardEvent>();

        let mut display = interval(self.board.config().display_tick());
        display.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first relock tick fires immediately and performs the initial load.
        let mut relock = interval(self.board.config().relock_interval());
        relock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(BoardMsg::Command(event)) => event,
                    Some(BoardMsg::Exit) | None => break,
                },
                Some(event) = done_rx.recv() => event,
                _ = relock.tick() => BoardEvent::Relock { now: self.clock.now() },
                _ = display.tick() => BoardEvent::Tick { now: self.clock.now() },
            };
            self.dispatch(event, &done_tx);
        }

        info!("[Engine] exiting");
        for handler in &self.handlers {
            handler.on_exit(&self.board);
        }
    }

    fn dispatch(&mut self, event: BoardEvent, done: &UnboundedSender<BoardEvent>) {
        let (next, effects) = self.board.apply(event);
        self.board = next;
        for effect in effects {
            self.execute(effect, done);
        }
        for handler in &self.handlers {
            handler.on_snapshot(&self.board);
        }
    }

    fn execute(&self, effect: Effect, done: &UnboundedSender<BoardEvent>) {
        debug!("[Engine] executing {effect:?}");
        match effect {
            Effect::FetchPosts { generation } => {
                self.spawn_store(done, |s| s.list_posts(), move |result| BoardEvent::PostsLoaded { generation, result })
            }
            Effect::FetchCounts { generation } => {
                self.spawn_store(done, |s| s.list_comment_counts(), move |result| BoardEvent::CountsLoaded { generation, result })
            }
            Effect::LoadPage(expansion) => {
                // The page is already in memory; it still lands as its own event.
                let _ = done.send(BoardEvent::PageReady { expansion });
            }
            Effect::FetchThread(fetch) => {
                let parent = fetch.parent.clone();
                self.spawn_store(done, move |s| s.list_comments(&parent), move |result| BoardEvent::ThreadLoaded { fetch, result })
            }
            Effect::RecordEngagement { target, id } => match self.engagement.insert(target, &id) {
                Ok(_) => self.spawn_flush(),
                Err(err) => warn!("[Engine] could not record upvote on {} {id}: {err}", target.as_str()),
            },
            Effect::ForgetEngagement { target, id } => match self.engagement.remove(target, &id) {
                Ok(_) => self.spawn_flush(),
                Err(err) => warn!("[Engine] could not forget upvote on {} {id}: {err}", target.as_str()),
            },
            Effect::PatchUpvotes { target, seq, id, count } => self.spawn_store(
                done,
                move |s| s.patch_upvotes(target, &id, count),
                move |result| BoardEvent::UpvoteSettled { target, seq, result },
            ),
            Effect::UploadMedia { kind, bytes } => {
                self.spawn_store(done, move |s| s.upload_media(bytes, kind), move |result| BoardEvent::MediaUploaded { kind, result })
            }
            Effect::CreatePost(post) => {
                self.spawn_store(done, move |s| s.create_post(post), |result| BoardEvent::PostCreated { result })
            }
            Effect::CreateComment { parent, comment } => {
                let owner = parent.clone();
                self.spawn_store(
                    done,
                    move |s| s.create_comment(&owner, comment),
                    move |result| BoardEvent::CommentCreated { parent, result },
                )
            }
        }
    }

    /// Markers are written inline so they stay ordered; only the fsync leaves the loop.
    fn spawn_flush(&self) {
        let engagement = self.engagement.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = engagement.flush() {
                warn!("[Engine] flushing engagement record failed: {err}");
            }
        });
    }

    /// Runs a blocking store call off the loop and feeds its result back in.
    fn spawn_store<T, F, M>(&self, done: &UnboundedSender<BoardEvent>, call: F, into_event: M)
    where
        T: Send + 'static,
        F: FnOnce(&(dyn EntityStore + Send + Sync)) -> Result<T, StoreError> + Send + 'static,
        M: FnOnce(Result<T, StoreError>) -> BoardEvent + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let done = done.clone();
        tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(move || call(store.as_ref())).await {
                Ok(result) => result,
                Err(err) => {
                    warn!("[Engine] store task failed: {err}");
                    Err(StoreError::Internal)
                }
            };
            if done.send(into_event(result)).is_err() {
                debug!("[Engine] completion dropped after exit");
            }
        });
    }
}
