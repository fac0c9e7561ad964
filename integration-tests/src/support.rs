use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use capsule::board::{Board, BoardEvent, Effect};
use capsule::engine::BoardEventHandler;
use capsule::lock::unlock_instant;
use capsule::model::{Comment, NewComment, NewPost, Post, PostId, Target};
use capsule::store::{EntityStore, MediaKind, MemStore, Seed, StoreError};
use chrono::NaiveDateTime;

/// A [`MemStore`] whose calls can be switched to fail, and which counts them.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemStore,
    pub fail_lists: AtomicBool,
    pub fail_patches: AtomicBool,
    pub fail_creates: AtomicBool,
    pub list_posts_calls: AtomicUsize,
    pub list_comments_calls: AtomicUsize,
    pub patch_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(posts: Vec<Post>, comments: Vec<Comment>) -> Self {
        Self { inner: MemStore::with_seed(Seed { posts, comments }), ..Default::default() }
    }

    pub fn inner(&self) -> &MemStore {
        &self.inner
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted failure".to_string()));
        }
        Ok(())
    }
}

impl EntityStore for FlakyStore {
    fn list_posts(&self) -> Result<Vec<Post>, StoreError> {
        self.list_posts_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_lists)?;
        self.inner.list_posts()
    }

    fn list_comments(&self, parent: &str) -> Result<Vec<Comment>, StoreError> {
        self.list_comments_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_lists)?;
        self.inner.list_comments(parent)
    }

    fn list_comment_counts(&self) -> Result<HashMap<PostId, usize>, StoreError> {
        Self::check(&self.fail_lists)?;
        self.inner.list_comment_counts()
    }

    fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        Self::check(&self.fail_creates)?;
        self.inner.create_post(post)
    }

    fn create_comment(&self, parent: &str, comment: NewComment) -> Result<Comment, StoreError> {
        Self::check(&self.fail_creates)?;
        self.inner.create_comment(parent, comment)
    }

    fn patch_upvotes(&self, target: Target, id: &str, count: u64) -> Result<(), StoreError> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_patches)?;
        self.inner.patch_upvotes(target, id, count)
    }

    fn upload_media(&self, bytes: Vec<u8>, kind: MediaKind) -> Result<String, StoreError> {
        Self::check(&self.fail_creates)?;
        self.inner.upload_media(bytes, kind)
    }
}

#[derive(Clone, Debug, Default)]
pub struct HandlerState {
    pub snapshots: usize,
    pub latest: Option<Board>,
    pub exits: usize,
}

#[derive(Clone, Default)]
pub struct RecordingHandler {
    state: Arc<Mutex<HandlerState>>,
}

impl RecordingHandler {
    pub fn new() -> (Self, Arc<Mutex<HandlerState>>) {
        let state = Arc::new(Mutex::new(HandlerState::default()));
        (Self { state: Arc::clone(&state) }, state)
    }
}

impl BoardEventHandler for RecordingHandler {
    fn on_snapshot(&self, board: &Board) {
        let mut guard = self.state.lock().expect("handler state poisoned");
        guard.snapshots += 1;
        guard.latest = Some(board.clone());
    }

    fn on_exit(&self, board: &Board) {
        let mut guard = self.state.lock().expect("handler state poisoned");
        guard.exits += 1;
        guard.latest = Some(board.clone());
    }
}

pub fn handler_state_snapshot(state: &Arc<Mutex<HandlerState>>) -> HandlerState {
    state.lock().expect("handler state poisoned").clone()
}

/// Polls the recorded board until `check` holds, for up to two seconds.
pub async fn wait_for(state: &Arc<Mutex<HandlerState>>, check: impl Fn(&Board) -> bool) -> Board {
    for _ in 0..200 {
        if let Some(board) = handler_state_snapshot(state).latest {
            if check(&board) {
                return board;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("board never reached the expected state");
}

pub fn at(date: &str, time: &str) -> NaiveDateTime {
    unlock_instant(date, time).expect("valid instant")
}

pub fn post(id: &str, date: &str, upvotes: u64) -> Post {
    Post {
        id: id.to_string(),
        content: format!("capsule {id}"),
        author_name: None,
        post_date: date.to_string(),
        post_time: "12:00".to_string(),
        is_locked: false,
        unlock_date: None,
        unlock_time: None,
        original_date: None,
        upvotes,
        image_urls: Vec::new(),
        audio_url: None,
    }
}

pub fn sealed(id: &str, date: &str, unlock_date: &str, unlock_time: &str) -> Post {
    Post {
        is_locked: true,
        unlock_date: Some(unlock_date.to_string()),
        unlock_time: Some(unlock_time.to_string()),
        ..post(id, date, 0)
    }
}

pub fn comment(id: &str, parent: &str) -> Comment {
    Comment {
        id: id.to_string(),
        post_id: parent.to_string(),
        content: format!("comment {id}"),
        author_name: None,
        post_date: "2025-01-01".to_string(),
        post_time: "12:00".to_string(),
        is_locked: false,
        unlock_date: None,
        unlock_time: None,
        upvotes: 0,
    }
}

/// Generation of the posts fetch among `effects`.
pub fn fetch_generation(effects: &[Effect]) -> u64 {
    effects
        .iter()
        .find_map(|e| match e {
            Effect::FetchPosts { generation } => Some(*generation),
            _ => None,
        })
        .expect("expected a posts fetch")
}

/// Drives a board through a reload that answers with `posts`.
pub fn reload_with(board: &Board, now: NaiveDateTime, posts: Vec<Post>) -> Board {
    let (board, effects) = board.apply(BoardEvent::Relock { now });
    let generation = fetch_generation(&effects);
    let (board, _) = board.apply(BoardEvent::PostsLoaded { generation, result: Ok(posts) });
    board
}
