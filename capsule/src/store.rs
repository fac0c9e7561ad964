//! The entity store the board reads from and writes to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::model::{Comment, NewComment, NewPost, Post, PostId, Target};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("internal error")]
    Internal,
    #[error("{target:?} {id} not found")]
    NotFound { target: Target, id: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
        }
    }
}

pub type Store = Arc<dyn EntityStore + Send + Sync + 'static>;

/// Blocking store calls. The engine runs them off the event loop.
pub trait EntityStore {
    fn list_posts(&self) -> Result<Vec<Post>, StoreError>;
    fn list_comments(&self, parent: &str) -> Result<Vec<Comment>, StoreError>;
    fn list_comment_counts(&self) -> Result<HashMap<PostId, usize>, StoreError>;

    fn create_post(&self, post: NewPost) -> Result<Post, StoreError>;
    fn create_comment(&self, parent: &str, comment: NewComment) -> Result<Comment, StoreError>;
    fn patch_upvotes(&self, target: Target, id: &str, count: u64) -> Result<(), StoreError>;

    /// Stores a media blob and returns the URL it can be fetched from.
    fn upload_media(&self, bytes: Vec<u8>, kind: MediaKind) -> Result<String, StoreError>;
}

/// Shape of a seed file: posts plus their comments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[cfg(feature = "mem-store")]
#[derive(Default)]
pub struct MemStore {
    posts: Mutex<Vec<Post>>,
    comments: Mutex<Vec<Comment>>,
    media: Mutex<HashMap<String, (MediaKind, Vec<u8>)>>,
    next_id: Mutex<u64>,
}

#[cfg(feature = "mem-store")]
impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: Seed) -> Self {
        let next = seed
            .posts
            .iter()
            .map(|p| p.id.as_str())
            .chain(seed.comments.iter().map(|c| c.id.as_str()))
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Self { posts: Mutex::new(seed.posts), comments: Mutex::new(seed.comments), media: Mutex::default(), next_id: Mutex::new(next) }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::with_seed(serde_json::from_str(raw)?))
    }

    pub fn into_shared(self) -> Store {
        Arc::new(self)
    }

    pub fn media_len(&self) -> Result<usize, StoreError> {
        Ok(self.media.lock().map_err(|_| StoreError::Internal)?.len())
    }

    fn allocate_id(&self) -> Result<String, StoreError> {
        let mut next = self.next_id.lock().map_err(|_| StoreError::Internal)?;
        *next += 1;
        Ok((*next).to_string())
    }
}

#[cfg(feature = "mem-store")]
impl EntityStore for MemStore {
    fn list_posts(&self) -> Result<Vec<Post>, StoreError> {
        let mut posts = self.posts.lock().map_err(|_| StoreError::Internal)?.clone();
        posts.sort_by(|a, b| (a.post_date.as_str(), a.post_time.as_str()).cmp(&(b.post_date.as_str(), b.post_time.as_str())));
        Ok(posts)
    }

    fn list_comments(&self, parent: &str) -> Result<Vec<Comment>, StoreError> {
        let mut out: Vec<Comment> =
            self.comments.lock().map_err(|_| StoreError::Internal)?.iter().filter(|c| c.post_id == parent).cloned().collect();
        out.sort_by(|a, b| (a.post_date.as_str(), a.post_time.as_str()).cmp(&(b.post_date.as_str(), b.post_time.as_str())));
        Ok(out)
    }

    fn list_comment_counts(&self) -> Result<HashMap<PostId, usize>, StoreError> {
        let mut counts = HashMap::new();
        for comment in self.comments.lock().map_err(|_| StoreError::Internal)?.iter() {
            *counts.entry(comment.post_id.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let id = self.allocate_id()?;
        let created = Post {
            id,
            content: post.content,
            author_name: post.author_name,
            post_date: post.post_date,
            post_time: post.post_time,
            is_locked: post.is_locked,
            unlock_date: post.unlock_date,
            unlock_time: post.unlock_time,
            original_date: post.original_date,
            upvotes: 0,
            image_urls: post.image_urls,
            audio_url: post.audio_url,
        };
        self.posts.lock().map_err(|_| StoreError::Internal)?.push(created.clone());
        Ok(created)
    }

    fn create_comment(&self, parent: &str, comment: NewComment) -> Result<Comment, StoreError> {
        if !self.posts.lock().map_err(|_| StoreError::Internal)?.iter().any(|p| p.id == parent) {
            return Err(StoreError::NotFound { target: Target::Post, id: parent.to_string() });
        }
        let id = self.allocate_id()?;
        let created = Comment {
            id,
            post_id: parent.to_string(),
            content: comment.content,
            author_name: comment.author_name,
            post_date: comment.post_date,
            post_time: comment.post_time,
            is_locked: comment.is_locked,
            unlock_date: comment.unlock_date,
            unlock_time: comment.unlock_time,
            upvotes: 0,
        };
        self.comments.lock().map_err(|_| StoreError::Internal)?.push(created.clone());
        Ok(created)
    }

    fn patch_upvotes(&self, target: Target, id: &str, count: u64) -> Result<(), StoreError> {
        let not_found = || StoreError::NotFound { target, id: id.to_string() };
        match target {
            Target::Post => {
                let mut posts = self.posts.lock().map_err(|_| StoreError::Internal)?;
                posts.iter_mut().find(|p| p.id == id).ok_or_else(not_found)?.upvotes = count;
            }
            Target::Comment => {
                let mut comments = self.comments.lock().map_err(|_| StoreError::Internal)?;
                comments.iter_mut().find(|c| c.id == id).ok_or_else(not_found)?.upvotes = count;
            }
        }
        Ok(())
    }

    fn upload_media(&self, bytes: Vec<u8>, kind: MediaKind) -> Result<String, StoreError> {
        let key = format!("{}-{}", kind.as_str(), self.allocate_id()?);
        let url = format!("mem://media/{key}");
        self.media.lock().map_err(|_| StoreError::Internal)?.insert(key, (kind, bytes));
        Ok(url)
    }
}
