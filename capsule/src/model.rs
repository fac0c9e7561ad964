use serde::{Deserialize, Serialize};

pub type PostId = String;
pub type CommentId = String;

/// Display name used when a capsule was posted without an author.
pub const ANONYMOUS: &str = "Anonymous";

/// A top-level time capsule as stored upstream.
///
/// `is_locked` is kept only because the store carries it; the effective lock
/// state is always derived from the unlock fields and the current clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub content: String,
    #[serde(default)]
    pub author_name: Option<String>,
    pub post_date: String,
    pub post_time: String,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub unlock_date: Option<String>,
    #[serde(default)]
    pub unlock_time: Option<String>,
    #[serde(default)]
    pub original_date: Option<String>,
    #[serde(default)]
    pub upvotes: u64,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

/// A comment scoped to a parent post. Same lock rules as [`Post`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub content: String,
    #[serde(default)]
    pub author_name: Option<String>,
    pub post_date: String,
    pub post_time: String,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub unlock_date: Option<String>,
    #[serde(default)]
    pub unlock_time: Option<String>,
    #[serde(default)]
    pub upvotes: u64,
}

/// Which id namespace an upvote or engagement marker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    Post,
    Comment,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Post => "posts",
            Target::Comment => "comments",
        }
    }
}

/// Shared read access for anything that carries post/unlock timestamps.
pub trait Capsule {
    fn id(&self) -> &str;
    fn content(&self) -> &str;
    fn author_name(&self) -> Option<&str>;
    fn post_date(&self) -> &str;
    fn post_time(&self) -> &str;
    fn unlock_date(&self) -> Option<&str>;
    fn unlock_time(&self) -> Option<&str>;
    fn upvotes(&self) -> u64;
    fn set_upvotes(&mut self, upvotes: u64);

    fn original_date(&self) -> Option<&str> {
        None
    }
    fn image_urls(&self) -> &[String] {
        &[]
    }
    fn audio_url(&self) -> Option<&str> {
        None
    }

    fn display_author(&self) -> &str {
        match self.author_name() {
            Some(name) if !name.trim().is_empty() => name,
            _ => ANONYMOUS,
        }
    }
}

impl Capsule for Post {
    fn id(&self) -> &str {
        &self.id
    }
    fn content(&self) -> &str {
        &self.content
    }
    fn author_name(&self) -> Option<&str> {
        self.author_name.as_deref()
    }
    fn post_date(&self) -> &str {
        &self.post_date
    }
    fn post_time(&self) -> &str {
        &self.post_time
    }
    fn unlock_date(&self) -> Option<&str> {
        self.unlock_date.as_deref()
    }
    fn unlock_time(&self) -> Option<&str> {
        self.unlock_time.as_deref()
    }
    fn upvotes(&self) -> u64 {
        self.upvotes
    }
    fn set_upvotes(&mut self, upvotes: u64) {
        self.upvotes = upvotes;
    }
    fn original_date(&self) -> Option<&str> {
        self.original_date.as_deref()
    }
    fn image_urls(&self) -> &[String] {
        &self.image_urls
    }
    fn audio_url(&self) -> Option<&str> {
        self.audio_url.as_deref()
    }
}

impl Capsule for Comment {
    fn id(&self) -> &str {
        &self.id
    }
    fn content(&self) -> &str {
        &self.content
    }
    fn author_name(&self) -> Option<&str> {
        self.author_name.as_deref()
    }
    fn post_date(&self) -> &str {
        &self.post_date
    }
    fn post_time(&self) -> &str {
        &self.post_time
    }
    fn unlock_date(&self) -> Option<&str> {
        self.unlock_date.as_deref()
    }
    fn unlock_time(&self) -> Option<&str> {
        self.unlock_time.as_deref()
    }
    fn upvotes(&self) -> u64 {
        self.upvotes
    }
    fn set_upvotes(&mut self, upvotes: u64) {
        self.upvotes = upvotes;
    }
}

/// Fields for a post about to be created upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub content: String,
    pub author_name: Option<String>,
    pub post_date: String,
    pub post_time: String,
    pub is_locked: bool,
    pub unlock_date: Option<String>,
    pub unlock_time: Option<String>,
    pub original_date: Option<String>,
    pub image_urls: Vec<String>,
    pub audio_url: Option<String>,
}

/// Fields for a comment about to be created upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub content: String,
    pub author_name: Option<String>,
    pub post_date: String,
    pub post_time: String,
    pub is_locked: bool,
    pub unlock_date: Option<String>,
    pub unlock_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_deserializes_with_missing_optionals() {
        let raw = r#"{"id":"1","content":"hi","post_date":"2025-01-01","post_time":"10:00"}"#;
        let post: Post = serde_json::from_str(raw).unwrap();
        assert_eq!(post.upvotes, 0);
        assert!(!post.is_locked);
        assert!(post.image_urls.is_empty());
        assert_eq!(post.display_author(), ANONYMOUS);
    }

    #[test]
    fn blank_author_displays_as_anonymous() {
        let raw = r#"{"id":"c1","post_id":"1","content":"x","author_name":"  ","post_date":"2025-01-01","post_time":"10:00"}"#;
        let comment: Comment = serde_json::from_str(raw).unwrap();
        assert_eq!(comment.display_author(), ANONYMOUS);
    }
}
