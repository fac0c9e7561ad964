//! The board as an immutable snapshot advanced by discrete events.
//!
//! [`Board::apply`] never touches the outside world. It returns the next
//! snapshot together with the [`Effect`]s the driver has to carry out, and
//! every result of those effects comes back in as another [`BoardEvent`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde::Serialize;

use crate::comments::{CommentThreads, ThreadFetch, ThreadView};
use crate::config::BoardConfig;
use crate::draft::{self, CommentDraft, PostDraft};
use crate::ledger::{Ledger, LedgerError, Settlement, UpvoteRollback};
use crate::model::{Comment, NewComment, NewPost, Post, PostId, Target};
use crate::notice::{Notice, Notices};
use crate::pager::{ExpandOutcome, Expansion, Generation, LoadOutcome, Pager};
use crate::store::{MediaKind, StoreError};
use crate::timeline::{self, FilterMode, SortMode, Stats, Timeline, TimelineQuery};

#[derive(Debug, Clone)]
pub enum BoardEvent {
    /// Display tick: only the displayed clock moves.
    Tick { now: NaiveDateTime },
    /// Relock tick: the clock moves and everything is re-fetched.
    Relock { now: NaiveDateTime },
    Refresh,
    PostsLoaded { generation: Generation, result: Result<Vec<Post>, StoreError> },
    CountsLoaded { generation: Generation, result: Result<HashMap<PostId, usize>, StoreError> },
    ExpandPast,
    ExpandFuture,
    PageReady { expansion: Expansion },
    SetSearch(String),
    SetFilter(FilterMode),
    SetSort(SortMode),
    Upvote { target: Target, id: String, parent: Option<PostId> },
    UpvoteSettled { target: Target, seq: u64, result: Result<(), StoreError> },
    ToggleThread { parent: PostId },
    ThreadLoaded { fetch: ThreadFetch, result: Result<Vec<Comment>, StoreError> },
    EditPost(PostDraft),
    AttachMedia { kind: MediaKind, bytes: Vec<u8> },
    MediaUploaded { kind: MediaKind, result: Result<String, StoreError> },
    SubmitPost,
    PostCreated { result: Result<Post, StoreError> },
    EditComment { parent: PostId, draft: CommentDraft },
    SubmitComment { parent: PostId },
    CommentCreated { parent: PostId, result: Result<Comment, StoreError> },
}

/// Work the driver performs on behalf of the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchPosts { generation: Generation },
    FetchCounts { generation: Generation },
    LoadPage(Expansion),
    FetchThread(ThreadFetch),
    /// Written before the matching [`Effect::PatchUpvotes`] is issued.
    RecordEngagement { target: Target, id: String },
    ForgetEngagement { target: Target, id: String },
    PatchUpvotes { target: Target, seq: u64, id: String, count: u64 },
    UploadMedia { kind: MediaKind, bytes: Vec<u8> },
    CreatePost(NewPost),
    CreateComment { parent: PostId, comment: NewComment },
}

/// Everything the render layer needs for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardView {
    pub now: NaiveDateTime,
    pub query: TimelineQuery,
    pub timeline: Timeline,
    pub stats: Stats,
    pub has_past: bool,
    pub has_future: bool,
    pub loading: bool,
    pub expanding: bool,
    /// Comment counts for the posts inside the window.
    pub comment_counts: BTreeMap<PostId, usize>,
    /// Expanded threads, in window order.
    pub threads: Vec<ThreadView>,
    pub upvoted_posts: Vec<String>,
    pub upvoted_comments: Vec<String>,
    pub notices: Vec<Notice>,
    pub draft: Option<PostDraft>,
    pub submitting: bool,
}

#[derive(Debug, Clone)]
pub struct Board {
    config: Arc<BoardConfig>,
    now: NaiveDateTime,
    pager: Pager<Post>,
    posts_ledger: Ledger,
    comments_ledger: Ledger,
    threads: CommentThreads,
    counts_generation: Generation,
    query: TimelineQuery,
    notices: Notices,
    post_draft: Option<PostDraft>,
    comment_drafts: HashMap<PostId, CommentDraft>,
    submitting_post: bool,
    submitting_comments: HashSet<PostId>,
    uploads_in_flight: usize,
}

impl Board {
    pub fn new(config: BoardConfig, now: NaiveDateTime, upvoted_posts: HashSet<String>, upvoted_comments: HashSet<String>) -> Self {
        let config = config.normalized();
        Self {
            pager: Pager::new(config.page_size),
            notices: Notices::new(config.notice_ttl()),
            config: Arc::new(config),
            now,
            posts_ledger: Ledger::new(Target::Post, upvoted_posts),
            comments_ledger: Ledger::new(Target::Comment, upvoted_comments),
            threads: CommentThreads::new(),
            counts_generation: 0,
            query: TimelineQuery::default(),
            post_draft: None,
            comment_drafts: HashMap::new(),
            submitting_post: false,
            submitting_comments: HashSet::new(),
            uploads_in_flight: 0,
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn pager(&self) -> &Pager<Post> {
        &self.pager
    }

    pub fn threads(&self) -> &CommentThreads {
        &self.threads
    }

    pub fn query(&self) -> &TimelineQuery {
        &self.query
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn post_draft(&self) -> Option<&PostDraft> {
        self.post_draft.as_ref()
    }

    pub fn comment_draft(&self, parent: &str) -> Option<&CommentDraft> {
        self.comment_drafts.get(parent)
    }

    pub fn ledger(&self, target: Target) -> &Ledger {
        match target {
            Target::Post => &self.posts_ledger,
            Target::Comment => &self.comments_ledger,
        }
    }

    pub fn post(&self, id: &str) -> Option<&Post> {
        self.pager.backing().iter().find(|p| p.id == id)
    }

    /// Returns the next snapshot and the effects needed to get there.
    pub fn apply(&self, event: BoardEvent) -> (Board, Vec<Effect>) {
        let mut next = self.clone();
        let effects = next.step(event);
        (next, effects)
    }

    fn step(&mut self, event: BoardEvent) -> Vec<Effect> {
        match event {
            BoardEvent::Tick { now } => {
                self.now = now;
                self.notices.tick(now);
                Vec::new()
            }
            BoardEvent::Relock { now } => {
                self.now = now;
                self.notices.tick(now);
                self.reload()
            }
            BoardEvent::Refresh => self.reload(),
            BoardEvent::PostsLoaded { generation, result } => {
                match result {
                    Ok(posts) => {
                        let count = posts.len();
                        if self.pager.finish_load(generation, posts, self.now) == LoadOutcome::Applied {
                            debug!("[Board] applied load {generation} with {count} posts");
                        }
                    }
                    Err(err) => {
                        warn!("[Board] loading posts failed: {err}");
                        self.pager.abort_load(generation);
                    }
                }
                Vec::new()
            }
            BoardEvent::CountsLoaded { generation, result } => {
                match result {
                    Ok(counts) if generation > self.counts_generation => {
                        self.counts_generation = generation;
                        self.threads.set_counts(counts);
                    }
                    Ok(_) => debug!("[Board] dropping stale comment counts {generation}"),
                    Err(err) => warn!("[Board] loading comment counts failed: {err}"),
                }
                Vec::new()
            }
            BoardEvent::ExpandPast => self.pager.begin_expand_past().map(Effect::LoadPage).into_iter().collect(),
            BoardEvent::ExpandFuture => self.pager.begin_expand_future().map(Effect::LoadPage).into_iter().collect(),
            BoardEvent::PageReady { expansion } => {
                match self.pager.apply_expansion(&expansion) {
                    ExpandOutcome::Applied { added } => debug!("[Board] window grew by {added}"),
                    outcome => debug!("[Board] page {:?} not applied: {outcome:?}", expansion.direction),
                }
                Vec::new()
            }
            BoardEvent::SetSearch(search) => {
                self.query.search = search;
                Vec::new()
            }
            BoardEvent::SetFilter(filter) => {
                self.query.filter = filter;
                Vec::new()
            }
            BoardEvent::SetSort(sort) => {
                self.query.sort = sort;
                Vec::new()
            }
            BoardEvent::Upvote { target, id, parent } => self.upvote(target, &id, parent),
            BoardEvent::UpvoteSettled { target, seq, result } => self.settle_upvote(target, seq, result),
            BoardEvent::ToggleThread { parent } => self.threads.toggle(&parent).map(Effect::FetchThread).into_iter().collect(),
            BoardEvent::ThreadLoaded { fetch, result } => {
                if let Err(err) = &result {
                    warn!("[Board] loading comments for {} failed: {err}", fetch.parent);
                }
                self.threads.finish_fetch(&fetch, result.map_err(|_| ()));
                Vec::new()
            }
            BoardEvent::EditPost(draft) => {
                self.post_draft = Some(draft);
                Vec::new()
            }
            BoardEvent::AttachMedia { kind, bytes } => match draft::check_media(kind, bytes.len(), &self.config) {
                Ok(()) => {
                    self.uploads_in_flight += 1;
                    vec![Effect::UploadMedia { kind, bytes }]
                }
                Err(err) => {
                    self.notices.error(err.to_string(), self.now);
                    Vec::new()
                }
            },
            BoardEvent::MediaUploaded { kind, result } => {
                self.uploads_in_flight = self.uploads_in_flight.saturating_sub(1);
                match result {
                    Ok(url) => {
                        let draft = self.post_draft.get_or_insert_with(PostDraft::default);
                        match kind {
                            MediaKind::Image => draft.image_urls.push(url),
                            MediaKind::Audio => draft.audio_url = Some(url),
                        }
                    }
                    Err(err) => self.notices.error(format!("Upload failed: {err}"), self.now),
                }
                Vec::new()
            }
            BoardEvent::SubmitPost => self.submit_post(),
            BoardEvent::PostCreated { result } => {
                self.submitting_post = false;
                match result {
                    Ok(post) => {
                        info!("[Board] created post {}", post.id);
                        self.post_draft = None;
                        let message = match (&post.unlock_date, &post.unlock_time) {
                            (Some(date), Some(time)) if post.is_locked => format!("Capsule sealed until {date} {time}"),
                            _ => "Posted".to_string(),
                        };
                        self.notices.success(message, self.now);
                        self.reload()
                    }
                    Err(err) => {
                        self.notices.error(format!("Could not post: {err}. Your draft is kept, try again."), self.now);
                        Vec::new()
                    }
                }
            }
            BoardEvent::EditComment { parent, draft } => {
                self.comment_drafts.insert(parent, draft);
                Vec::new()
            }
            BoardEvent::SubmitComment { parent } => self.submit_comment(parent),
            BoardEvent::CommentCreated { parent, result } => {
                self.submitting_comments.remove(&parent);
                match result {
                    Ok(comment) => {
                        info!("[Board] created comment {} on {parent}", comment.id);
                        self.comment_drafts.remove(&parent);
                        self.threads.bump_count(&parent);
                        self.notices.success("Comment added", self.now);
                        vec![Effect::FetchThread(self.threads.refresh(&parent))]
                    }
                    Err(err) => {
                        self.notices.error(format!("Could not comment: {err}. Your draft is kept, try again."), self.now);
                        Vec::new()
                    }
                }
            }
        }
    }

    fn reload(&mut self) -> Vec<Effect> {
        let generation = self.pager.begin_load();
        vec![Effect::FetchPosts { generation }, Effect::FetchCounts { generation }]
    }

    fn upvote(&mut self, target: Target, id: &str, parent: Option<PostId>) -> Vec<Effect> {
        let issued = match target {
            Target::Post => {
                let generation = self.pager.generation();
                self.posts_ledger.upvote(self.pager.backing_mut(), id, None, generation)
            }
            Target::Comment => {
                let Some(parent) = parent else {
                    warn!("[Board] comment upvote on {id} without a parent");
                    return Vec::new();
                };
                let version = self.threads.version(&parent);
                match self.threads.comments_mut(&parent) {
                    Some(comments) => self.comments_ledger.upvote(comments, id, Some(parent), version),
                    None => Err(LedgerError::UnknownId(id.to_string())),
                }
            }
        };
        match issued {
            Ok(UpvoteRollback { seq, new_count, .. }) => vec![
                Effect::RecordEngagement { target, id: id.to_string() },
                Effect::PatchUpvotes { target, seq, id: id.to_string(), count: new_count },
            ],
            Err(LedgerError::AlreadyEngaged(_)) => Vec::new(),
            Err(err) => {
                warn!("[Board] upvote rejected: {err}");
                Vec::new()
            }
        }
    }

    fn settle_upvote(&mut self, target: Target, seq: u64, result: Result<(), StoreError>) -> Vec<Effect> {
        if let Err(err) = &result {
            warn!("[Board] persisting upvote {seq} failed: {err}");
        }
        let released = match target {
            Target::Post => self.posts_ledger.settle(seq, result.is_ok()),
            Target::Comment => self.comments_ledger.settle(seq, result.is_ok()),
        };
        let mut effects = Vec::new();
        for settlement in released {
            let rollback = match settlement {
                Settlement::Confirmed(rb) => {
                    debug!("[Board] upvote on {} {} confirmed at {}", rb.target.as_str(), rb.id, rb.new_count);
                    continue;
                }
                Settlement::Failed(rb) => rb,
            };
            self.roll_back(&rollback);
            self.notices.error("Could not save your upvote", self.now);
            effects.push(Effect::ForgetEngagement { target: rollback.target, id: rollback.id });
        }
        effects
    }

    fn roll_back(&mut self, rollback: &UpvoteRollback) {
        match rollback.target {
            Target::Post => {
                let generation = self.pager.generation();
                self.posts_ledger.rollback(self.pager.backing_mut(), rollback, generation);
            }
            Target::Comment => {
                let parent = rollback.parent.clone().unwrap_or_default();
                let version = self.threads.version(&parent);
                match self.threads.comments_mut(&parent) {
                    Some(comments) => self.comments_ledger.rollback(comments, rollback, version),
                    None => self.comments_ledger.rollback::<Comment>(&mut [], rollback, version),
                };
            }
        }
    }

    fn submit_post(&mut self) -> Vec<Effect> {
        if self.submitting_post {
            return Vec::new();
        }
        if self.uploads_in_flight > 0 {
            self.notices.info("Wait for uploads to finish", self.now);
            return Vec::new();
        }
        let draft = self.post_draft.clone().unwrap_or_default();
        match draft.validate(&self.config, self.now) {
            Ok(post) => {
                self.submitting_post = true;
                vec![Effect::CreatePost(post)]
            }
            Err(err) => {
                self.notices.error(err.to_string(), self.now);
                Vec::new()
            }
        }
    }

    fn submit_comment(&mut self, parent: PostId) -> Vec<Effect> {
        if self.submitting_comments.contains(&parent) {
            return Vec::new();
        }
        let draft = self.comment_drafts.get(&parent).cloned().unwrap_or_default();
        match draft.validate(&self.config, self.now) {
            Ok(comment) => {
                self.submitting_comments.insert(parent.clone());
                vec![Effect::CreateComment { parent, comment }]
            }
            Err(err) => {
                self.notices.error(err.to_string(), self.now);
                Vec::new()
            }
        }
    }

    pub fn view(&self) -> BoardView {
        let window = self.pager.window();
        let comment_counts = window.iter().map(|p| (p.id.clone(), self.threads.count(&p.id))).collect();
        let threads = window.iter().filter(|p| self.threads.is_expanded(&p.id)).map(|p| self.threads.view(&p.id, self.now)).collect();
        let mut upvoted_posts: Vec<String> = self.posts_ledger.engaged().iter().cloned().collect();
        upvoted_posts.sort();
        let mut upvoted_comments: Vec<String> = self.comments_ledger.engaged().iter().cloned().collect();
        upvoted_comments.sort();
        BoardView {
            now: self.now,
            query: self.query.clone(),
            timeline: timeline::assemble(window, &self.query, self.now),
            stats: timeline::stats(self.pager.backing(), self.now),
            has_past: self.pager.has_past(),
            has_future: self.pager.has_future(),
            loading: self.pager.is_loading_initial(),
            expanding: self.pager.is_expanding(),
            comment_counts,
            threads,
            upvoted_posts,
            upvoted_comments,
            notices: self.notices.all().to_vec(),
            draft: self.post_draft.clone(),
            submitting: self.submitting_post,
        }
    }
}
