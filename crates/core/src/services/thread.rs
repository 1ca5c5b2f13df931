//! Thread assembly.
//!
//! [`ThreadService::get_thread`] returns one page of top-level comments with
//! a few direct replies each. [`ThreadService::expand_thread`] walks the
//! replies below one comment breadth first, stopping at a depth and node
//! budget. Neither recurses in SQL.

use std::collections::HashMap;
use std::sync::Arc;

use bazaar_common::{AppError, AppResult, CacheKey, FeedConfig, ReadThroughCache};
use bazaar_db::entities::{MediaDescriptor, ReactionKind, TargetKind, comment};
use bazaar_db::repositories::{
    CommentFilters, CommentRepository, CommentSort, FollowRepository, PostRepository,
    ReactionRepository,
};
use sea_orm::DatabaseConnection;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pagination::{Page, PageRequest};
use crate::principal::Principal;
use crate::services::counters::ReactionTally;
use crate::services::visibility::{comment_visible, ensure_visible};

/// Reference to a user. Profiles live elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorRef {
    /// User id.
    pub id: String,
}

/// A comment as shown in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadComment {
    /// Comment id.
    pub id: String,
    /// Post the comment belongs to.
    pub post_id: String,
    /// Who wrote it.
    pub author: AuthorRef,
    /// Body text.
    pub content: String,
    /// Comment replied to, `None` at the top level.
    pub parent_id: Option<String>,
    /// Attachments.
    pub media: Vec<MediaDescriptor>,
    /// Direct replies, including ones not loaded.
    pub reply_count: i64,
    /// Reactions of any kind.
    pub reaction_count: i64,
    /// Reactions per kind.
    pub reactions: ReactionTally,
    /// The viewer's own reaction, when authenticated.
    pub viewer_reaction: Option<ReactionKind>,
    /// Content changed after creation.
    pub is_edited: bool,
    /// Hidden by the post author.
    pub is_hidden: bool,
    /// Creation time.
    pub created_at: DateTimeWithTimeZone,
    /// Last write.
    pub updated_at: DateTimeWithTimeZone,
    /// Loaded replies.
    pub replies: Vec<ThreadComment>,
}

impl ThreadComment {
    fn from_model(model: comment::Model, viewer_reaction: Option<ReactionKind>) -> Self {
        Self {
            reactions: ReactionTally::from_json(&model.reactions),
            media: MediaDescriptor::list_from_json(&model.media),
            author: AuthorRef {
                id: model.author_id,
            },
            id: model.id,
            post_id: model.post_id,
            content: model.content,
            parent_id: model.parent_id,
            reply_count: model.reply_count,
            reaction_count: model.reaction_count,
            viewer_reaction,
            is_edited: model.is_edited,
            is_hidden: model.is_hidden,
            created_at: model.created_at,
            updated_at: model.updated_at,
            replies: Vec::new(),
        }
    }
}

/// Result of [`ThreadService::expand_thread`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadExpansion {
    /// The expanded comment with its loaded descendants.
    pub root: ThreadComment,
    /// Levels below the root that were loaded.
    pub depth: u32,
    /// Comments loaded, root included.
    pub node_count: usize,
    /// The depth or node budget cut the walk short.
    pub truncated: bool,
}

#[derive(Serialize)]
struct ThreadKey<'a> {
    viewer: Option<&'a str>,
    filters: &'a CommentFilters,
    sort: CommentSort,
    page: &'a PageRequest,
    reply_limit: u64,
}

/// Thread service.
#[derive(Clone)]
pub struct ThreadService {
    db: Arc<DatabaseConnection>,
    comment_repo: CommentRepository,
    post_repo: PostRepository,
    reaction_repo: ReactionRepository,
    follow_repo: FollowRepository,
    cache: ReadThroughCache,
    config: FeedConfig,
}

impl ThreadService {
    /// Create a new thread service.
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        comment_repo: CommentRepository,
        post_repo: PostRepository,
        reaction_repo: ReactionRepository,
        follow_repo: FollowRepository,
        cache: ReadThroughCache,
        config: FeedConfig,
    ) -> Self {
        Self {
            db,
            comment_repo,
            post_repo,
            reaction_repo,
            follow_repo,
            cache,
            config,
        }
    }

    /// A page of top-level comments, each with up to `reply_limit` direct replies.
    pub async fn get_thread(
        &self,
        viewer: &Principal,
        post_id: &str,
        filters: CommentFilters,
        sort: CommentSort,
        page: PageRequest,
        reply_limit: Option<u64>,
    ) -> AppResult<Page<ThreadComment>> {
        let (offset, limit) = page.bounds(self.config.max_page_size)?;
        let reply_limit = reply_limit.unwrap_or(self.config.default_reply_limit);
        if reply_limit > self.config.max_reply_limit {
            return Err(AppError::BadRequest(format!(
                "reply_limit must be at most {}",
                self.config.max_reply_limit
            )));
        }

        let viewer_id = viewer.user_id();
        let post = self.post_repo.get_by_id(post_id).await?;
        ensure_visible(self.db.as_ref(), &self.follow_repo, viewer_id, post).await?;

        let key = CacheKey::new(
            CacheKey::thread_scope(post_id),
            serde_json::to_string(&ThreadKey {
                viewer: viewer_id,
                filters: &filters,
                sort,
                page: &page,
                reply_limit,
            })?,
        );
        if let Some(hit) = self.cache.get_json::<Page<ThreadComment>>(&key).await {
            return Ok(hit);
        }

        let top_level = self
            .comment_repo
            .find_top_level(post_id, viewer_id, &filters, sort, offset, limit)
            .await?;
        let total = if page.wants_total() {
            Some(
                self.comment_repo
                    .count_top_level(post_id, viewer_id, &filters)
                    .await?,
            )
        } else {
            None
        };

        let mut replies: HashMap<String, Vec<comment::Model>> = HashMap::new();
        if reply_limit > 0 {
            for parent in top_level.iter().filter(|c| c.reply_count > 0) {
                let children = self
                    .comment_repo
                    .find_replies(&parent.id, viewer_id, sort, reply_limit)
                    .await?;
                replies.insert(parent.id.clone(), children);
            }
        }

        let ids: Vec<String> = top_level
            .iter()
            .chain(replies.values().flatten())
            .map(|c| c.id.clone())
            .collect();
        let own = self.viewer_reactions(viewer_id, &ids).await?;

        let items: Vec<ThreadComment> = top_level
            .into_iter()
            .map(|parent| {
                let children = replies.remove(&parent.id).unwrap_or_default();
                let mut node = ThreadComment::from_model(parent, None);
                node.viewer_reaction = own.get(&node.id).copied();
                node.replies = children
                    .into_iter()
                    .map(|child| {
                        let kind = own.get(&child.id).copied();
                        ThreadComment::from_model(child, kind)
                    })
                    .collect();
                node
            })
            .collect();

        debug!(post_id = %post_id, returned = items.len(), "Thread page assembled");

        let result = Page::new(items, &page, total);
        self.cache.put_json(&key, &result).await;
        Ok(result)
    }

    /// Walk the replies below a comment breadth first.
    ///
    /// Stops after `max_depth` levels or `max_nodes` comments (root
    /// included), whichever comes first. Both default to and are capped by
    /// the configured limits.
    pub async fn expand_thread(
        &self,
        viewer: &Principal,
        comment_id: &str,
        max_depth: Option<u32>,
        max_nodes: Option<usize>,
    ) -> AppResult<ThreadExpansion> {
        let max_depth = max_depth.unwrap_or(self.config.max_thread_depth);
        if max_depth == 0 || max_depth > self.config.max_thread_depth {
            return Err(AppError::BadRequest(format!(
                "max_depth must be between 1 and {}",
                self.config.max_thread_depth
            )));
        }
        let max_nodes = max_nodes.unwrap_or(self.config.max_thread_nodes);
        if max_nodes == 0 || max_nodes > self.config.max_thread_nodes {
            return Err(AppError::BadRequest(format!(
                "max_nodes must be between 1 and {}",
                self.config.max_thread_nodes
            )));
        }

        let viewer_id = viewer.user_id();
        let root = self.comment_repo.get_by_id(comment_id).await?;
        if !comment_visible(viewer_id, &root) {
            return Err(AppError::CommentNotFound(comment_id.to_string()));
        }
        let post = self.post_repo.get_by_id(&root.post_id).await?;
        ensure_visible(self.db.as_ref(), &self.follow_repo, viewer_id, post).await?;

        let mut arena = vec![root];
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        let mut frontier = vec![comment_id.to_string()];
        let mut depth = 0u32;
        let mut truncated = false;

        while !frontier.is_empty() {
            let remaining = max_nodes.saturating_sub(arena.len());
            if depth == max_depth || remaining == 0 {
                truncated = !self
                    .comment_repo
                    .find_children(&frontier, viewer_id, 1)
                    .await?
                    .is_empty();
                break;
            }

            let mut level = self
                .comment_repo
                .find_children(&frontier, viewer_id, remaining as u64 + 1)
                .await?;
            if level.len() > remaining {
                level.truncate(remaining);
                truncated = true;
            }
            if level.is_empty() {
                break;
            }

            depth += 1;
            frontier = level.iter().map(|c| c.id.clone()).collect();
            for node in level {
                if let Some(parent_id) = &node.parent_id {
                    children
                        .entry(parent_id.clone())
                        .or_default()
                        .push(arena.len());
                }
                arena.push(node);
            }

            if truncated {
                break;
            }
        }

        let ids: Vec<String> = arena.iter().map(|c| c.id.clone()).collect();
        let own = self.viewer_reactions(viewer_id, &ids).await?;
        let node_count = arena.len();
        let root = assemble(0, &arena, &children, &own);

        debug!(comment_id = %comment_id, depth, node_count, truncated, "Thread expanded");

        Ok(ThreadExpansion {
            root,
            depth,
            node_count,
            truncated,
        })
    }

    async fn viewer_reactions(
        &self,
        viewer_id: Option<&str>,
        comment_ids: &[String],
    ) -> AppResult<HashMap<String, ReactionKind>> {
        let Some(viewer_id) = viewer_id else {
            return Ok(HashMap::new());
        };

        Ok(self
            .reaction_repo
            .find_for_user_targets(viewer_id, comment_ids, TargetKind::Comment)
            .await?
            .into_iter()
            .map(|r| (r.target_id, r.kind))
            .collect())
    }
}

/// Build the subtree rooted at `arena[index]`. Depth is bounded by the walk.
fn assemble(
    index: usize,
    arena: &[comment::Model],
    children: &HashMap<String, Vec<usize>>,
    own: &HashMap<String, ReactionKind>,
) -> ThreadComment {
    let model = arena[index].clone();
    let kind = own.get(&model.id).copied();
    let mut node = ThreadComment::from_model(model, kind);
    if let Some(child_indexes) = children.get(&node.id) {
        node.replies = child_indexes
            .iter()
            .map(|&child| assemble(child, arena, children, own))
            .collect();
    }
    node
}
