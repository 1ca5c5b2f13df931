//! Comment service.

use std::sync::Arc;

use bazaar_common::{AppError, AppResult, IdGenerator};
use bazaar_db::db_err;
use bazaar_db::entities::{MediaDescriptor, TargetKind, comment, post};
use bazaar_db::repositories::{
    CommentRepository, FollowRepository, PostRepository, ReactionRepository,
};
use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, Set, TransactionTrait};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::principal::Principal;
use crate::services::counters::CountMaintainer;
use crate::services::invalidation::FeedInvalidator;
use crate::services::visibility::ensure_visible;

/// Follow-edge engagement added when someone comments on a followed author's post.
pub const COMMENT_ENGAGEMENT_NUDGE: f64 = 2.0;

/// Input for creating a comment.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCommentInput {
    /// Post being commented on.
    pub post_id: String,

    /// Body text.
    #[validate(length(max = 1000))]
    #[serde(default)]
    pub content: String,

    /// Reply to this comment instead of the post.
    pub parent_id: Option<String>,

    /// Attachments, stored as given.
    #[validate(length(max = 4))]
    #[serde(default)]
    pub media: Vec<MediaDescriptor>,
}

impl CreateCommentInput {
    /// A top-level text comment.
    #[must_use]
    pub fn on_post(post_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            content: content.into(),
            parent_id: None,
            media: Vec::new(),
        }
    }

    /// Make this a reply to `parent_id`.
    #[must_use]
    pub fn reply_to(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Input for editing a comment.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateCommentInput {
    /// New body text.
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
}

/// Comment service for business logic.
#[derive(Clone)]
pub struct CommentService {
    db: Arc<DatabaseConnection>,
    comment_repo: CommentRepository,
    post_repo: PostRepository,
    reaction_repo: ReactionRepository,
    follow_repo: FollowRepository,
    counters: CountMaintainer,
    invalidator: FeedInvalidator,
    id_gen: IdGenerator,
}

impl CommentService {
    /// Create a new comment service.
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        comment_repo: CommentRepository,
        post_repo: PostRepository,
        reaction_repo: ReactionRepository,
        follow_repo: FollowRepository,
        counters: CountMaintainer,
        invalidator: FeedInvalidator,
    ) -> Self {
        Self {
            db,
            comment_repo,
            post_repo,
            reaction_repo,
            follow_repo,
            counters,
            invalidator,
            id_gen: IdGenerator::new(),
        }
    }

    /// Comment on a post, or reply to a comment on the same post.
    pub async fn create(
        &self,
        principal: &Principal,
        input: CreateCommentInput,
    ) -> AppResult<comment::Model> {
        let author_id = principal.require_user()?;
        input.validate()?;
        if input.content.trim().is_empty() && input.media.is_empty() {
            return Err(AppError::Validation(
                "content: text or media required".to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(db_err)?;

        let post = self.visible_post(&txn, author_id, &input.post_id).await?;

        if let Some(parent_id) = &input.parent_id {
            let parent = self
                .comment_repo
                .lock_in(&txn, parent_id)
                .await?
                .filter(|c| c.is_active)
                .ok_or_else(|| AppError::CommentNotFound(parent_id.clone()))?;
            if parent.post_id != post.id {
                return Err(AppError::Conflict(
                    "parent comment belongs to a different post".to_string(),
                ));
            }
        }

        let now = Utc::now().fixed_offset();
        let model = comment::ActiveModel {
            id: Set(self.id_gen.generate()),
            post_id: Set(post.id.clone()),
            author_id: Set(author_id.to_string()),
            content: Set(input.content),
            parent_id: Set(input.parent_id),
            reply_count: Set(0),
            reaction_count: Set(0),
            reactions: Set(serde_json::json!({})),
            media: Set(MediaDescriptor::list_to_json(&input.media)),
            is_edited: Set(false),
            is_hidden: Set(false),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = self.comment_repo.insert(&txn, model).await?;
        self.counters.on_comment_inserted(&txn, &created).await?;

        if post.author_id != author_id {
            self.follow_repo
                .add_engagement(&txn, author_id, &post.author_id, COMMENT_ENGAGEMENT_NUDGE)
                .await?;
        }

        txn.commit().await.map_err(db_err)?;
        self.invalidator.post_changed(&post.id).await;

        info!(comment_id = %created.id, post_id = %post.id, parent_id = ?created.parent_id, "Comment created");
        Ok(created)
    }

    /// Edit a comment's text. Author only.
    pub async fn update(
        &self,
        principal: &Principal,
        comment_id: &str,
        input: UpdateCommentInput,
    ) -> AppResult<comment::Model> {
        let user_id = principal.require_user()?;
        input.validate()?;

        let txn = self.db.begin().await.map_err(db_err)?;
        let comment = self.lock_active(&txn, comment_id).await?;
        if comment.author_id != user_id {
            return Err(AppError::Forbidden(
                "only the author can edit this comment".to_string(),
            ));
        }

        let post_id = comment.post_id.clone();
        let mut model: comment::ActiveModel = comment.into();
        model.content = Set(input.content);
        model.is_edited = Set(true);
        model.updated_at = Set(Utc::now().fixed_offset());

        let updated = self.comment_repo.update(&txn, model).await?;
        txn.commit().await.map_err(db_err)?;
        self.invalidator.thread_changed(&post_id).await;

        Ok(updated)
    }

    /// Delete a comment, its replies, and every reaction on them.
    ///
    /// Allowed for the comment's author and the post's author.
    pub async fn delete(&self, principal: &Principal, comment_id: &str) -> AppResult<()> {
        let user_id = principal.require_user()?;

        let txn = self.db.begin().await.map_err(db_err)?;
        let (comment, post) = self.lock_with_post(&txn, comment_id).await?;

        if comment.author_id != user_id && post.author_id != user_id {
            return Err(AppError::Forbidden(
                "only the comment or post author can delete this comment".to_string(),
            ));
        }

        let subtree = self.comment_repo.subtree_ids(&txn, comment_id).await?;
        self.reaction_repo
            .delete_for_targets(&txn, &subtree, TargetKind::Comment)
            .await?;
        self.comment_repo.delete(&txn, comment_id).await?;
        self.counters.on_comment_deleted(&txn, &comment).await?;

        txn.commit().await.map_err(db_err)?;
        self.invalidator.post_changed(&post.id).await;

        info!(comment_id = %comment_id, removed = subtree.len(), "Comment deleted");
        Ok(())
    }

    /// Hide or unhide a comment. Post author only.
    ///
    /// Hidden comments keep counting toward the post and the parent.
    pub async fn set_hidden(
        &self,
        principal: &Principal,
        comment_id: &str,
        hidden: bool,
    ) -> AppResult<comment::Model> {
        let user_id = principal.require_user()?;

        let txn = self.db.begin().await.map_err(db_err)?;
        let (comment, post) = self.lock_with_post(&txn, comment_id).await?;
        if post.author_id != user_id {
            return Err(AppError::Forbidden(
                "only the post author can moderate comments".to_string(),
            ));
        }

        let mut model: comment::ActiveModel = comment.into();
        model.is_hidden = Set(hidden);
        model.updated_at = Set(Utc::now().fixed_offset());

        let updated = self.comment_repo.update(&txn, model).await?;
        txn.commit().await.map_err(db_err)?;
        self.invalidator.thread_changed(&post.id).await;

        info!(comment_id = %comment_id, hidden, "Comment visibility changed");
        Ok(updated)
    }

    async fn visible_post<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        post_id: &str,
    ) -> AppResult<post::Model> {
        let post = self
            .post_repo
            .lock_in(conn, post_id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(post_id.to_string()))?;
        ensure_visible(conn, &self.follow_repo, Some(user_id), post).await
    }

    /// Lock the comment's post, then the comment itself.
    ///
    /// Every path that locks both takes the post first.
    async fn lock_with_post<C: ConnectionTrait>(
        &self,
        conn: &C,
        comment_id: &str,
    ) -> AppResult<(comment::Model, post::Model)> {
        let comment = self
            .comment_repo
            .find_in(conn, comment_id)
            .await?
            .ok_or_else(|| AppError::CommentNotFound(comment_id.to_string()))?;
        let post = self
            .post_repo
            .lock_in(conn, &comment.post_id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(comment.post_id.clone()))?;
        let comment = self.lock_active(conn, comment_id).await?;
        Ok((comment, post))
    }

    async fn lock_active<C: ConnectionTrait>(
        &self,
        conn: &C,
        comment_id: &str,
    ) -> AppResult<comment::Model> {
        self.comment_repo
            .lock_in(conn, comment_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| AppError::CommentNotFound(comment_id.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::test_support::{comment_fixture, post_fixture};
    use bazaar_common::{EngagementWeights, ReadThroughCache};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn service(db: DatabaseConnection) -> CommentService {
        let db = Arc::new(db);
        let post_repo = PostRepository::new(db.clone());
        let comment_repo = CommentRepository::new(db.clone());
        let reaction_repo = ReactionRepository::new(db.clone());
        let counters = CountMaintainer::new(
            post_repo.clone(),
            comment_repo.clone(),
            reaction_repo.clone(),
            EngagementWeights::default(),
        );
        CommentService::new(
            db.clone(),
            comment_repo,
            post_repo,
            reaction_repo,
            FollowRepository::new(db),
            counters,
            FeedInvalidator::new(ReadThroughCache::disabled()),
        )
    }

    #[tokio::test]
    async fn test_content_too_long() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let err = svc
            .create(
                &Principal::authenticated("u1"),
                CreateCommentInput::on_post("p1", "x".repeat(1001)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("content")));
    }

    #[tokio::test]
    async fn test_reply_to_comment_on_other_post_conflicts() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[post_fixture("p1", "alice")]])
            .append_query_results([[comment_fixture("c9", "p2", None)]])
            .into_connection();
        let svc = service(db);

        let err = svc
            .create(
                &Principal::authenticated("bob"),
                CreateCommentInput::on_post("p1", "hi").reply_to("c9"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_comment_on_missing_post() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<post::Model>::new()])
            .into_connection();
        let svc = service(db);

        let err = svc
            .create(
                &Principal::authenticated("bob"),
                CreateCommentInput::on_post("gone", "hi"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PostNotFound(_)));
    }

    #[tokio::test]
    async fn test_stranger_cannot_delete() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[comment_fixture("c1", "p1", None)]])
            .append_query_results([[post_fixture("p1", "alice")]])
            .append_query_results([[comment_fixture("c1", "p1", None)]])
            .into_connection();
        let svc = service(db);

        let err = svc
            .delete(&Principal::authenticated("mallory"), "c1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_only_post_author_moderates() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[comment_fixture("c1", "p1", None)]])
            .append_query_results([[post_fixture("p1", "alice")]])
            .append_query_results([[comment_fixture("c1", "p1", None)]])
            .into_connection();
        let svc = service(db);

        let err = svc
            .set_hidden(&Principal::authenticated("commenter"), "c1", true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
