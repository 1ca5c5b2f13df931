//! Post service.

use std::sync::Arc;

use bazaar_common::{AppError, AppResult, IdGenerator};
use bazaar_db::db_err;
use bazaar_db::entities::{MediaDescriptor, PostKind, TargetKind, Visibility, post};
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
use crate::services::normalizer::ContentTokens;
use crate::services::visibility::{can_view, ensure_visible};

/// Input for creating a post.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostInput {
    /// Body text.
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub content: String,

    /// Ignored for shares, which always get [`PostKind::Share`].
    #[serde(default = "default_kind")]
    pub kind: PostKind,

    /// Audience.
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,

    /// Attachments, stored as given.
    #[validate(length(max = 16))]
    #[serde(default)]
    pub media: Vec<MediaDescriptor>,

    /// Re-publish another post.
    #[validate(nested)]
    pub share: Option<ShareInput>,
}

/// Share target of a new post.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ShareInput {
    /// The post being shared.
    pub post_id: String,

    /// Text added by the sharer.
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

const fn default_kind() -> PostKind {
    PostKind::Standard
}

const fn default_visibility() -> Visibility {
    Visibility::Public
}

impl CreatePostInput {
    /// A standard public post with `content`.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: PostKind::Standard,
            visibility: Visibility::Public,
            media: Vec::new(),
            share: None,
        }
    }

    /// Set the audience.
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set the post kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: PostKind) -> Self {
        self.kind = kind;
        self
    }

    /// A share of `post_id`.
    #[must_use]
    pub fn share_of(post_id: impl Into<String>, comment: Option<String>) -> Self {
        Self {
            content: String::new(),
            kind: PostKind::Share,
            visibility: Visibility::Public,
            media: Vec::new(),
            share: Some(ShareInput {
                post_id: post_id.into(),
                comment,
            }),
        }
    }
}

/// Input for updating a post. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePostInput {
    /// New body text.
    #[validate(length(max = 5000))]
    pub content: Option<String>,

    /// New audience.
    pub visibility: Option<Visibility>,

    /// Replacement attachment list.
    #[validate(length(max = 16))]
    pub media: Option<Vec<MediaDescriptor>>,
}

/// Post service for business logic.
#[derive(Clone)]
pub struct PostService {
    db: Arc<DatabaseConnection>,
    post_repo: PostRepository,
    comment_repo: CommentRepository,
    reaction_repo: ReactionRepository,
    follow_repo: FollowRepository,
    counters: CountMaintainer,
    invalidator: FeedInvalidator,
    id_gen: IdGenerator,
}

impl PostService {
    /// Create a new post service.
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        post_repo: PostRepository,
        comment_repo: CommentRepository,
        reaction_repo: ReactionRepository,
        follow_repo: FollowRepository,
        counters: CountMaintainer,
        invalidator: FeedInvalidator,
    ) -> Self {
        Self {
            db,
            post_repo,
            comment_repo,
            reaction_repo,
            follow_repo,
            counters,
            invalidator,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a post, or a share when `input.share` is set.
    pub async fn create(&self, principal: &Principal, input: CreatePostInput) -> AppResult<post::Model> {
        let author_id = principal.require_user()?;
        input.validate()?;

        if input.share.is_none() {
            if input.kind == PostKind::Share {
                return Err(AppError::Validation(
                    "kind: share posts need a share target".to_string(),
                ));
            }
            if input.content.trim().is_empty() && input.media.is_empty() {
                return Err(AppError::Validation(
                    "content: text or media required".to_string(),
                ));
            }
        }

        let txn = self.db.begin().await.map_err(db_err)?;

        let original = match &input.share {
            Some(share) => Some(self.resolve_share_target(&txn, author_id, &share.post_id).await?),
            None => None,
        };

        let tokens = ContentTokens::from_text(&input.content);
        let now = Utc::now().fixed_offset();
        let model = post::ActiveModel {
            id: Set(self.id_gen.generate()),
            author_id: Set(author_id.to_string()),
            content: Set(input.content),
            kind: Set(if original.is_some() {
                PostKind::Share
            } else {
                input.kind
            }),
            visibility: Set(input.visibility),
            media: Set(MediaDescriptor::list_to_json(&input.media)),
            has_media: Set(!input.media.is_empty()),
            hashtags: Set(tokens.hashtags_json()),
            keywords: Set(tokens.keywords_json()),
            view_count: Set(0),
            share_count: Set(0),
            comment_count: Set(0),
            reaction_count: Set(0),
            reactions: Set(serde_json::json!({})),
            engagement_score: Set(0.0),
            is_pinned: Set(false),
            is_edited: Set(false),
            is_active: Set(true),
            original_post_id: Set(original.as_ref().map(|p| p.id.clone())),
            share_comment: Set(input.share.and_then(|s| s.comment)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = self.post_repo.insert(&txn, model).await?;
        if let Some(original) = &original {
            self.counters.on_share_created(&txn, &original.id).await?;
        }

        txn.commit().await.map_err(db_err)?;

        if let Some(original) = &original {
            self.invalidator.post_changed(&original.id).await;
        }
        self.invalidator.post_changed(&created.id).await;

        info!(post_id = %created.id, author_id = %author_id, kind = ?created.kind, "Post created");
        Ok(created)
    }

    /// Lock the post a share points at. Sharing a share shares its original.
    async fn resolve_share_target<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        post_id: &str,
    ) -> AppResult<post::Model> {
        let target = self
            .post_repo
            .lock_in(conn, post_id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(post_id.to_string()))?;
        let target = ensure_visible(conn, &self.follow_repo, Some(user_id), target).await?;

        let original = if target.kind == PostKind::Share {
            let original_id = target.original_post_id.ok_or_else(|| {
                AppError::NotFound(format!("Original of shared post {post_id} no longer exists"))
            })?;
            let original = self
                .post_repo
                .lock_in(conn, &original_id)
                .await?
                .ok_or_else(|| AppError::PostNotFound(original_id.clone()))?;
            ensure_visible(conn, &self.follow_repo, Some(user_id), original).await?
        } else {
            target
        };

        if original.visibility == Visibility::Private {
            return Err(AppError::Forbidden("private posts cannot be shared".to_string()));
        }
        Ok(original)
    }

    /// Get a post the viewer may see.
    pub async fn get(&self, viewer: &Principal, post_id: &str) -> AppResult<post::Model> {
        let post = self.post_repo.get_by_id(post_id).await?;
        ensure_visible(self.db.as_ref(), &self.follow_repo, viewer.user_id(), post).await
    }

    /// Update content, visibility or media. Author only.
    pub async fn update(
        &self,
        principal: &Principal,
        post_id: &str,
        input: UpdatePostInput,
    ) -> AppResult<post::Model> {
        let user_id = principal.require_user()?;
        input.validate()?;

        let txn = self.db.begin().await.map_err(db_err)?;
        let post = self.lock_owned(&txn, user_id, post_id).await?;

        let mut model: post::ActiveModel = post.into();
        let mut edited = false;

        if let Some(content) = input.content {
            let tokens = ContentTokens::from_text(&content);
            model.hashtags = Set(tokens.hashtags_json());
            model.keywords = Set(tokens.keywords_json());
            model.content = Set(content);
            edited = true;
        }
        if let Some(media) = input.media {
            model.has_media = Set(!media.is_empty());
            model.media = Set(MediaDescriptor::list_to_json(&media));
            edited = true;
        }
        if let Some(visibility) = input.visibility {
            model.visibility = Set(visibility);
        }
        if edited {
            model.is_edited = Set(true);
        }
        model.updated_at = Set(Utc::now().fixed_offset());

        let updated = self.post_repo.update(&txn, model).await?;
        txn.commit().await.map_err(db_err)?;
        self.invalidator.post_changed(post_id).await;

        info!(post_id = %post_id, "Post updated");
        Ok(updated)
    }

    /// Delete a post with its comments and every reaction under it. Author only.
    pub async fn delete(&self, principal: &Principal, post_id: &str) -> AppResult<()> {
        let user_id = principal.require_user()?;

        let txn = self.db.begin().await.map_err(db_err)?;
        let post = self.lock_owned(&txn, user_id, post_id).await?;

        let comment_ids = self.comment_repo.ids_by_post_in(&txn, post_id).await?;
        self.reaction_repo
            .delete_for_targets(&txn, &comment_ids, TargetKind::Comment)
            .await?;
        self.reaction_repo
            .delete_for_targets(&txn, &[post.id.clone()], TargetKind::Post)
            .await?;

        self.post_repo.delete(&txn, post_id).await?;

        if post.kind == PostKind::Share {
            if let Some(original_id) = &post.original_post_id {
                self.counters.on_share_deleted(&txn, original_id).await?;
            }
        }

        txn.commit().await.map_err(db_err)?;

        if let Some(original_id) = &post.original_post_id {
            self.invalidator.post_changed(original_id).await;
        }
        self.invalidator.post_changed(post_id).await;

        info!(post_id = %post_id, comments = comment_ids.len(), "Post deleted");
        Ok(())
    }

    /// Pin or unpin a post on the author's profile. Author only.
    pub async fn set_pinned(
        &self,
        principal: &Principal,
        post_id: &str,
        pinned: bool,
    ) -> AppResult<post::Model> {
        self.set_flag(principal, post_id, |model| model.is_pinned = Set(pinned))
            .await
    }

    /// Archive or restore a post. Inactive posts drop out of every read. Author only.
    pub async fn set_active(
        &self,
        principal: &Principal,
        post_id: &str,
        active: bool,
    ) -> AppResult<post::Model> {
        self.set_flag(principal, post_id, |model| model.is_active = Set(active))
            .await
    }

    async fn set_flag<F>(&self, principal: &Principal, post_id: &str, apply: F) -> AppResult<post::Model>
    where
        F: FnOnce(&mut post::ActiveModel) + Send,
    {
        let user_id = principal.require_user()?;

        let txn = self.db.begin().await.map_err(db_err)?;
        let post = self.lock_owned(&txn, user_id, post_id).await?;

        let mut model: post::ActiveModel = post.into();
        apply(&mut model);
        model.updated_at = Set(Utc::now().fixed_offset());

        let updated = self.post_repo.update(&txn, model).await?;
        txn.commit().await.map_err(db_err)?;
        self.invalidator.post_changed(post_id).await;
        Ok(updated)
    }

    /// Count a view of a post the viewer may see.
    ///
    /// Cached feed pages are left alone; they pick the new score up on expiry.
    pub async fn record_view(&self, viewer: &Principal, post_id: &str) -> AppResult<()> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let post = self
            .post_repo
            .find_in(&txn, post_id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(post_id.to_string()))?;
        if !can_view(&txn, &self.follow_repo, viewer.user_id(), &post).await? {
            return Err(AppError::PostNotFound(post_id.to_string()));
        }

        self.counters.on_post_viewed(&txn, post_id).await?;
        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn lock_owned<C: ConnectionTrait>(
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

        if post.author_id != user_id {
            return Err(AppError::Forbidden(
                "only the author can modify this post".to_string(),
            ));
        }
        Ok(post)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::test_support::post_fixture;
    use bazaar_common::{EngagementWeights, ReadThroughCache};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn service(db: DatabaseConnection) -> PostService {
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
        PostService::new(
            db.clone(),
            post_repo,
            comment_repo,
            reaction_repo,
            FollowRepository::new(db),
            counters,
            FeedInvalidator::new(ReadThroughCache::disabled()),
        )
    }

    #[tokio::test]
    async fn test_anonymous_cannot_post() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let err = svc
            .create(&Principal::Anonymous, CreatePostInput::text("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn test_content_too_long_is_rejected_before_any_query() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let err = svc
            .create(&Principal::authenticated("u1"), CreatePostInput::text("x".repeat(5001)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("content")));
    }

    #[tokio::test]
    async fn test_empty_post_is_rejected() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let err = svc
            .create(&Principal::authenticated("u1"), CreatePostInput::text("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_share_kind_without_target_is_rejected() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let input = CreatePostInput::text("hi").with_kind(PostKind::Share);
        let err = svc
            .create(&Principal::authenticated("u1"), input)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.starts_with("kind")));
    }

    #[tokio::test]
    async fn test_update_by_non_author_is_forbidden() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[post_fixture("p1", "alice")]])
            .into_connection();
        let svc = service(db);

        let err = svc
            .update(
                &Principal::authenticated("mallory"),
                "p1",
                UpdatePostInput {
                    content: Some("mine now".to_string()),
                    ..UpdatePostInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_get_hides_private_post_from_others() {
        let mut post = post_fixture("p1", "alice");
        post.visibility = Visibility::Private;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[post]])
            .into_connection();
        let svc = service(db);

        let err = svc
            .get(&Principal::authenticated("bob"), "p1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PostNotFound(_)));
    }
}
