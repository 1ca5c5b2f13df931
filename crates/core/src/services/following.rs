//! Following service.

use std::sync::Arc;

use bazaar_common::{AppError, AppResult, IdGenerator};
use bazaar_db::db_err;
use bazaar_db::entities::follow;
use bazaar_db::repositories::FollowRepository;
use chrono::Utc;
use sea_orm::{DatabaseConnection, Set, TransactionTrait};
use serde::Deserialize;
use tracing::info;

use crate::pagination::{Page, PageRequest};
use crate::principal::Principal;
use crate::services::invalidation::FeedInvalidator;

/// Notification preferences of a new follow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FollowOptions {
    /// Notify about new posts.
    pub notify_on_post: bool,
    /// Notify about new comments.
    pub notify_on_comment: bool,
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            notify_on_post: true,
            notify_on_comment: false,
        }
    }
}

/// Preference changes on an existing edge. `None` leaves a flag unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct FollowPreferencesInput {
    /// New post notification setting.
    pub notify_on_post: Option<bool>,
    /// New comment notification setting.
    pub notify_on_comment: Option<bool>,
}

/// Following service for business logic.
#[derive(Clone)]
pub struct FollowingService {
    db: Arc<DatabaseConnection>,
    follow_repo: FollowRepository,
    invalidator: FeedInvalidator,
    max_page_size: u64,
    id_gen: IdGenerator,
}

impl FollowingService {
    /// Create a new following service.
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        follow_repo: FollowRepository,
        invalidator: FeedInvalidator,
        max_page_size: u64,
    ) -> Self {
        Self {
            db,
            follow_repo,
            invalidator,
            max_page_size,
            id_gen: IdGenerator::new(),
        }
    }

    /// Follow a user.
    pub async fn follow(
        &self,
        principal: &Principal,
        following_id: &str,
        options: FollowOptions,
    ) -> AppResult<follow::Model> {
        let follower_id = principal.require_user()?;

        if follower_id == following_id {
            return Err(AppError::Validation(
                "following_id: cannot follow yourself".to_string(),
            ));
        }
        if following_id.is_empty() {
            return Err(AppError::Validation("following_id: required".to_string()));
        }

        let txn = self.db.begin().await.map_err(db_err)?;

        if self
            .follow_repo
            .find_by_pair_in(&txn, follower_id, following_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("already following".to_string()));
        }

        let model = follow::ActiveModel {
            id: Set(self.id_gen.generate()),
            follower_id: Set(follower_id.to_string()),
            following_id: Set(following_id.to_string()),
            notify_on_post: Set(options.notify_on_post),
            notify_on_comment: Set(options.notify_on_comment),
            engagement_score: Set(0.0),
            created_at: Set(Utc::now().fixed_offset()),
        };

        let created = self
            .follow_repo
            .insert(&txn, model)
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => AppError::Conflict("already following".to_string()),
                other => other,
            })?;

        txn.commit().await.map_err(db_err)?;
        self.invalidator.follow_graph_changed().await;

        info!(follower_id = %follower_id, following_id = %following_id, "User followed");
        Ok(created)
    }

    /// Unfollow a user.
    pub async fn unfollow(&self, principal: &Principal, following_id: &str) -> AppResult<()> {
        let follower_id = principal.require_user()?;

        let txn = self.db.begin().await.map_err(db_err)?;
        let removed = self
            .follow_repo
            .delete_by_pair(&txn, follower_id, following_id)
            .await?;
        if removed == 0 {
            return Err(AppError::NotFound("not following".to_string()));
        }
        txn.commit().await.map_err(db_err)?;
        self.invalidator.follow_graph_changed().await;

        info!(follower_id = %follower_id, following_id = %following_id, "User unfollowed");
        Ok(())
    }

    /// Change notification preferences on an edge.
    pub async fn update_preferences(
        &self,
        principal: &Principal,
        following_id: &str,
        input: FollowPreferencesInput,
    ) -> AppResult<follow::Model> {
        let follower_id = principal.require_user()?;

        let txn = self.db.begin().await.map_err(db_err)?;
        let edge = self
            .follow_repo
            .find_by_pair_in(&txn, follower_id, following_id)
            .await?
            .ok_or_else(|| AppError::NotFound("not following".to_string()))?;

        let mut model: follow::ActiveModel = edge.into();
        if let Some(notify) = input.notify_on_post {
            model.notify_on_post = Set(notify);
        }
        if let Some(notify) = input.notify_on_comment {
            model.notify_on_comment = Set(notify);
        }

        let updated = self.follow_repo.update(&txn, model).await?;
        txn.commit().await.map_err(db_err)?;
        Ok(updated)
    }

    /// Check if a user is following another user.
    pub async fn is_following(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        self.follow_repo
            .is_following(follower_id, following_id)
            .await
    }

    /// Edges out of `user_id`, most engaged first.
    pub async fn list_following(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> AppResult<Page<follow::Model>> {
        let (offset, limit) = page.bounds(self.max_page_size)?;
        let items = self
            .follow_repo
            .find_following(user_id, offset, limit)
            .await?;
        let total = if page.wants_total() {
            Some(self.follow_repo.count_following(user_id).await?)
        } else {
            None
        };
        Ok(Page::new(items, &page, total))
    }

    /// Edges into `user_id`, newest first.
    pub async fn list_followers(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> AppResult<Page<follow::Model>> {
        let (offset, limit) = page.bounds(self.max_page_size)?;
        let items = self
            .follow_repo
            .find_followers(user_id, offset, limit)
            .await?;
        let total = if page.wants_total() {
            Some(self.follow_repo.count_followers(user_id).await?)
        } else {
            None
        };
        Ok(Page::new(items, &page, total))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bazaar_common::ReadThroughCache;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_follow(follower_id: &str, following_id: &str) -> follow::Model {
        follow::Model {
            id: "f1".to_string(),
            follower_id: follower_id.to_string(),
            following_id: following_id.to_string(),
            notify_on_post: true,
            notify_on_comment: false,
            engagement_score: 0.0,
            created_at: Utc::now().fixed_offset(),
        }
    }

    fn service(db: DatabaseConnection) -> FollowingService {
        let db = Arc::new(db);
        FollowingService::new(
            db.clone(),
            FollowRepository::new(db),
            FeedInvalidator::new(ReadThroughCache::disabled()),
            100,
        )
    }

    #[tokio::test]
    async fn test_follow_yourself_returns_error() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let err = svc
            .follow(&Principal::authenticated("u1"), "u1", FollowOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_follow_twice_conflicts() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_follow("u1", "u2")]])
            .into_connection();
        let err = service(db)
            .follow(&Principal::authenticated("u1"), "u2", FollowOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg == "already following"));
    }

    #[tokio::test]
    async fn test_unfollow_without_edge_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let err = service(db)
            .unfollow(&Principal::authenticated("u1"), "u2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(msg) if msg == "not following"));
    }

    #[tokio::test]
    async fn test_anonymous_cannot_follow() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let err = svc
            .follow(&Principal::Anonymous, "u2", FollowOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn test_list_following_page_one_counts() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[
                create_test_follow("u1", "u2"),
                create_test_follow("u1", "u3"),
            ]])
            .append_query_results([[maplit::btreemap! {
                "num_items" => sea_orm::Value::BigInt(Some(2))
            }]])
            .into_connection();

        let page = service(db)
            .list_following("u1", PageRequest::new(1, 10))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, Some(2));
        assert!(!page.has_more);
    }
}
