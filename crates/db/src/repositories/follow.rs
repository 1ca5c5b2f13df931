//! Follow repository.

use std::sync::Arc;

use crate::entities::{Follow, follow};
use crate::repositories::db_err;
use bazaar_common::AppResult;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};

/// Follow repository for database operations.
#[derive(Clone)]
pub struct FollowRepository {
    db: Arc<DatabaseConnection>,
}

impl FollowRepository {
    /// Create a new follow repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a follow edge by follower and followed user.
    pub async fn find_by_pair(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<Option<follow::Model>> {
        self.find_by_pair_in(self.db.as_ref(), follower_id, following_id)
            .await
    }

    /// Find the edge `follower_id -> following_id` on `conn`.
    pub async fn find_by_pair_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<Option<follow::Model>> {
        Follow::find()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::FollowingId.eq(following_id))
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Check if a user is following another user.
    pub async fn is_following(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        Ok(self.find_by_pair(follower_id, following_id).await?.is_some())
    }

    /// Create a follow edge. A duplicate pair surfaces as `Conflict`.
    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: follow::ActiveModel,
    ) -> AppResult<follow::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Update an edge.
    pub async fn update<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: follow::ActiveModel,
    ) -> AppResult<follow::Model> {
        model.update(conn).await.map_err(db_err)
    }

    /// Delete a follow edge. Returns the number of rows removed.
    pub async fn delete_by_pair<C: ConnectionTrait>(
        &self,
        conn: &C,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<u64> {
        let result = Follow::delete_many()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::FollowingId.eq(following_id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    /// Add `delta` to the edge's engagement score, if the edge exists.
    pub async fn add_engagement<C: ConnectionTrait>(
        &self,
        conn: &C,
        follower_id: &str,
        following_id: &str,
        delta: f64,
    ) -> AppResult<()> {
        Follow::update_many()
            .col_expr(
                follow::Column::EngagementScore,
                Expr::col(follow::Column::EngagementScore).add(delta),
            )
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::FollowingId.eq(following_id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Users a user follows, most engaged first.
    pub async fn find_following(
        &self,
        follower_id: &str,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<follow::Model>> {
        Follow::find()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .order_by_desc(follow::Column::EngagementScore)
            .order_by_desc(follow::Column::CreatedAt)
            .order_by_desc(follow::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Followers of a user, newest first.
    pub async fn find_followers(
        &self,
        following_id: &str,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<follow::Model>> {
        Follow::find()
            .filter(follow::Column::FollowingId.eq(following_id))
            .order_by_desc(follow::Column::CreatedAt)
            .order_by_desc(follow::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// How many users `follower_id` follows.
    pub async fn count_following(&self, follower_id: &str) -> AppResult<u64> {
        Follow::find()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .count(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// How many users follow `following_id`.
    pub async fn count_followers(&self, following_id: &str) -> AppResult<u64> {
        Follow::find()
            .filter(follow::Column::FollowingId.eq(following_id))
            .count(self.db.as_ref())
            .await
            .map_err(db_err)
    }
}
