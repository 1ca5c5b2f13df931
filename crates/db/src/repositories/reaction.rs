//! Reaction repository.

use std::sync::Arc;

use crate::entities::{Reaction, ReactionKind, TargetKind, reaction};
use crate::repositories::db_err;
use bazaar_common::AppResult;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select,
};

/// Reaction repository for database operations.
#[derive(Clone)]
pub struct ReactionRepository {
    db: Arc<DatabaseConnection>,
}

impl ReactionRepository {
    /// Create a new reaction repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn by_target(target_id: &str, target_kind: TargetKind) -> Select<Reaction> {
        Reaction::find()
            .filter(reaction::Column::TargetId.eq(target_id))
            .filter(reaction::Column::TargetKind.eq(target_kind))
    }

    /// Find a user's reaction on a target.
    pub async fn find_by_user_and_target(
        &self,
        user_id: &str,
        target_id: &str,
        target_kind: TargetKind,
    ) -> AppResult<Option<reaction::Model>> {
        self.find_by_user_and_target_in(self.db.as_ref(), user_id, target_id, target_kind)
            .await
    }

    /// The user's reaction on a target, read on `conn`.
    pub async fn find_by_user_and_target_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        target_id: &str,
        target_kind: TargetKind,
    ) -> AppResult<Option<reaction::Model>> {
        Self::by_target(target_id, target_kind)
            .filter(reaction::Column::UserId.eq(user_id))
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Insert a reaction, or replace the kind of the user's existing one.
    pub async fn upsert<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: reaction::ActiveModel,
    ) -> AppResult<()> {
        Reaction::insert(model)
            .on_conflict(
                OnConflict::columns([
                    reaction::Column::UserId,
                    reaction::Column::TargetId,
                    reaction::Column::TargetKind,
                ])
                .update_columns([reaction::Column::Kind, reaction::Column::UpdatedAt])
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Delete a user's reaction on a target. Returns the number of rows removed.
    pub async fn delete_by_user_and_target<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        target_id: &str,
        target_kind: TargetKind,
    ) -> AppResult<u64> {
        let result = Reaction::delete_many()
            .filter(reaction::Column::UserId.eq(user_id))
            .filter(reaction::Column::TargetId.eq(target_id))
            .filter(reaction::Column::TargetKind.eq(target_kind))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    /// Delete every reaction on the given targets.
    pub async fn delete_for_targets<C: ConnectionTrait>(
        &self,
        conn: &C,
        target_ids: &[String],
        target_kind: TargetKind,
    ) -> AppResult<u64> {
        if target_ids.is_empty() {
            return Ok(0);
        }

        let result = Reaction::delete_many()
            .filter(reaction::Column::TargetId.is_in(target_ids.to_vec()))
            .filter(reaction::Column::TargetKind.eq(target_kind))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    /// Live reaction counts of a target, grouped by kind.
    pub async fn tally_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        target_id: &str,
        target_kind: TargetKind,
    ) -> AppResult<Vec<(ReactionKind, i64)>> {
        Self::by_target(target_id, target_kind)
            .select_only()
            .column(reaction::Column::Kind)
            .column_as(Expr::col(reaction::Column::Id).count(), "count")
            .group_by(reaction::Column::Kind)
            .into_tuple()
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// A user's reactions on several targets of one kind.
    pub async fn find_for_user_targets(
        &self,
        user_id: &str,
        target_ids: &[String],
        target_kind: TargetKind,
    ) -> AppResult<Vec<reaction::Model>> {
        if target_ids.is_empty() {
            return Ok(vec![]);
        }

        Reaction::find()
            .filter(reaction::Column::UserId.eq(user_id))
            .filter(reaction::Column::TargetId.is_in(target_ids.to_vec()))
            .filter(reaction::Column::TargetKind.eq(target_kind))
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Reactions on a target, newest first.
    pub async fn find_by_target(
        &self,
        target_id: &str,
        target_kind: TargetKind,
        kind: Option<ReactionKind>,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<reaction::Model>> {
        let mut query = Self::by_target(target_id, target_kind);
        if let Some(kind) = kind {
            query = query.filter(reaction::Column::Kind.eq(kind));
        }

        query
            .order_by_desc(reaction::Column::CreatedAt)
            .order_by_desc(reaction::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Number of reactions on a target, optionally of one kind.
    pub async fn count_by_target(
        &self,
        target_id: &str,
        target_kind: TargetKind,
        kind: Option<ReactionKind>,
    ) -> AppResult<u64> {
        let mut query = Self::by_target(target_id, target_kind);
        if let Some(kind) = kind {
            query = query.filter(reaction::Column::Kind.eq(kind));
        }

        query.count(self.db.as_ref()).await.map_err(db_err)
    }
}
