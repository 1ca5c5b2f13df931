//! Comment repository.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use crate::entities::{Comment, comment};
use crate::repositories::{db_err, decrement_clamped, escape_like};
use bazaar_common::{AppError, AppResult};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
};
use serde::{Deserialize, Serialize};

/// Comment ordering within a thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentSort {
    /// `created_at` descending.
    #[default]
    Newest,
    /// `created_at` ascending.
    Oldest,
    /// Most reactions first.
    Popular,
}

impl CommentSort {
    /// Wire name of the sort key.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::Popular => "popular",
        }
    }
}

impl FromStr for CommentSort {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "popular" => Ok(Self::Popular),
            other => Err(AppError::BadRequest(format!("unknown comment sort key: {other}"))),
        }
    }
}

/// Filters for top-level thread comments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentFilters {
    /// Only comments of this author.
    pub author_id: Option<String>,
    /// Created at or after.
    pub since: Option<DateTimeWithTimeZone>,
    /// Created at or before.
    pub until: Option<DateTimeWithTimeZone>,
    /// Case-insensitive substring of the content.
    pub text: Option<String>,
}

/// Comment repository for database operations.
#[derive(Clone)]
pub struct CommentRepository {
    db: Arc<DatabaseConnection>,
}

impl CommentRepository {
    /// Create a new comment repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a comment by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<comment::Model>> {
        Comment::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Find a comment by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<comment::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::CommentNotFound(id.to_string()))
    }

    /// Find a comment on `conn` without locking it.
    pub async fn find_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<Option<comment::Model>> {
        Comment::find_by_id(id).one(conn).await.map_err(db_err)
    }

    /// Find a comment on `conn` and lock its row until the transaction ends.
    pub async fn lock_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<Option<comment::Model>> {
        Comment::find_by_id(id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Insert a comment.
    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: comment::ActiveModel,
    ) -> AppResult<comment::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Update a comment.
    pub async fn update<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: comment::ActiveModel,
    ) -> AppResult<comment::Model> {
        model.update(conn).await.map_err(db_err)
    }

    /// Delete a comment. Its replies cascade.
    pub async fn delete<C: ConnectionTrait>(&self, conn: &C, id: &str) -> AppResult<u64> {
        let result = Comment::delete_by_id(id)
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    /// IDs of a comment and every comment below it, breadth first.
    pub async fn subtree_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        root_id: &str,
    ) -> AppResult<Vec<String>> {
        let mut ids = vec![root_id.to_string()];
        let mut seen: HashSet<String> = ids.iter().cloned().collect();
        let mut frontier = ids.clone();

        while !frontier.is_empty() {
            let children: Vec<String> = Comment::find()
                .select_only()
                .column(comment::Column::Id)
                .filter(comment::Column::ParentId.is_in(frontier))
                .into_tuple()
                .all(conn)
                .await
                .map_err(db_err)?;

            frontier = children
                .into_iter()
                .filter(|id| seen.insert(id.clone()))
                .collect();
            ids.extend(frontier.iter().cloned());
        }

        Ok(ids)
    }

    /// IDs of every comment on a post.
    pub async fn ids_by_post_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        post_id: &str,
    ) -> AppResult<Vec<String>> {
        Comment::find()
            .select_only()
            .column(comment::Column::Id)
            .filter(comment::Column::PostId.eq(post_id))
            .into_tuple()
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Every comment on a post, oldest first.
    pub async fn find_by_post_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        post_id: &str,
    ) -> AppResult<Vec<comment::Model>> {
        Comment::find()
            .filter(comment::Column::PostId.eq(post_id))
            .order_by_asc(comment::Column::CreatedAt)
            .order_by_asc(comment::Column::Id)
            .all(conn)
            .await
            .map_err(db_err)
    }

    // === Counters ===

    /// `reply_count += 1` on the parent.
    pub async fn increment_reply_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<()> {
        Comment::update_many()
            .col_expr(
                comment::Column::ReplyCount,
                Expr::col(comment::Column::ReplyCount).add(1),
            )
            .filter(comment::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// `reply_count -= 1` on the parent, never below zero.
    pub async fn decrement_reply_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<()> {
        Comment::update_many()
            .col_expr(
                comment::Column::ReplyCount,
                decrement_clamped(conn.get_database_backend(), "reply_count"),
            )
            .filter(comment::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Overwrite `reply_count` with a recount.
    pub async fn set_reply_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
        count: i64,
    ) -> AppResult<()> {
        Comment::update_many()
            .col_expr(comment::Column::ReplyCount, Expr::value(count))
            .filter(comment::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Overwrite the reaction tally and total.
    pub async fn set_reaction_tally<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
        tally: serde_json::Value,
        total: i64,
    ) -> AppResult<()> {
        Comment::update_many()
            .col_expr(comment::Column::Reactions, Expr::value(tally))
            .col_expr(comment::Column::ReactionCount, Expr::value(total))
            .filter(comment::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Count top-level comments on a post, hidden and inactive included.
    pub async fn count_top_level_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        post_id: &str,
    ) -> AppResult<u64> {
        Comment::find()
            .filter(comment::Column::PostId.eq(post_id))
            .filter(comment::Column::ParentId.is_null())
            .count(conn)
            .await
            .map_err(db_err)
    }

    // === Thread reads ===

    /// Comments `viewer_id` may see: active, and not hidden unless their own.
    fn visible_to(viewer_id: Option<&str>) -> Condition {
        let mut shown = Condition::any().add(comment::Column::IsHidden.eq(false));
        if let Some(viewer) = viewer_id {
            shown = shown.add(comment::Column::AuthorId.eq(viewer));
        }

        Condition::all()
            .add(comment::Column::IsActive.eq(true))
            .add(shown)
    }

    fn top_level_select(
        post_id: &str,
        viewer_id: Option<&str>,
        filters: &CommentFilters,
    ) -> Select<Comment> {
        let mut condition = Condition::all()
            .add(comment::Column::PostId.eq(post_id))
            .add(comment::Column::ParentId.is_null())
            .add(Self::visible_to(viewer_id));

        if let Some(author_id) = &filters.author_id {
            condition = condition.add(comment::Column::AuthorId.eq(author_id.as_str()));
        }
        if let Some(since) = filters.since {
            condition = condition.add(comment::Column::CreatedAt.gte(since));
        }
        if let Some(until) = filters.until {
            condition = condition.add(comment::Column::CreatedAt.lte(until));
        }
        if let Some(text) = filters.text.as_deref().filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", escape_like(&text.to_lowercase()));
            condition = condition.add(
                Expr::expr(Func::lower(Expr::col((Comment, comment::Column::Content))))
                    .like(LikeExpr::new(pattern).escape('\\')),
            );
        }

        Comment::find().filter(condition)
    }

    fn order(select: Select<Comment>, sort: CommentSort) -> Select<Comment> {
        match sort {
            CommentSort::Newest => select
                .order_by_desc(comment::Column::CreatedAt)
                .order_by_desc(comment::Column::Id),
            CommentSort::Oldest => select
                .order_by_asc(comment::Column::CreatedAt)
                .order_by_asc(comment::Column::Id),
            CommentSort::Popular => select
                .order_by_desc(comment::Column::ReactionCount)
                .order_by_desc(comment::Column::CreatedAt)
                .order_by_desc(comment::Column::Id),
        }
    }

    /// Get a page of top-level comments on a post.
    pub async fn find_top_level(
        &self,
        post_id: &str,
        viewer_id: Option<&str>,
        filters: &CommentFilters,
        sort: CommentSort,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<comment::Model>> {
        Self::order(Self::top_level_select(post_id, viewer_id, filters), sort)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Number of top-level comments the viewer can see.
    pub async fn count_top_level(
        &self,
        post_id: &str,
        viewer_id: Option<&str>,
        filters: &CommentFilters,
    ) -> AppResult<u64> {
        Self::top_level_select(post_id, viewer_id, filters)
            .count(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Get up to `limit` direct replies of a comment.
    pub async fn find_replies(
        &self,
        parent_id: &str,
        viewer_id: Option<&str>,
        sort: CommentSort,
        limit: u64,
    ) -> AppResult<Vec<comment::Model>> {
        let select = Comment::find()
            .filter(comment::Column::ParentId.eq(parent_id))
            .filter(Self::visible_to(viewer_id));

        Self::order(select, sort)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Direct children of several comments, oldest first, at most `limit`.
    pub async fn find_children(
        &self,
        parent_ids: &[String],
        viewer_id: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<comment::Model>> {
        if parent_ids.is_empty() {
            return Ok(vec![]);
        }

        Comment::find()
            .filter(comment::Column::ParentId.is_in(parent_ids.to_vec()))
            .filter(Self::visible_to(viewer_id))
            .order_by_asc(comment::Column::CreatedAt)
            .order_by_asc(comment::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, QueryTrait};
    use serde_json::json;

    fn create_test_comment(id: &str, post_id: &str, parent_id: Option<&str>) -> comment::Model {
        let now = Utc::now().fixed_offset();
        comment::Model {
            id: id.to_string(),
            post_id: post_id.to_string(),
            author_id: "user1".to_string(),
            content: "nice".to_string(),
            parent_id: parent_id.map(str::to_string),
            reply_count: 0,
            reaction_count: 0,
            reactions: json!({}),
            media: json!([]),
            is_edited: false,
            is_hidden: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_get_by_id_not_found_returns_error() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<comment::Model>::new()])
                .into_connection(),
        );

        let repo = CommentRepository::new(db);
        match repo.get_by_id("missing").await {
            Err(AppError::CommentNotFound(id)) => assert_eq!(id, "missing"),
            _ => panic!("Expected CommentNotFound error"),
        }
    }

    #[tokio::test]
    async fn test_find_replies() {
        let r1 = create_test_comment("c2", "post1", Some("c1"));
        let r2 = create_test_comment("c3", "post1", Some("c1"));

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[r1, r2]])
                .into_connection(),
        );

        let repo = CommentRepository::new(db);
        let replies = repo
            .find_replies("c1", None, CommentSort::Newest, 3)
            .await
            .unwrap();

        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|c| c.parent_id.as_deref() == Some("c1")));
    }

    #[tokio::test]
    async fn test_find_children_of_nothing_skips_query() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = CommentRepository::new(db);
        let children = repo.find_children(&[], None, 10).await.unwrap();

        assert!(children.is_empty());
    }

    #[test]
    fn test_top_level_select_hides_hidden_comments_from_others() {
        let sql = CommentRepository::top_level_select("p1", Some("u1"), &CommentFilters::default())
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(sql.contains(r#""comment"."parent_id" IS NULL"#));
        assert!(sql.contains(r#""comment"."is_hidden" = FALSE"#));
        assert!(sql.contains(r#""comment"."author_id" = 'u1'"#));
    }

    #[test]
    fn test_text_filter_is_case_insensitive_and_escaped() {
        let filters = CommentFilters {
            text: Some("50% OFF".to_string()),
            ..CommentFilters::default()
        };
        let sql = CommentRepository::top_level_select("p1", None, &filters)
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(sql.contains(r#"LOWER("comment"."content") LIKE"#));
        assert!(sql.contains("ESCAPE"));
        assert!(sql.contains("off"));
        assert!(!sql.contains("OFF"));
    }

    #[test]
    fn test_comment_sort_parsing() {
        assert_eq!("popular".parse::<CommentSort>().unwrap(), CommentSort::Popular);
        assert!(matches!("best".parse::<CommentSort>(), Err(AppError::BadRequest(_))));
    }
}
