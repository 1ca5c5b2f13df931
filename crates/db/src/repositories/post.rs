//! Post repository.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::entities::{Follow, Post, PostKind, Visibility, follow, post};
use crate::repositories::{db_err, decrement_clamped};
use bazaar_common::{AppError, AppResult};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, Query, SelectStatement, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbBackend,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
};
use serde::{Deserialize, Serialize};

/// Timeline ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineSort {
    /// `created_at` descending.
    #[default]
    Newest,
    /// `created_at` ascending.
    Oldest,
    /// Engagement score, all time.
    Popular,
    /// Engagement score within the trending window.
    Trending,
    /// View count.
    MostViewed,
    /// Comment count.
    MostCommented,
}

impl TimelineSort {
    /// Wire name of the sort key.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::Popular => "popular",
            Self::Trending => "trending",
            Self::MostViewed => "most_viewed",
            Self::MostCommented => "most_commented",
        }
    }
}

impl fmt::Display for TimelineSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimelineSort {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "popular" => Ok(Self::Popular),
            "trending" => Ok(Self::Trending),
            "most_viewed" => Ok(Self::MostViewed),
            "most_commented" => Ok(Self::MostCommented),
            other => Err(AppError::BadRequest(format!("unknown sort key: {other}"))),
        }
    }
}

/// Timeline filters. All set filters are ANDed with the visibility rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimelineFilters {
    /// Only posts of this kind.
    pub kind: Option<PostKind>,
    /// Only posts with (or without) attachments.
    pub has_media: Option<bool>,
    /// Only posts of this author.
    pub author_id: Option<String>,
    /// Normalized hashtag (lowercase, no `#`).
    pub hashtag: Option<String>,
}

/// A fully resolved timeline read.
#[derive(Debug, Clone)]
pub struct TimelineQuery<'a> {
    /// Caller, `None` for anonymous reads.
    pub viewer_id: Option<&'a str>,
    /// Filters ANDed with visibility.
    pub filters: &'a TimelineFilters,
    /// Ordering, always tie-broken by recency.
    pub sort: TimelineSort,
    /// Lower bound on `created_at` (inclusive).
    pub since: Option<DateTimeWithTimeZone>,
    /// Let the viewer see their own private posts.
    pub include_own_private: bool,
    /// Order pinned posts first.
    pub pinned_first: bool,
}

/// Post repository for database operations.
#[derive(Clone)]
pub struct PostRepository {
    db: Arc<DatabaseConnection>,
}

impl PostRepository {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a post by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<post::Model>> {
        Post::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Find a post by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<post::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(id.to_string()))
    }

    /// Find a post on `conn`.
    pub async fn find_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<Option<post::Model>> {
        Post::find_by_id(id).one(conn).await.map_err(db_err)
    }

    /// Find a post on `conn` and lock its row until the transaction ends.
    pub async fn lock_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<Option<post::Model>> {
        Post::find_by_id(id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Insert a post.
    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: post::ActiveModel,
    ) -> AppResult<post::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Update a post.
    pub async fn update<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: post::ActiveModel,
    ) -> AppResult<post::Model> {
        model.update(conn).await.map_err(db_err)
    }

    /// Delete a post. Comments cascade; shares keep existing with a null original.
    pub async fn delete<C: ConnectionTrait>(&self, conn: &C, id: &str) -> AppResult<u64> {
        let result = Post::delete_by_id(id).exec(conn).await.map_err(db_err)?;
        Ok(result.rows_affected)
    }

    // === Counters (single UPDATE statements, no fetch) ===

    /// `comment_count += 1`.
    pub async fn increment_comment_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<()> {
        self.apply(conn, id, post::Column::CommentCount, Expr::col(post::Column::CommentCount).add(1))
            .await
    }

    /// `comment_count -= 1`, never below zero.
    pub async fn decrement_comment_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<()> {
        let expr = decrement_clamped(conn.get_database_backend(), "comment_count");
        self.apply(conn, id, post::Column::CommentCount, expr).await
    }

    /// `share_count += 1`.
    pub async fn increment_share_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<()> {
        self.apply(conn, id, post::Column::ShareCount, Expr::col(post::Column::ShareCount).add(1))
            .await
    }

    /// `share_count -= 1`, never below zero.
    pub async fn decrement_share_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<()> {
        let expr = decrement_clamped(conn.get_database_backend(), "share_count");
        self.apply(conn, id, post::Column::ShareCount, expr).await
    }

    /// `view_count += 1`.
    pub async fn increment_view_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<()> {
        self.apply(conn, id, post::Column::ViewCount, Expr::col(post::Column::ViewCount).add(1))
            .await
    }

    /// Overwrite the reaction tally and total.
    pub async fn set_reaction_tally<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
        tally: serde_json::Value,
        total: i64,
    ) -> AppResult<()> {
        Post::update_many()
            .col_expr(post::Column::Reactions, Expr::value(tally))
            .col_expr(post::Column::ReactionCount, Expr::value(total))
            .filter(post::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Store a freshly computed engagement score.
    pub async fn set_engagement_score<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
        score: f64,
    ) -> AppResult<()> {
        self.apply(conn, id, post::Column::EngagementScore, Expr::value(score))
            .await
    }

    /// Overwrite the comment and share counts (audit repair).
    pub async fn overwrite_counters<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
        comment_count: i64,
        share_count: i64,
    ) -> AppResult<()> {
        Post::update_many()
            .col_expr(post::Column::CommentCount, Expr::value(comment_count))
            .col_expr(post::Column::ShareCount, Expr::value(share_count))
            .filter(post::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
        column: post::Column,
        expr: SimpleExpr,
    ) -> AppResult<()> {
        Post::update_many()
            .col_expr(column, expr)
            .filter(post::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Count live shares of a post.
    pub async fn count_shares_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        original_id: &str,
    ) -> AppResult<u64> {
        Post::find()
            .filter(post::Column::OriginalPostId.eq(original_id))
            .filter(post::Column::Kind.eq(PostKind::Share))
            .count(conn)
            .await
            .map_err(db_err)
    }

    // === Feed reads ===

    /// Get a timeline page.
    pub async fn find_timeline(
        &self,
        query: &TimelineQuery<'_>,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<post::Model>> {
        let select = Self::timeline_select(self.db.get_database_backend(), query);
        Self::order_timeline(select, query)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Count every post a timeline query matches.
    pub async fn count_timeline(&self, query: &TimelineQuery<'_>) -> AppResult<u64> {
        Self::timeline_select(self.db.get_database_backend(), query)
            .count(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Get a trending page: public, active, created at or after `since`.
    pub async fn find_trending(
        &self,
        since: DateTimeWithTimeZone,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<post::Model>> {
        Self::trending_select(since)
            .order_by_desc(post::Column::EngagementScore)
            .order_by_desc(post::Column::CreatedAt)
            .order_by_desc(post::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Number of public posts created since `since`.
    pub async fn count_trending(&self, since: DateTimeWithTimeZone) -> AppResult<u64> {
        Self::trending_select(since)
            .count(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    fn trending_select(since: DateTimeWithTimeZone) -> Select<Post> {
        Post::find()
            .filter(post::Column::IsActive.eq(true))
            .filter(post::Column::Visibility.eq(Visibility::Public))
            .filter(post::Column::CreatedAt.gte(since))
    }

    /// Authors `follower_id` follows.
    #[must_use]
    pub fn following_ids_subquery(follower_id: &str) -> SelectStatement {
        Query::select()
            .column(follow::Column::FollowingId)
            .from(Follow)
            .and_where(follow::Column::FollowerId.eq(follower_id))
            .to_owned()
    }

    /// Posts `viewer_id` may see.
    ///
    /// Public always; followers-only when the viewer follows the author or is
    /// the author; private only for the author and only when asked for.
    #[must_use]
    pub fn visibility_condition(viewer_id: Option<&str>, include_own_private: bool) -> Condition {
        let mut visible = Condition::any().add(post::Column::Visibility.eq(Visibility::Public));

        if let Some(viewer) = viewer_id {
            visible = visible.add(
                Condition::all()
                    .add(post::Column::Visibility.eq(Visibility::Followers))
                    .add(
                        Condition::any()
                            .add(post::Column::AuthorId.eq(viewer))
                            .add(
                                post::Column::AuthorId
                                    .in_subquery(Self::following_ids_subquery(viewer)),
                            ),
                    ),
            );

            if include_own_private {
                visible = visible.add(
                    Condition::all()
                        .add(post::Column::Visibility.eq(Visibility::Private))
                        .add(post::Column::AuthorId.eq(viewer)),
                );
            }
        }

        visible
    }

    fn hashtag_condition(backend: DbBackend, tag: &str) -> SimpleExpr {
        match backend {
            DbBackend::Sqlite => Expr::cust_with_values(
                r#"EXISTS (SELECT 1 FROM json_each("post"."hashtags") WHERE json_each.value = ?)"#,
                [tag],
            ),
            _ => Expr::cust_with_values(
                r#""post"."hashtags" @> CAST($1 AS jsonb)"#,
                [serde_json::json!([tag]).to_string()],
            ),
        }
    }

    fn timeline_select(backend: DbBackend, query: &TimelineQuery<'_>) -> Select<Post> {
        let mut condition = Condition::all()
            .add(post::Column::IsActive.eq(true))
            .add(Self::visibility_condition(
                query.viewer_id,
                query.include_own_private,
            ));

        let filters = query.filters;
        if let Some(kind) = filters.kind {
            condition = condition.add(post::Column::Kind.eq(kind));
        }
        if let Some(has_media) = filters.has_media {
            condition = condition.add(post::Column::HasMedia.eq(has_media));
        }
        if let Some(author_id) = &filters.author_id {
            condition = condition.add(post::Column::AuthorId.eq(author_id.as_str()));
        }
        if let Some(tag) = &filters.hashtag {
            condition = condition.add(Self::hashtag_condition(backend, tag));
        }
        if let Some(since) = query.since {
            condition = condition.add(post::Column::CreatedAt.gte(since));
        }

        Post::find().filter(condition)
    }

    fn order_timeline(mut select: Select<Post>, query: &TimelineQuery<'_>) -> Select<Post> {
        if query.pinned_first {
            select = select.order_by_desc(post::Column::IsPinned);
        }

        select = match query.sort {
            TimelineSort::Newest => select,
            TimelineSort::Oldest => {
                return select
                    .order_by_asc(post::Column::CreatedAt)
                    .order_by_asc(post::Column::Id);
            }
            TimelineSort::Popular | TimelineSort::Trending => {
                select.order_by_desc(post::Column::EngagementScore)
            }
            TimelineSort::MostViewed => select.order_by_desc(post::Column::ViewCount),
            TimelineSort::MostCommented => select.order_by_desc(post::Column::CommentCount),
        };

        select
            .order_by_desc(post::Column::CreatedAt)
            .order_by_desc(post::Column::Id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, QueryTrait};
    use serde_json::json;

    fn create_test_post(id: &str, author_id: &str, visibility: Visibility) -> post::Model {
        let now = Utc::now().fixed_offset();
        post::Model {
            id: id.to_string(),
            author_id: author_id.to_string(),
            content: "hello #bazaar".to_string(),
            kind: PostKind::Standard,
            visibility,
            media: json!([]),
            has_media: false,
            hashtags: json!(["bazaar"]),
            keywords: json!(["bazaar", "hello"]),
            view_count: 0,
            share_count: 0,
            comment_count: 0,
            reaction_count: 0,
            reactions: json!({}),
            engagement_score: 0.0,
            is_pinned: false,
            is_edited: false,
            is_active: true,
            original_post_id: None,
            share_comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_find_by_id_found() {
        let post = create_test_post("post1", "user1", Visibility::Public);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post.clone()]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.find_by_id("post1").await.unwrap();

        let found = result.unwrap();
        assert_eq!(found.id, "post1");
        assert_eq!(found.hashtag_list(), vec!["bazaar"]);
    }

    #[tokio::test]
    async fn test_get_by_id_not_found_returns_error() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.get_by_id("nonexistent").await;

        match result {
            Err(AppError::PostNotFound(id)) => assert_eq!(id, "nonexistent"),
            _ => panic!("Expected PostNotFound error"),
        }
    }

    #[tokio::test]
    async fn test_find_timeline_returns_rows() {
        let p1 = create_test_post("p1", "user1", Visibility::Public);
        let p2 = create_test_post("p2", "user2", Visibility::Followers);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[p1, p2]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let filters = TimelineFilters::default();
        let query = TimelineQuery {
            viewer_id: Some("viewer"),
            filters: &filters,
            sort: TimelineSort::Newest,
            since: None,
            include_own_private: false,
            pinned_first: false,
        };
        let result = repo.find_timeline(&query, 0, 20).await.unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_increment_comment_count() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let repo = PostRepository::new(Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        ));
        repo.increment_comment_count(&db, "post1").await.unwrap();

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 1);
        assert!(format!("{:?}", log[0]).contains("comment_count"));
    }

    #[test]
    fn test_anonymous_visibility_is_public_only() {
        let sql = Post::find()
            .filter(PostRepository::visibility_condition(None, false))
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains(r#""post"."visibility" = 'public'"#));
        assert!(!sql.contains("followers"));
        assert!(!sql.contains("private"));
    }

    #[test]
    fn test_viewer_visibility_uses_follow_subquery() {
        let sql = Post::find()
            .filter(PostRepository::visibility_condition(Some("u1"), false))
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains("'followers'"));
        assert!(sql.contains(r#"IN (SELECT "following_id" FROM "follow""#));
        assert!(sql.contains(r#""follow"."follower_id" = 'u1'"#));
        assert!(!sql.contains("'private'"));
    }

    #[test]
    fn test_own_private_only_when_requested() {
        let sql = Post::find()
            .filter(PostRepository::visibility_condition(Some("u1"), true))
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains("'private'"));
    }

    #[test]
    fn test_hashtag_condition_per_backend() {
        let pg = Post::find()
            .filter(PostRepository::hashtag_condition(DbBackend::Postgres, "rust"))
            .build(DbBackend::Postgres)
            .to_string();
        let lite = Post::find()
            .filter(PostRepository::hashtag_condition(DbBackend::Sqlite, "rust"))
            .build(DbBackend::Sqlite)
            .to_string();

        assert!(pg.contains(r#"@> CAST('["rust"]' AS jsonb)"#));
        assert!(lite.contains("json_each"));
        assert!(lite.contains("'rust'"));
    }

    #[test]
    fn test_hashtag_condition_binds_value_on_postgres() {
        let stmt = Post::find()
            .filter(PostRepository::hashtag_condition(DbBackend::Postgres, "rust"))
            .build(DbBackend::Postgres);

        assert!(stmt.sql.contains(r#""post"."hashtags" @> CAST($1 AS jsonb)"#));
        assert!(!stmt.sql.contains('?'));
        let values = stmt.values.unwrap().0;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], sea_orm::Value::from(r#"["rust"]"#.to_string()));
    }

    #[test]
    fn test_hashtag_condition_binds_value_on_sqlite() {
        let stmt = Post::find()
            .filter(PostRepository::hashtag_condition(DbBackend::Sqlite, "rust"))
            .build(DbBackend::Sqlite);

        let values = stmt.values.unwrap().0;
        assert_eq!(values, vec![sea_orm::Value::from("rust")]);
    }

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!("most_viewed".parse::<TimelineSort>().unwrap(), TimelineSort::MostViewed);
        assert_eq!(TimelineSort::MostCommented.to_string(), "most_commented");

        match "hottest".parse::<TimelineSort>() {
            Err(AppError::BadRequest(msg)) => assert!(msg.contains("hottest")),
            _ => panic!("Expected BadRequest error"),
        }
    }

    #[test]
    fn test_oldest_sort_is_fully_ascending() {
        let filters = TimelineFilters::default();
        let query = TimelineQuery {
            viewer_id: None,
            filters: &filters,
            sort: TimelineSort::Oldest,
            since: None,
            include_own_private: false,
            pinned_first: false,
        };
        let sql = PostRepository::order_timeline(Post::find(), &query)
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.ends_with(r#"ORDER BY "post"."created_at" ASC, "post"."id" ASC"#));
    }
}
