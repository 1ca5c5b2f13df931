//! Count & score maintenance.
//!
//! Every counter change goes through [`CountMaintainer`], called by the write
//! path inside the same transaction as the row it reacts to. Updates are
//! single set-based statements: increments and clamped decrements, or a full
//! re-aggregation for reaction tallies. Nothing here reads a counter, adds to
//! it in memory and writes it back.

use std::collections::BTreeMap;
use std::str::FromStr;

use bazaar_common::{AppError, AppResult, EngagementWeights};
use bazaar_db::entities::{ReactionKind, TargetKind, comment};
use bazaar_db::repositories::{CommentRepository, PostRepository, ReactionRepository};
use chrono::Utc;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::services::engagement::{EngagementInputs, engagement_score};

/// Reaction counts by kind. Kinds with no reactions are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionTally(BTreeMap<ReactionKind, i64>);

impl ReactionTally {
    /// Build from `(kind, count)` aggregate rows.
    #[must_use]
    pub fn from_rows(rows: impl IntoIterator<Item = (ReactionKind, i64)>) -> Self {
        Self(rows.into_iter().filter(|(_, n)| *n > 0).collect())
    }

    /// Decode a stored tally column. Unknown keys and bad values are skipped.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };
        Self::from_rows(map.iter().filter_map(|(k, v)| {
            let kind = ReactionKind::from_str(k).ok()?;
            Some((kind, v.as_i64()?))
        }))
    }

    /// Encode for the tally column.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(kind, n)| (kind.as_str().to_string(), serde_json::Value::from(*n)))
                .collect(),
        )
    }

    /// Count of one kind.
    #[must_use]
    pub fn get(&self, kind: ReactionKind) -> i64 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    /// Sum over all kinds.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.0.values().sum()
    }

    /// Whether no reactions are counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Kinds with a non-zero count, in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (ReactionKind, i64)> + '_ {
        self.0.iter().map(|(k, n)| (*k, *n))
    }
}

/// Keeps denormalized counters and engagement scores in step with the graph.
#[derive(Clone)]
pub struct CountMaintainer {
    post_repo: PostRepository,
    comment_repo: CommentRepository,
    reaction_repo: ReactionRepository,
    weights: EngagementWeights,
}

impl CountMaintainer {
    /// Create a maintainer over the given repositories.
    #[must_use]
    pub const fn new(
        post_repo: PostRepository,
        comment_repo: CommentRepository,
        reaction_repo: ReactionRepository,
        weights: EngagementWeights,
    ) -> Self {
        Self {
            post_repo,
            comment_repo,
            reaction_repo,
            weights,
        }
    }

    /// A comment was inserted: bump the post (top-level) or the parent (reply).
    pub async fn on_comment_inserted<C: ConnectionTrait>(
        &self,
        conn: &C,
        comment: &comment::Model,
    ) -> AppResult<()> {
        match comment.parent_id.as_deref() {
            None => {
                self.post_repo
                    .increment_comment_count(conn, &comment.post_id)
                    .await?;
                self.recompute_engagement_score(conn, &comment.post_id)
                    .await?;
                debug!(post_id = %comment.post_id, comment_id = %comment.id, "comment_count +1");
            }
            Some(parent_id) => {
                self.comment_repo
                    .increment_reply_count(conn, parent_id)
                    .await?;
                debug!(parent_id = %parent_id, comment_id = %comment.id, "reply_count +1");
            }
        }
        Ok(())
    }

    /// A comment was deleted: the mirror of [`Self::on_comment_inserted`], clamped at zero.
    pub async fn on_comment_deleted<C: ConnectionTrait>(
        &self,
        conn: &C,
        comment: &comment::Model,
    ) -> AppResult<()> {
        match comment.parent_id.as_deref() {
            None => {
                self.post_repo
                    .decrement_comment_count(conn, &comment.post_id)
                    .await?;
                self.recompute_engagement_score(conn, &comment.post_id)
                    .await?;
                debug!(post_id = %comment.post_id, comment_id = %comment.id, "comment_count -1");
            }
            Some(parent_id) => {
                self.comment_repo
                    .decrement_reply_count(conn, parent_id)
                    .await?;
                debug!(parent_id = %parent_id, comment_id = %comment.id, "reply_count -1");
            }
        }
        Ok(())
    }

    /// Re-aggregate a target's live reactions into its tally and total.
    ///
    /// Used after insert, kind replacement and delete alike.
    pub async fn on_reaction_changed<C: ConnectionTrait>(
        &self,
        conn: &C,
        target_id: &str,
        target_kind: TargetKind,
    ) -> AppResult<ReactionTally> {
        let rows = self
            .reaction_repo
            .tally_in(conn, target_id, target_kind)
            .await?;
        let tally = ReactionTally::from_rows(rows);

        match target_kind {
            TargetKind::Post => {
                self.post_repo
                    .set_reaction_tally(conn, target_id, tally.to_json(), tally.total())
                    .await?;
                self.recompute_engagement_score(conn, target_id).await?;
            }
            TargetKind::Comment => {
                self.comment_repo
                    .set_reaction_tally(conn, target_id, tally.to_json(), tally.total())
                    .await?;
            }
        }

        debug!(target_id = %target_id, ?target_kind, total = tally.total(), "Reaction tally recomputed");
        Ok(tally)
    }

    /// `share_count += 1` on the original, then refresh its score.
    pub async fn on_share_created<C: ConnectionTrait>(
        &self,
        conn: &C,
        original_id: &str,
    ) -> AppResult<()> {
        self.post_repo
            .increment_share_count(conn, original_id)
            .await?;
        self.recompute_engagement_score(conn, original_id).await?;
        debug!(post_id = %original_id, "share_count +1");
        Ok(())
    }

    /// `share_count -= 1` on the original, then refresh its score.
    pub async fn on_share_deleted<C: ConnectionTrait>(
        &self,
        conn: &C,
        original_id: &str,
    ) -> AppResult<()> {
        self.post_repo
            .decrement_share_count(conn, original_id)
            .await?;
        self.recompute_engagement_score(conn, original_id).await?;
        debug!(post_id = %original_id, "share_count -1");
        Ok(())
    }

    /// `view_count += 1`, then refresh the score.
    pub async fn on_post_viewed<C: ConnectionTrait>(&self, conn: &C, post_id: &str) -> AppResult<()> {
        self.post_repo.increment_view_count(conn, post_id).await?;
        self.recompute_engagement_score(conn, post_id).await?;
        Ok(())
    }

    /// Re-read the post on `conn` and store its engagement score.
    pub async fn recompute_engagement_score<C: ConnectionTrait>(
        &self,
        conn: &C,
        post_id: &str,
    ) -> AppResult<f64> {
        let post = self
            .post_repo
            .find_in(conn, post_id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(post_id.to_string()))?;

        let score = engagement_score(
            &self.weights,
            &EngagementInputs::from_post(&post, Utc::now()),
        );
        self.post_repo
            .set_engagement_score(conn, post_id, score)
            .await?;
        Ok(score)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::test_support::{comment_fixture, post_fixture};
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn exec_ok() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    fn maintainer() -> CountMaintainer {
        let unused = Arc::new(DatabaseConnection::Disconnected);
        CountMaintainer::new(
            PostRepository::new(unused.clone()),
            CommentRepository::new(unused.clone()),
            ReactionRepository::new(unused),
            EngagementWeights::default(),
        )
    }

    #[tokio::test]
    async fn test_top_level_comment_bumps_post_only() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(), exec_ok()])
            .append_query_results([[post_fixture("p1", "author")]])
            .into_connection();

        maintainer()
            .on_comment_inserted(&db, &comment_fixture("c1", "p1", None))
            .await
            .unwrap();

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 3);
        let first = format!("{:?}", log[0]);
        assert!(first.contains("comment_count"));
        assert!(!log.iter().any(|t| format!("{t:?}").contains("reply_count")));
    }

    #[tokio::test]
    async fn test_reply_bumps_parent_only() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok()])
            .into_connection();

        maintainer()
            .on_comment_inserted(&db, &comment_fixture("c2", "p1", Some("c1")))
            .await
            .unwrap();

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 1);
        let sql = format!("{:?}", log[0]);
        assert!(sql.contains("reply_count"));
        assert!(!sql.contains("comment_count"));
    }

    #[tokio::test]
    async fn test_deleted_reply_uses_clamped_decrement() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok()])
            .into_connection();

        maintainer()
            .on_comment_deleted(&db, &comment_fixture("c2", "p1", Some("c1")))
            .await
            .unwrap();

        let sql = format!("{:?}", db.into_transaction_log()[0]);
        assert!(sql.contains("GREATEST(reply_count - 1, 0)"));
    }

    #[tokio::test]
    async fn test_recompute_on_missing_post_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<bazaar_db::entities::post::Model>::new()])
            .into_connection();

        let result = maintainer().recompute_engagement_score(&db, "gone").await;
        assert!(matches!(result, Err(AppError::PostNotFound(_))));
    }

    #[test]
    fn test_tally_drops_empty_kinds_and_sums() {
        let tally = ReactionTally::from_rows([
            (ReactionKind::Like, 2),
            (ReactionKind::Love, 0),
            (ReactionKind::Hug, 1),
        ]);
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.get(ReactionKind::Love), 0);
        assert_eq!(tally.to_json(), serde_json::json!({"like": 2, "hug": 1}));
    }

    #[test]
    fn test_tally_json_decode_skips_garbage() {
        let tally = ReactionTally::from_json(&serde_json::json!({
            "like": 1,
            "clap": 4,
            "wow": "two"
        }));
        assert_eq!(tally.iter().collect::<Vec<_>>(), vec![(ReactionKind::Like, 1)]);
        assert!(ReactionTally::from_json(&serde_json::json!([])).is_empty());
    }
}
