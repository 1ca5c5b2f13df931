//! Counter audit and repair.
//!
//! Recounts a post's denormalized counters from the live rows and reports
//! every mismatch. Repair overwrites the cached values with the recount.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use bazaar_common::{AppError, AppResult};
use bazaar_db::db_err;
use bazaar_db::entities::{TargetKind, comment, post};
use bazaar_db::repositories::{CommentRepository, PostRepository, ReactionRepository};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::services::counters::{CountMaintainer, ReactionTally};
use crate::services::invalidation::FeedInvalidator;

/// One cached counter that disagrees with the live rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDrift {
    /// Post or comment the counter belongs to.
    pub target_id: String,
    /// Counter name, e.g. `comment_count` or `reactions.love`.
    pub field: String,
    /// Value stored on the row.
    pub cached: i64,
    /// Value recounted from source rows.
    pub actual: i64,
}

/// Outcome of auditing one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Audited post.
    pub post_id: String,
    /// Every mismatch found.
    pub drifts: Vec<CounterDrift>,
    /// Number of comments whose counters were checked.
    pub checked_comments: usize,
}

impl AuditReport {
    /// Whether no drift was found.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty()
    }
}

/// Recounted values, kept so repair can write them back.
struct Recount {
    comment_count: i64,
    share_count: i64,
    post_tally: ReactionTally,
    reply_counts: HashMap<String, i64>,
    comment_tallies: HashMap<String, ReactionTally>,
}

/// Recounts cached counters against their source rows.
#[derive(Clone)]
pub struct AuditService {
    db: Arc<DatabaseConnection>,
    post_repo: PostRepository,
    comment_repo: CommentRepository,
    reaction_repo: ReactionRepository,
    counters: CountMaintainer,
    invalidator: FeedInvalidator,
}

impl AuditService {
    /// Create an audit service.
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        post_repo: PostRepository,
        comment_repo: CommentRepository,
        reaction_repo: ReactionRepository,
        counters: CountMaintainer,
        invalidator: FeedInvalidator,
    ) -> Self {
        Self {
            db,
            post_repo,
            comment_repo,
            reaction_repo,
            counters,
            invalidator,
        }
    }

    /// Compare a post's cached counters, and those of its comments, with a recount.
    pub async fn audit_post(&self, post_id: &str) -> AppResult<AuditReport> {
        let post = self
            .post_repo
            .find_in(self.db.as_ref(), post_id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(post_id.to_string()))?;
        let comments = self
            .comment_repo
            .find_by_post_in(self.db.as_ref(), post_id)
            .await?;

        let recount = self.recount(self.db.as_ref(), &post, &comments).await?;
        let report = build_report(&post, &comments, &recount);
        if !report.is_consistent() {
            warn!(post_id = %post_id, drifts = report.drifts.len(), "Counter drift detected");
        }
        Ok(report)
    }

    /// Audit a post and overwrite every cached counter with the recount.
    ///
    /// Returns the drift found before the repair.
    pub async fn repair_post(&self, post_id: &str) -> AppResult<AuditReport> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let post = self
            .post_repo
            .lock_in(&txn, post_id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(post_id.to_string()))?;
        let comments = self.comment_repo.find_by_post_in(&txn, post_id).await?;

        let recount = self.recount(&txn, &post, &comments).await?;
        let report = build_report(&post, &comments, &recount);

        self.post_repo
            .overwrite_counters(&txn, post_id, recount.comment_count, recount.share_count)
            .await?;
        self.post_repo
            .set_reaction_tally(
                &txn,
                post_id,
                recount.post_tally.to_json(),
                recount.post_tally.total(),
            )
            .await?;
        for comment in &comments {
            let replies = recount.reply_counts.get(&comment.id).copied().unwrap_or(0);
            self.comment_repo
                .set_reply_count(&txn, &comment.id, replies)
                .await?;
            let tally = recount
                .comment_tallies
                .get(&comment.id)
                .cloned()
                .unwrap_or_default();
            self.comment_repo
                .set_reaction_tally(&txn, &comment.id, tally.to_json(), tally.total())
                .await?;
        }
        self.counters
            .recompute_engagement_score(&txn, post_id)
            .await?;

        txn.commit().await.map_err(db_err)?;
        self.invalidator.post_changed(post_id).await;

        info!(post_id = %post_id, repaired = report.drifts.len(), "Counters repaired");
        Ok(report)
    }

    async fn recount<C: ConnectionTrait>(
        &self,
        conn: &C,
        post: &post::Model,
        comments: &[comment::Model],
    ) -> AppResult<Recount> {
        let comment_count = comments.iter().filter(|c| c.parent_id.is_none()).count();
        let share_count = self.post_repo.count_shares_in(conn, &post.id).await?;
        let post_tally = ReactionTally::from_rows(
            self.reaction_repo
                .tally_in(conn, &post.id, TargetKind::Post)
                .await?,
        );

        let mut reply_counts: HashMap<String, i64> = HashMap::new();
        for parent_id in comments.iter().filter_map(|c| c.parent_id.as_ref()) {
            *reply_counts.entry(parent_id.clone()).or_default() += 1;
        }

        let mut comment_tallies = HashMap::with_capacity(comments.len());
        for comment in comments {
            let rows = self
                .reaction_repo
                .tally_in(conn, &comment.id, TargetKind::Comment)
                .await?;
            comment_tallies.insert(comment.id.clone(), ReactionTally::from_rows(rows));
        }

        Ok(Recount {
            comment_count: i64::try_from(comment_count).unwrap_or(i64::MAX),
            share_count: i64::try_from(share_count).unwrap_or(i64::MAX),
            post_tally,
            reply_counts,
            comment_tallies,
        })
    }
}

fn build_report(post: &post::Model, comments: &[comment::Model], recount: &Recount) -> AuditReport {
    let mut drifts = Vec::new();

    check(&mut drifts, &post.id, "comment_count", post.comment_count, recount.comment_count);
    check(&mut drifts, &post.id, "share_count", post.share_count, recount.share_count);
    check_tally(
        &mut drifts,
        &post.id,
        post.reaction_count,
        &ReactionTally::from_json(&post.reactions),
        &recount.post_tally,
    );

    for comment in comments {
        let replies = recount.reply_counts.get(&comment.id).copied().unwrap_or(0);
        check(&mut drifts, &comment.id, "reply_count", comment.reply_count, replies);

        let empty = ReactionTally::default();
        let actual = recount.comment_tallies.get(&comment.id).unwrap_or(&empty);
        check_tally(
            &mut drifts,
            &comment.id,
            comment.reaction_count,
            &ReactionTally::from_json(&comment.reactions),
            actual,
        );
    }

    AuditReport {
        post_id: post.id.clone(),
        drifts,
        checked_comments: comments.len(),
    }
}

fn check(drifts: &mut Vec<CounterDrift>, target_id: &str, field: &str, cached: i64, actual: i64) {
    if cached != actual {
        drifts.push(CounterDrift {
            target_id: target_id.to_string(),
            field: field.to_string(),
            cached,
            actual,
        });
    }
}

fn check_tally(
    drifts: &mut Vec<CounterDrift>,
    target_id: &str,
    cached_total: i64,
    cached: &ReactionTally,
    actual: &ReactionTally,
) {
    check(drifts, target_id, "reaction_count", cached_total, actual.total());

    let kinds: BTreeSet<_> = cached.iter().chain(actual.iter()).map(|(k, _)| k).collect();
    for kind in kinds {
        check(
            drifts,
            target_id,
            &format!("reactions.{kind}"),
            cached.get(kind),
            actual.get(kind),
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::test_support::{comment_fixture, post_fixture};
    use bazaar_db::entities::ReactionKind;
    use serde_json::json;

    fn recount(comment_count: i64, replies: &[(&str, i64)]) -> Recount {
        Recount {
            comment_count,
            share_count: 0,
            post_tally: ReactionTally::default(),
            reply_counts: replies.iter().map(|(id, n)| ((*id).to_string(), *n)).collect(),
            comment_tallies: HashMap::new(),
        }
    }

    #[test]
    fn test_consistent_post_has_no_drift() {
        let mut post = post_fixture("p1", "alice");
        post.comment_count = 1;
        let mut top = comment_fixture("c1", "p1", None);
        top.reply_count = 1;
        let reply = comment_fixture("c2", "p1", Some("c1"));

        let report = build_report(&post, &[top, reply], &recount(1, &[("c1", 1)]));
        assert!(report.is_consistent());
        assert_eq!(report.checked_comments, 2);
    }

    #[test]
    fn test_reports_counter_and_tally_drift() {
        let mut post = post_fixture("p1", "alice");
        post.comment_count = 3;
        post.reaction_count = 2;
        post.reactions = json!({"like": 2});

        let mut actual = recount(1, &[]);
        actual.post_tally = ReactionTally::from_rows([(ReactionKind::Like, 1), (ReactionKind::Wow, 1)]);

        let report = build_report(&post, &[], &actual);
        let fields: Vec<&str> = report.drifts.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["comment_count", "reactions.like", "reactions.wow"]);
        assert_eq!(report.drifts[0].cached, 3);
        assert_eq!(report.drifts[0].actual, 1);
    }

    #[test]
    fn test_reply_count_drift_names_the_comment() {
        let post = post_fixture("p1", "alice");
        let mut top = comment_fixture("c1", "p1", None);
        top.reply_count = 4;

        let report = build_report(&post, &[top], &recount(0, &[("c1", 2)]));
        assert_eq!(
            report.drifts,
            vec![CounterDrift {
                target_id: "c1".to_string(),
                field: "reply_count".to_string(),
                cached: 4,
                actual: 2,
            }]
        );
    }
}
