//! Reaction service.

use std::sync::Arc;

use bazaar_common::{AppError, AppResult, IdGenerator};
use bazaar_db::db_err;
use bazaar_db::entities::{ReactionKind, TargetKind, reaction};
use bazaar_db::repositories::{
    CommentRepository, FollowRepository, PostRepository, ReactionRepository,
};
use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, Set, TransactionTrait};
use serde::Serialize;
use tracing::{debug, info};

use crate::pagination::{Page, PageRequest};
use crate::principal::Principal;
use crate::services::counters::{CountMaintainer, ReactionTally};
use crate::services::invalidation::FeedInvalidator;
use crate::services::visibility::{comment_visible, ensure_visible};

/// Follow-edge engagement added on a first reaction to a followed author's content.
pub const REACTION_ENGAGEMENT_NUDGE: f64 = 1.0;

/// Result of [`ReactionService::react`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactOutcome {
    /// The user's reaction as stored now.
    pub reaction: reaction::Model,
    /// Kind of the reaction this one replaced, if any.
    pub previous: Option<ReactionKind>,
    /// The target's tally after the change.
    pub tally: ReactionTally,
}

impl ReactOutcome {
    /// No earlier reaction by this user existed.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.previous.is_none()
    }

    /// An existing reaction of another kind was swapped out.
    #[must_use]
    pub fn is_replaced(&self) -> bool {
        self.previous.is_some_and(|p| p != self.reaction.kind)
    }
}

/// Result of [`ReactionService::unreact`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UnreactOutcome {
    /// The reaction was deleted.
    Removed {
        /// Kind of the removed reaction.
        kind: ReactionKind,
        /// The target's tally after the removal.
        tally: ReactionTally,
    },
    /// There was nothing to remove.
    NoOp,
}

/// Visibility check applied while resolving a target.
#[derive(Clone, Copy)]
enum TargetAccess<'a> {
    Viewer(Option<&'a str>),
    Unchecked,
}

/// What a reaction target resolved to.
struct ResolvedTarget {
    author_id: String,
    post_id: String,
}

/// Reaction service for business logic.
#[derive(Clone)]
pub struct ReactionService {
    db: Arc<DatabaseConnection>,
    reaction_repo: ReactionRepository,
    post_repo: PostRepository,
    comment_repo: CommentRepository,
    follow_repo: FollowRepository,
    counters: CountMaintainer,
    invalidator: FeedInvalidator,
    max_page_size: u64,
    id_gen: IdGenerator,
}

impl ReactionService {
    /// Create a new reaction service.
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        reaction_repo: ReactionRepository,
        post_repo: PostRepository,
        comment_repo: CommentRepository,
        follow_repo: FollowRepository,
        counters: CountMaintainer,
        invalidator: FeedInvalidator,
        max_page_size: u64,
    ) -> Self {
        Self {
            db,
            reaction_repo,
            post_repo,
            comment_repo,
            follow_repo,
            counters,
            invalidator,
            max_page_size,
            id_gen: IdGenerator::new(),
        }
    }

    /// React to a post or comment, replacing the user's previous reaction.
    pub async fn react(
        &self,
        principal: &Principal,
        target_id: &str,
        target_kind: TargetKind,
        kind: ReactionKind,
    ) -> AppResult<ReactOutcome> {
        let user_id = principal.require_user()?;

        let txn = self.db.begin().await.map_err(db_err)?;
        let target = self
            .resolve_target(&txn, TargetAccess::Viewer(Some(user_id)), target_id, target_kind, true)
            .await?;

        let previous = self
            .reaction_repo
            .find_by_user_and_target_in(&txn, user_id, target_id, target_kind)
            .await?
            .map(|r| r.kind);

        let now = Utc::now().fixed_offset();
        self.reaction_repo
            .upsert(
                &txn,
                reaction::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    user_id: Set(user_id.to_string()),
                    target_id: Set(target_id.to_string()),
                    target_kind: Set(target_kind),
                    kind: Set(kind),
                    created_at: Set(now),
                    updated_at: Set(now),
                },
            )
            .await?;

        let stored = self
            .reaction_repo
            .find_by_user_and_target_in(&txn, user_id, target_id, target_kind)
            .await?
            .ok_or_else(|| AppError::Internal("reaction vanished after upsert".to_string()))?;
        let tally = self
            .counters
            .on_reaction_changed(&txn, target_id, target_kind)
            .await?;

        if previous.is_none() && target.author_id != user_id {
            self.follow_repo
                .add_engagement(&txn, user_id, &target.author_id, REACTION_ENGAGEMENT_NUDGE)
                .await?;
        }

        txn.commit().await.map_err(db_err)?;
        self.invalidate(&target, target_kind).await;

        info!(
            user_id = %user_id,
            target_id = %target_id,
            ?target_kind,
            kind = %kind,
            previous = ?previous,
            "Reaction stored"
        );

        Ok(ReactOutcome {
            reaction: stored,
            previous,
            tally,
        })
    }

    /// Remove the user's reaction from a target, if there is one.
    pub async fn unreact(
        &self,
        principal: &Principal,
        target_id: &str,
        target_kind: TargetKind,
    ) -> AppResult<UnreactOutcome> {
        let user_id = principal.require_user()?;

        let txn = self.db.begin().await.map_err(db_err)?;

        let Some(existing) = self
            .reaction_repo
            .find_by_user_and_target_in(&txn, user_id, target_id, target_kind)
            .await?
        else {
            debug!(user_id = %user_id, target_id = %target_id, "Nothing to unreact");
            return Ok(UnreactOutcome::NoOp);
        };

        let target = self
            .resolve_target(&txn, TargetAccess::Unchecked, target_id, target_kind, true)
            .await?;

        let removed = self
            .reaction_repo
            .delete_by_user_and_target(&txn, user_id, target_id, target_kind)
            .await?;
        if removed == 0 {
            return Ok(UnreactOutcome::NoOp);
        }

        let tally = self
            .counters
            .on_reaction_changed(&txn, target_id, target_kind)
            .await?;

        txn.commit().await.map_err(db_err)?;
        self.invalidate(&target, target_kind).await;

        info!(user_id = %user_id, target_id = %target_id, ?target_kind, "Reaction removed");
        Ok(UnreactOutcome::Removed {
            kind: existing.kind,
            tally,
        })
    }

    /// Reactions on a target the viewer may see, newest first.
    pub async fn list_reactions(
        &self,
        viewer: &Principal,
        target_id: &str,
        target_kind: TargetKind,
        kind: Option<ReactionKind>,
        page: PageRequest,
    ) -> AppResult<Page<reaction::Model>> {
        let (offset, limit) = page.bounds(self.max_page_size)?;
        self.resolve_target(
            self.db.as_ref(),
            TargetAccess::Viewer(viewer.user_id()),
            target_id,
            target_kind,
            false,
        )
        .await?;

        let items = self
            .reaction_repo
            .find_by_target(target_id, target_kind, kind, offset, limit)
            .await?;
        let total = if page.wants_total() {
            Some(
                self.reaction_repo
                    .count_by_target(target_id, target_kind, kind)
                    .await?,
            )
        } else {
            None
        };

        Ok(Page::new(items, &page, total))
    }

    /// A user's reaction on a target.
    pub async fn get_reaction(
        &self,
        user_id: &str,
        target_id: &str,
        target_kind: TargetKind,
    ) -> AppResult<Option<reaction::Model>> {
        self.reaction_repo
            .find_by_user_and_target(user_id, target_id, target_kind)
            .await
    }

    /// Find the target and its post, checking the viewer may see both.
    ///
    /// With `lock`, the owning post row and then the target row stay locked
    /// until the transaction ends. Post and comment deletes take the post lock
    /// first too, so a reaction cannot land on a comment that is being
    /// removed.
    async fn resolve_target<C: ConnectionTrait>(
        &self,
        conn: &C,
        access: TargetAccess<'_>,
        target_id: &str,
        target_kind: TargetKind,
        lock: bool,
    ) -> AppResult<ResolvedTarget> {
        match target_kind {
            TargetKind::Post => {
                let post = if lock {
                    self.post_repo.lock_in(conn, target_id).await?
                } else {
                    self.post_repo.find_in(conn, target_id).await?
                }
                .ok_or_else(|| AppError::PostNotFound(target_id.to_string()))?;

                let post = match access {
                    TargetAccess::Viewer(viewer_id) => {
                        ensure_visible(conn, &self.follow_repo, viewer_id, post).await?
                    }
                    TargetAccess::Unchecked => post,
                };
                Ok(ResolvedTarget {
                    author_id: post.author_id,
                    post_id: post.id,
                })
            }
            TargetKind::Comment => {
                let not_found = || AppError::CommentNotFound(target_id.to_string());
                let mut comment = self
                    .comment_repo
                    .find_in(conn, target_id)
                    .await?
                    .ok_or_else(not_found)?;

                let post = if lock {
                    let post = self.post_repo.lock_in(conn, &comment.post_id).await?;
                    // Re-read under the post lock; a concurrent delete may have won.
                    comment = self
                        .comment_repo
                        .lock_in(conn, target_id)
                        .await?
                        .ok_or_else(not_found)?;
                    post
                } else {
                    self.post_repo.find_in(conn, &comment.post_id).await?
                }
                .ok_or_else(|| AppError::PostNotFound(comment.post_id.clone()))?;

                if let TargetAccess::Viewer(viewer_id) = access {
                    if !comment_visible(viewer_id, &comment) {
                        return Err(not_found());
                    }
                    ensure_visible(conn, &self.follow_repo, viewer_id, post).await?;
                }
                Ok(ResolvedTarget {
                    author_id: comment.author_id,
                    post_id: comment.post_id,
                })
            }
        }
    }

    async fn invalidate(&self, target: &ResolvedTarget, target_kind: TargetKind) {
        match target_kind {
            TargetKind::Post => self.invalidator.post_changed(&target.post_id).await,
            TargetKind::Comment => self.invalidator.thread_changed(&target.post_id).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::test_support::{comment_fixture, post_fixture, reaction_fixture};
    use bazaar_common::{EngagementWeights, ReadThroughCache};
    use bazaar_db::entities::{Visibility, comment, post};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn service(db: DatabaseConnection) -> ReactionService {
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
        ReactionService::new(
            db.clone(),
            reaction_repo,
            post_repo,
            comment_repo,
            FollowRepository::new(db),
            counters,
            FeedInvalidator::new(ReadThroughCache::disabled()),
            100,
        )
    }

    #[tokio::test]
    async fn test_anonymous_cannot_react() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let err = svc
            .react(&Principal::Anonymous, "p1", TargetKind::Post, ReactionKind::Like)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn test_react_to_missing_post_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<post::Model>::new()])
            .into_connection();
        let err = service(db)
            .react(
                &Principal::authenticated("u1"),
                "gone",
                TargetKind::Post,
                ReactionKind::Like,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PostNotFound(_)));
    }

    #[tokio::test]
    async fn test_react_to_invisible_post_is_not_found() {
        let mut post = post_fixture("p1", "alice");
        post.visibility = Visibility::Private;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[post]])
            .into_connection();
        let err = service(db)
            .react(
                &Principal::authenticated("bob"),
                "p1",
                TargetKind::Post,
                ReactionKind::Like,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PostNotFound(_)));
    }

    #[tokio::test]
    async fn test_react_to_comment_removed_before_lock_is_not_found() {
        // The comment is read, but is gone once the post lock is granted.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[comment_fixture("c2", "p1", Some("c1"))]])
            .append_query_results([[post_fixture("p1", "alice")]])
            .append_query_results([Vec::<comment::Model>::new()])
            .into_connection();
        let err = service(db)
            .react(
                &Principal::authenticated("bob"),
                "c2",
                TargetKind::Comment,
                ReactionKind::Like,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CommentNotFound(id) if id == "c2"));
    }

    #[tokio::test]
    async fn test_react_to_comment_on_invisible_post_is_not_found() {
        let mut post = post_fixture("p1", "alice");
        post.visibility = Visibility::Private;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[comment_fixture("c1", "p1", None)]])
            .append_query_results([[post]])
            .append_query_results([[comment_fixture("c1", "p1", None)]])
            .into_connection();
        let err = service(db)
            .react(
                &Principal::authenticated("bob"),
                "c1",
                TargetKind::Comment,
                ReactionKind::Like,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PostNotFound(_)));
    }

    #[tokio::test]
    async fn test_unreact_without_reaction_is_noop() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<reaction::Model>::new()])
            .into_connection();
        let outcome = service(db)
            .unreact(&Principal::authenticated("u1"), "p1", TargetKind::Post)
            .await
            .unwrap();
        assert_eq!(outcome, UnreactOutcome::NoOp);
    }

    #[tokio::test]
    async fn test_list_rejects_oversized_page() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let err = svc
            .list_reactions(
                &Principal::Anonymous,
                "p1",
                TargetKind::Post,
                None,
                PageRequest::new(1, 500),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_outcome_flags() {
        let outcome = ReactOutcome {
            reaction: reaction_fixture("u1", "p1", ReactionKind::Love),
            previous: Some(ReactionKind::Like),
            tally: ReactionTally::from_rows([(ReactionKind::Love, 1)]),
        };
        assert!(!outcome.is_new());
        assert!(outcome.is_replaced());

        let same = ReactOutcome {
            previous: Some(ReactionKind::Love),
            ..outcome
        };
        assert!(!same.is_replaced());
    }
}
