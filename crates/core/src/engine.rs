//! Service wiring.

use std::sync::Arc;

use bazaar_common::{AppResult, FeedConfig, ReadThroughCache};
use bazaar_db::entities::{ReactionKind, TargetKind, comment, follow, post};
use bazaar_db::repositories::{
    CommentFilters, CommentRepository, CommentSort, FollowRepository, PostRepository,
    ReactionRepository, TimelineFilters, TimelineSort,
};
use sea_orm::DatabaseConnection;
use tracing::info;

use crate::pagination::{Page, PageRequest};
use crate::principal::Principal;
use crate::services::{
    AuditService, CommentService, CountMaintainer, CreateCommentInput, CreatePostInput,
    FeedInvalidator, FollowOptions, FollowingService, PostService, ReactOutcome, ReactionService,
    ThreadComment, ThreadService, TimelineService, TrendingService, UnreactOutcome,
};

/// All services over one connection pool and one cache.
///
/// Cloning is cheap; every service holds `Arc`s.
#[derive(Clone)]
pub struct FeedEngine {
    /// Post writes and reads.
    pub post_service: PostService,
    /// Comment writes.
    pub comment_service: CommentService,
    /// Reactions on posts and comments.
    pub reaction_service: ReactionService,
    /// Follow graph.
    pub following_service: FollowingService,
    /// Timelines.
    pub timeline_service: TimelineService,
    /// Trending ranking.
    pub trending_service: TrendingService,
    /// Threaded comments.
    pub thread_service: ThreadService,
    /// Counter audit and repair.
    pub audit_service: AuditService,
}

impl FeedEngine {
    /// Wire every service over `db`.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, config: FeedConfig, cache: ReadThroughCache) -> Self {
        let post_repo = PostRepository::new(Arc::clone(&db));
        let comment_repo = CommentRepository::new(Arc::clone(&db));
        let reaction_repo = ReactionRepository::new(Arc::clone(&db));
        let follow_repo = FollowRepository::new(Arc::clone(&db));

        let counters = CountMaintainer::new(
            post_repo.clone(),
            comment_repo.clone(),
            reaction_repo.clone(),
            config.engagement,
        );
        let invalidator = FeedInvalidator::new(cache.clone());

        let post_service = PostService::new(
            Arc::clone(&db),
            post_repo.clone(),
            comment_repo.clone(),
            reaction_repo.clone(),
            follow_repo.clone(),
            counters.clone(),
            invalidator.clone(),
        );
        let comment_service = CommentService::new(
            Arc::clone(&db),
            comment_repo.clone(),
            post_repo.clone(),
            reaction_repo.clone(),
            follow_repo.clone(),
            counters.clone(),
            invalidator.clone(),
        );
        let reaction_service = ReactionService::new(
            Arc::clone(&db),
            reaction_repo.clone(),
            post_repo.clone(),
            comment_repo.clone(),
            follow_repo.clone(),
            counters.clone(),
            invalidator.clone(),
            config.max_page_size,
        );
        let following_service = FollowingService::new(
            Arc::clone(&db),
            follow_repo.clone(),
            invalidator.clone(),
            config.max_page_size,
        );
        let timeline_service =
            TimelineService::new(post_repo.clone(), cache.clone(), config.clone());
        let trending_service =
            TrendingService::new(post_repo.clone(), cache.clone(), config.clone());
        let thread_service = ThreadService::new(
            Arc::clone(&db),
            comment_repo.clone(),
            post_repo.clone(),
            reaction_repo.clone(),
            follow_repo,
            cache,
            config,
        );
        let audit_service = AuditService::new(
            db,
            post_repo,
            comment_repo,
            reaction_repo,
            counters,
            invalidator,
        );

        info!("Feed engine initialized");

        Self {
            post_service,
            comment_service,
            reaction_service,
            following_service,
            timeline_service,
            trending_service,
            thread_service,
            audit_service,
        }
    }

    /// See [`PostService::create`].
    pub async fn create_post(
        &self,
        principal: &Principal,
        input: CreatePostInput,
    ) -> AppResult<post::Model> {
        self.post_service.create(principal, input).await
    }

    /// See [`CommentService::create`].
    pub async fn create_comment(
        &self,
        principal: &Principal,
        input: CreateCommentInput,
    ) -> AppResult<comment::Model> {
        self.comment_service.create(principal, input).await
    }

    /// See [`ReactionService::react`].
    pub async fn react(
        &self,
        principal: &Principal,
        target_id: &str,
        target_kind: TargetKind,
        kind: ReactionKind,
    ) -> AppResult<ReactOutcome> {
        self.reaction_service
            .react(principal, target_id, target_kind, kind)
            .await
    }

    /// See [`ReactionService::unreact`].
    pub async fn unreact(
        &self,
        principal: &Principal,
        target_id: &str,
        target_kind: TargetKind,
    ) -> AppResult<UnreactOutcome> {
        self.reaction_service
            .unreact(principal, target_id, target_kind)
            .await
    }

    /// See [`TimelineService::get_timeline`].
    pub async fn get_timeline(
        &self,
        viewer: &Principal,
        filters: TimelineFilters,
        sort: TimelineSort,
        page: PageRequest,
    ) -> AppResult<Page<post::Model>> {
        self.timeline_service
            .get_timeline(viewer, filters, sort, page)
            .await
    }

    /// See [`TrendingService::get_trending`].
    pub async fn get_trending(
        &self,
        window_hours: Option<i64>,
        page: PageRequest,
    ) -> AppResult<Page<post::Model>> {
        self.trending_service.get_trending(window_hours, page).await
    }

    /// See [`ThreadService::get_thread`].
    pub async fn get_thread(
        &self,
        viewer: &Principal,
        post_id: &str,
        filters: CommentFilters,
        sort: CommentSort,
        page: PageRequest,
        reply_limit: Option<u64>,
    ) -> AppResult<Page<ThreadComment>> {
        self.thread_service
            .get_thread(viewer, post_id, filters, sort, page, reply_limit)
            .await
    }

    /// See [`FollowingService::follow`].
    pub async fn follow(
        &self,
        principal: &Principal,
        following_id: &str,
        options: FollowOptions,
    ) -> AppResult<follow::Model> {
        self.following_service
            .follow(principal, following_id, options)
            .await
    }

    /// See [`FollowingService::unfollow`].
    pub async fn unfollow(&self, principal: &Principal, following_id: &str) -> AppResult<()> {
        self.following_service.unfollow(principal, following_id).await
    }
}
