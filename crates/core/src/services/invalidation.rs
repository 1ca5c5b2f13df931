//! Cache invalidation after writes.

use bazaar_common::{CacheKey, ReadThroughCache};

/// Drops cached feed pages a write may have changed.
#[derive(Clone)]
pub struct FeedInvalidator {
    cache: ReadThroughCache,
}

impl FeedInvalidator {
    /// Invalidate entries of `cache`.
    #[must_use]
    pub const fn new(cache: ReadThroughCache) -> Self {
        Self { cache }
    }

    /// A post row, its counters or its comments changed.
    pub async fn post_changed(&self, post_id: &str) {
        self.cache.invalidate_scope(CacheKey::TIMELINE).await;
        self.cache.invalidate_scope(CacheKey::TRENDING).await;
        self.cache
            .invalidate_scope(&CacheKey::thread_scope(post_id))
            .await;
    }

    /// Only the thread of `post_id` changed (comment reactions, moderation).
    pub async fn thread_changed(&self, post_id: &str) {
        self.cache
            .invalidate_scope(&CacheKey::thread_scope(post_id))
            .await;
    }

    /// Follow edges changed, so followers-only visibility did too.
    pub async fn follow_graph_changed(&self) {
        self.cache.invalidate_scope(CacheKey::TIMELINE).await;
    }
}
