//! Trending ranking.

use bazaar_common::{AppError, AppResult, CacheKey, FeedConfig, ReadThroughCache};
use bazaar_db::entities::post;
use bazaar_db::repositories::PostRepository;
use chrono::{Duration, Utc};
use tracing::debug;

use crate::pagination::{Page, PageRequest};

/// Trending service. Public, active posts of a recent window by engagement
/// score; the follow graph plays no part.
#[derive(Clone)]
pub struct TrendingService {
    post_repo: PostRepository,
    cache: ReadThroughCache,
    config: FeedConfig,
}

impl TrendingService {
    /// Create a new trending service.
    #[must_use]
    pub const fn new(post_repo: PostRepository, cache: ReadThroughCache, config: FeedConfig) -> Self {
        Self {
            post_repo,
            cache,
            config,
        }
    }

    /// Posts created in the last `window_hours` (default from config), best first.
    pub async fn get_trending(
        &self,
        window_hours: Option<i64>,
        page: PageRequest,
    ) -> AppResult<Page<post::Model>> {
        let (offset, limit) = page.bounds(self.config.max_page_size)?;
        let window = window_hours.unwrap_or(self.config.trending_window_hours);
        if window < 1 || window > self.config.max_trending_window_hours {
            return Err(AppError::BadRequest(format!(
                "window_hours must be between 1 and {}",
                self.config.max_trending_window_hours
            )));
        }

        let key = CacheKey::new(
            CacheKey::TRENDING,
            format!(
                "w{window}:p{}:l{}:t{}",
                page.page, page.limit, page.include_total
            ),
        );
        if let Some(hit) = self.cache.get_json::<Page<post::Model>>(&key).await {
            return Ok(hit);
        }

        let since = (Utc::now() - Duration::hours(window)).fixed_offset();
        let items = self.post_repo.find_trending(since, offset, limit).await?;
        let total = if page.wants_total() {
            Some(self.post_repo.count_trending(since).await?)
        } else {
            None
        };

        debug!(window_hours = window, returned = items.len(), "Trending page ranked");

        let result = Page::new(items, &page, total);
        self.cache.put_json(&key, &result).await;
        Ok(result)
    }
}
