//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration. Only required for the `redis` cache backend.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Read-through cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Feed read limits and scoring.
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (`postgres://` or `sqlite:`).
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Which store backs the read-through cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// No caching; every read hits the store.
    #[default]
    None,
    /// In-process LRU.
    Memory,
    /// Shared Redis instance (requires `[redis]`).
    Redis,
}

/// Read-through cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Which backend serves feed reads.
    pub backend: CacheBackend,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
    /// Entry cap for the memory backend.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::None,
            ttl_secs: 30,
            memory_capacity: 10_000,
        }
    }
}

impl CacheConfig {
    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Limits and scoring parameters for feed reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Largest accepted page size.
    pub max_page_size: u64,
    /// Replies attached per top-level comment when the caller gives none.
    pub default_reply_limit: u64,
    /// Upper bound for a caller-supplied reply limit.
    pub max_reply_limit: u64,
    /// Depth cap for `expand_thread`.
    pub max_thread_depth: u32,
    /// Node cap for `expand_thread`.
    pub max_thread_nodes: usize,
    /// Trending window when the caller gives none.
    pub trending_window_hours: i64,
    /// Upper bound for a caller-supplied trending window.
    pub max_trending_window_hours: i64,
    /// Engagement score weights.
    pub engagement: EngagementWeights,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_page_size: 100,
            default_reply_limit: 3,
            max_reply_limit: 20,
            max_thread_depth: 8,
            max_thread_nodes: 500,
            trending_window_hours: 24,
            max_trending_window_hours: 24 * 7,
            engagement: EngagementWeights::default(),
        }
    }
}

/// Weights of the engagement score.
///
/// `score = (reactions*reaction + comments*comment + shares*share + views*view) * boost`,
/// where `boost` follows [`RecencyBoost`].
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EngagementWeights {
    /// Weight of one reaction.
    pub reaction: f64,
    /// Weight of one comment.
    pub comment: f64,
    /// Weight of one share.
    pub share: f64,
    /// Weight of one view.
    pub view: f64,
    /// Age in hours after which the recency boost is gone.
    pub recency_horizon_hours: f64,
    /// Shape of the recency multiplier.
    pub recency_boost: RecencyBoost,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            reaction: 1.0,
            comment: 2.0,
            share: 5.0,
            view: 0.1,
            recency_horizon_hours: 48.0,
            recency_boost: RecencyBoost::Floor,
        }
    }
}

/// Shape of the recency multiplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecencyBoost {
    /// `max(1, (horizon - age) / horizon)`.
    #[default]
    Floor,
    /// `1 + max(0, (horizon - age) / horizon)`. Fresh posts score up to 2x.
    ///
    /// Stored scores keep the boost they had at their last counter change.
    Additive,
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_redis_prefix() -> String {
    "bazaar".to_string()
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `BAZAAR_ENV`)
    /// 3. Environment variables with `BAZAAR__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("BAZAAR_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("BAZAAR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("BAZAAR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_feed_defaults_apply_when_section_missing() {
        let config = parse(
            r#"
            [database]
            url = "sqlite::memory:"
            "#,
        );

        assert!(config.redis.is_none());
        assert_eq!(config.cache.backend, CacheBackend::None);
        assert_eq!(config.feed.max_page_size, 100);
        assert_eq!(config.feed.default_reply_limit, 3);
        assert_eq!(config.feed.trending_window_hours, 24);
        assert!((config.feed.engagement.share - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_feed_section_keeps_other_defaults() {
        let config = parse(
            r#"
            [database]
            url = "sqlite::memory:"

            [cache]
            backend = "memory"
            ttl_secs = 5

            [feed]
            max_page_size = 50

            [feed.engagement]
            view = 0.5
            "#,
        );

        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.ttl(), Duration::from_secs(5));
        assert_eq!(config.cache.memory_capacity, 10_000);
        assert_eq!(config.feed.max_page_size, 50);
        assert_eq!(config.feed.max_reply_limit, 20);
        assert!((config.feed.engagement.view - 0.5).abs() < f64::EPSILON);
        assert!((config.feed.engagement.comment - 2.0).abs() < f64::EPSILON);
    }
}
