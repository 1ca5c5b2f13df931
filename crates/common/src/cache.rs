//! Read-through cache for feed reads.
//!
//! Timeline, trending and thread pages can be served from a short-lived
//! cache. Entries are grouped by scope (`timeline`, `trending`,
//! `thread:{post_id}`) so a write can drop every page it may have changed
//! without knowing the exact keys.
//!
//! Cache failures never fail a read: [`ReadThroughCache`] logs them and
//! treats them as a miss.
//!
//! # Example
//!
//! ```ignore
//! use bazaar_common::cache::{CacheKey, MemoryFeedCache, ReadThroughCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let cache = ReadThroughCache::new(Arc::new(MemoryFeedCache::new(1024)), Duration::from_secs(30));
//! let key = CacheKey::new(CacheKey::TRENDING, "24h:1:20");
//!
//! if let Some(page) = cache.get_json::<Vec<String>>(&key).await {
//!     return page;
//! }
//! let page = load_from_store().await?;
//! cache.put_json(&key, &page).await;
//! ```

use async_trait::async_trait;
use fred::clients::Client as RedisClient;
use fred::interfaces::{KeysInterface, SetsInterface};
use fred::types::Expiration;
use lru::LruCache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Cache key made of a scope and a discriminator within the scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    scope: String,
    discriminator: String,
}

impl CacheKey {
    /// Scope of general timeline pages.
    pub const TIMELINE: &'static str = "timeline";
    /// Scope of trending pages.
    pub const TRENDING: &'static str = "trending";

    /// Create a key in `scope`.
    pub fn new(scope: impl Into<String>, discriminator: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            discriminator: discriminator.into(),
        }
    }

    /// Scope holding the thread pages of one post.
    #[must_use]
    pub fn thread_scope(post_id: &str) -> String {
        format!("thread:{post_id}")
    }

    /// Scope the key is invalidated with.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Flat key as stored by the backends.
    #[must_use]
    pub fn flatten(&self) -> String {
        format!("{}|{}", self.scope, self.discriminator)
    }
}

/// Cache error type.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// In-process cache state was poisoned by a panicking holder.
    #[error("Cache lock poisoned")]
    Poisoned,
}

impl From<CacheError> for crate::AppError {
    fn from(err: CacheError) -> Self {
        Self::Cache(err.to_string())
    }
}

/// Storage backend of the read-through cache.
#[async_trait]
pub trait FeedCache: Send + Sync {
    /// Fetch a live entry.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Store an entry for `ttl`.
    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Drop one entry.
    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Drop every entry of a scope.
    async fn invalidate_scope(&self, scope: &str) -> Result<(), CacheError>;
}

/// Backend that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpFeedCache;

#[async_trait]
impl FeedCache for NoOpFeedCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &CacheKey, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate(&self, _key: &CacheKey) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate_scope(&self, _scope: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

struct MemoryEntry {
    scope: String,
    value: String,
    expires_at: Instant,
}

/// In-process LRU backend.
pub struct MemoryFeedCache {
    entries: Mutex<LruCache<String, MemoryEntry>>,
}

impl MemoryFeedCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> Result<usize, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.len())
    }

    /// Whether no live entry is held.
    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl FeedCache for MemoryFeedCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let flat = key.flatten();
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;

        let expired = match entries.get(&flat) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(&flat);
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.put(
            key.flatten(),
            MemoryEntry {
                scope: key.scope.clone(),
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.pop(&key.flatten());
        Ok(())
    }

    async fn invalidate_scope(&self, scope: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.scope == scope)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        debug!(scope = %scope, dropped = stale.len(), "Invalidated cache scope");
        Ok(())
    }
}

/// Redis backend.
///
/// Each scope keeps a set of its live keys so the whole scope can be dropped
/// without `SCAN`.
#[derive(Clone)]
pub struct RedisFeedCache {
    redis: Arc<RedisClient>,
    prefix: String,
}

impl RedisFeedCache {
    /// Cache under `{prefix}:feed:` keys on `redis`.
    #[must_use]
    pub fn new(redis: Arc<RedisClient>, prefix: impl Into<String>) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
        }
    }

    fn entry_key(&self, key: &CacheKey) -> String {
        format!("{}:feed:{}", self.prefix, key.flatten())
    }

    fn index_key(&self, scope: &str) -> String {
        format!("{}:feed-idx:{scope}", self.prefix)
    }
}

#[async_trait]
impl FeedCache for RedisFeedCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        self.redis
            .get::<Option<String>, _>(self.entry_key(key))
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))
    }

    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), CacheError> {
        let entry_key = self.entry_key(key);
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);

        self.redis
            .set::<(), _, _>(
                entry_key.clone(),
                value,
                Some(Expiration::EX(ttl_secs)),
                None,
                false,
            )
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))?;

        // Every member expires within `ttl` of the latest add, so the index may too.
        let index_key = self.index_key(key.scope());
        self.redis
            .sadd::<(), _, _>(index_key.clone(), entry_key)
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))?;
        self.redis
            .expire::<(), _>(index_key, ttl_secs, None)
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.redis
            .del::<(), _>(self.entry_key(key))
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))
    }

    async fn invalidate_scope(&self, scope: &str) -> Result<(), CacheError> {
        let index_key = self.index_key(scope);
        let mut keys: Vec<String> = self
            .redis
            .smembers(index_key.clone())
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))?;
        keys.push(index_key);

        self.redis
            .del::<(), _>(keys)
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))
    }
}

/// JSON read-through layer over a [`FeedCache`] backend.
#[derive(Clone)]
pub struct ReadThroughCache {
    backend: Arc<dyn FeedCache>,
    ttl: Duration,
}

impl ReadThroughCache {
    /// Wrap `backend`, storing entries for `ttl`.
    pub fn new(backend: Arc<dyn FeedCache>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// A cache that never hits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoOpFeedCache), Duration::ZERO)
    }

    /// Look up and decode an entry. Errors are logged and count as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %key.flatten(), "Feed cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key.flatten(), error = %e, "Feed cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key = %key.flatten(), "Feed cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key.flatten(), error = %e, "Dropping undecodable feed cache entry");
                self.invalidate(key).await;
                None
            }
        }
    }

    /// Encode and store an entry. Errors are logged.
    pub async fn put_json<T: Serialize + Sync>(&self, key: &CacheKey, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key.flatten(), error = %CacheError::Serialization(e.to_string()), "Feed cache write skipped");
                return;
            }
        };

        if let Err(e) = self.backend.set(key, raw, self.ttl).await {
            warn!(key = %key.flatten(), error = %e, "Feed cache write failed");
        }
    }

    /// Drop one entry. Errors are logged.
    pub async fn invalidate(&self, key: &CacheKey) {
        if let Err(e) = self.backend.invalidate(key).await {
            warn!(key = %key.flatten(), error = %e, "Feed cache invalidation failed");
        }
    }

    /// Drop every entry of `scope`. Errors are logged.
    pub async fn invalidate_scope(&self, scope: &str) {
        if let Err(e) = self.backend.invalidate_scope(scope).await {
            warn!(scope = %scope, error = %e, "Feed cache scope invalidation failed");
        }
    }
}
