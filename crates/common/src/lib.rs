//! Common utilities and shared types for bazaar.
//!
//! This crate provides foundational components used across all bazaar crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Cache**: Optional read-through cache for feed reads via [`ReadThroughCache`]
//!
//! # Example
//!
//! ```no_run
//! use bazaar_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Generated ID: {} (page cap {})", id, config.feed.max_page_size);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod id;

pub use cache::{
    CacheError, CacheKey, FeedCache, MemoryFeedCache, NoOpFeedCache, ReadThroughCache,
    RedisFeedCache,
};
pub use config::{CacheBackend, CacheConfig, Config, EngagementWeights, FeedConfig, RecencyBoost};
pub use error::{AppError, AppResult, ErrorKind};
pub use id::IdGenerator;
