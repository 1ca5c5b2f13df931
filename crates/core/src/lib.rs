//! Feed and engagement logic for bazaar.
//!
//! Services own the write paths (posts, comments, reactions, follow edges)
//! together with the counter maintenance they trigger, and the read paths
//! (timeline, trending, threads). [`FeedEngine`] wires them over one
//! connection pool.

pub mod engine;
pub mod pagination;
pub mod principal;
pub mod services;

pub use engine::FeedEngine;
pub use pagination::{Page, PageRequest};
pub use principal::Principal;
pub use services::*;
