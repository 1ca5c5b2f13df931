//! ID generation utilities.

use ulid::Ulid;

/// ID generator for posts, comments, reactions and follow edges.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new lowercase ULID.
    ///
    /// ULIDs sort by creation time, so `id DESC` is a stable last tie-breaker
    /// for feed ordering.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }
}
