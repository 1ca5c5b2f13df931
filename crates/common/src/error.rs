//! Error types for bazaar.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Coarse error classes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input rejected before any write.
    Validation,
    /// Rejected by a uniqueness or structural rule of the store.
    Conflict,
    /// The target does not exist (or no longer exists).
    NotFound,
    /// The principal may not perform the operation.
    Authorization,
    /// Storage or cache layer failure.
    Store,
    /// Anything else on the server side.
    Internal,
}

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    /// Generic missing resource.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No such post, or the caller may not see it.
    #[error("Post not found: {0}")]
    PostNotFound(String),

    /// No such comment, or the caller may not see it.
    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    /// The operation needs an authenticated caller.
    #[error("Unauthorized")]
    Unauthorized,

    /// Authenticated, but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed or out-of-range parameters.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Uniqueness or state conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    // === Server Errors ===
    /// Query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Connection-level store failure (pool exhausted, connection dropped).
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),

    /// Cache backend failure.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bug or unexpected state.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the error class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) | Self::PostNotFound(_) | Self::CommentNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Unauthorized | Self::Forbidden(_) => ErrorKind::Authorization,
            Self::Database(_) | Self::DatabaseUnavailable(_) | Self::Cache(_) => ErrorKind::Store,
            Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::PostNotFound(_) => "POST_NOT_FOUND",
            Self::CommentNotFound(_) => "COMMENT_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::DatabaseUnavailable(_) => "DATABASE_UNAVAILABLE",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether the caller made the mistake (retrying is pointless).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation
                | ErrorKind::Conflict
                | ErrorKind::NotFound
                | ErrorKind::Authorization
        )
    }

    /// Returns whether retrying the same call may succeed.
    ///
    /// Only transient store failures qualify. Retrying is the caller's job.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseUnavailable(_))
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON: {err}"))
    }
}
