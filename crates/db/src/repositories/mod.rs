//! Repositories.
//!
//! Read paths go through the repository's own connection. Anything that has
//! to commit together with other writes takes the connection explicitly,
//! which is an open transaction in practice.

pub mod comment;
pub mod follow;
pub mod post;
pub mod reaction;

pub use comment::{CommentFilters, CommentRepository, CommentSort};
pub use follow::FollowRepository;
pub use post::{PostRepository, TimelineFilters, TimelineQuery, TimelineSort};
pub use reaction::ReactionRepository;

use bazaar_common::AppError;
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{DbBackend, DbErr, SqlErr};

/// Classify a database error.
///
/// Unique violations become [`AppError::Conflict`], foreign-key violations
/// [`AppError::NotFound`] (the referenced row is gone) and connection-level
/// failures the retryable [`AppError::DatabaseUnavailable`].
#[must_use]
pub fn db_err(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => return AppError::Conflict(msg),
        Some(SqlErr::ForeignKeyConstraintViolation(msg)) => return AppError::NotFound(msg),
        _ => {}
    }

    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => {
            AppError::DatabaseUnavailable(err.to_string())
        }
        other => AppError::Database(other.to_string()),
    }
}

/// `column - 1`, never below zero.
pub(crate) fn decrement_clamped(backend: DbBackend, column: &str) -> SimpleExpr {
    match backend {
        DbBackend::Sqlite => Expr::cust(format!("MAX({column} - 1, 0)")),
        _ => Expr::cust(format!("GREATEST({column} - 1, 0)")),
    }
}

/// Escape `LIKE` wildcards in user input.
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
