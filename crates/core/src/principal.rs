//! Calling principal.

use bazaar_common::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Who is calling. Identity is resolved upstream; the engine only sees the id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Principal {
    /// No identity.
    #[default]
    Anonymous,
    /// A known user.
    Authenticated {
        /// User id.
        id: String,
    },
}

impl Principal {
    /// An authenticated caller with `id`.
    #[must_use]
    pub fn authenticated(id: impl Into<String>) -> Self {
        Self::Authenticated { id: id.into() }
    }

    /// The user id, if authenticated.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { id } => Some(id),
        }
    }

    /// Whether a user id is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// The user id, or `Unauthorized` for anonymous callers.
    pub fn require_user(&self) -> AppResult<&str> {
        self.user_id().ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_cannot_write() {
        let anon = Principal::Anonymous;
        assert!(!anon.is_authenticated());
        assert!(anon.user_id().is_none());
        assert!(matches!(anon.require_user(), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_authenticated_exposes_id() {
        let user = Principal::authenticated("u1");
        assert!(user.is_authenticated());
        assert_eq!(user.require_user().unwrap(), "u1");
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(Principal::authenticated("u1")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "authenticated", "id": "u1"}));
        let back: Principal = serde_json::from_value(serde_json::json!({"type": "anonymous"})).unwrap();
        assert_eq!(back, Principal::Anonymous);
    }
}
