//! Error taxonomy shared by every core operation.
//!
//! Each [`CoreError`] variant maps to a stable [`ErrorKind`] with a
//! machine-readable code and an HTTP status, so clients branch on the
//! kind rather than on message text.

use serde::{Deserialize, Serialize};

use crate::store::StoreError;
use crate::types::InvalidVoteValue;

/// Stable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Referenced entity absent.
    NotFound,
    /// Malformed or out-of-range input.
    ValidationError,
    /// Unique constraint or concurrent-update violation.
    Conflict,
    /// Caller lacks role or ownership.
    AuthorizationError,
    /// Delete blocked by live dependents.
    DependencyExists,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Conflict => "CONFLICT",
            Self::AuthorizationError => "AUTHORIZATION_ERROR",
            Self::DependencyExists => "DEPENDENCY_EXISTS",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// HTTP status surfaced for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::ValidationError => 400,
            Self::Conflict => 409,
            Self::AuthorizationError => 403,
            Self::DependencyExists => 412,
            Self::Unknown => 500,
        }
    }
}

/// Error returned by core operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Referenced entity absent.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. `"user"`.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },
    /// Malformed or out-of-range input.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Unique constraint or concurrent-update violation.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Caller lacks role or ownership.
    #[error("not authorized: {0}")]
    Authorization(String),
    /// Delete blocked by live dependents.
    #[error("dependency exists: {0}")]
    DependencyExists(String),
    /// Opaque failure.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CoreError {
    /// Not-found error for an entity kind and id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Authorization(_) => ErrorKind::AuthorizationError,
            Self::DependencyExists(_) => ErrorKind::DependencyExists,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::DependencyExists(msg) => Self::DependencyExists(msg),
            StoreError::Backend(msg) => Self::Unknown(msg),
        }
    }
}

impl From<InvalidVoteValue> for CoreError {
    fn from(err: InvalidVoteValue) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_have_distinct_codes() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::ValidationError,
            ErrorKind::Conflict,
            ErrorKind::AuthorizationError,
            ErrorKind::DependencyExists,
            ErrorKind::Unknown,
        ];
        let codes: std::collections::BTreeSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_store_errors_keep_their_kind() {
        let err: CoreError = StoreError::Conflict("duplicate vote".into()).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err: CoreError = StoreError::not_found("answer", 9).into();
        assert_eq!(err.kind().http_status(), 404);
        let err: CoreError = StoreError::Backend("pool closed".into()).into();
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_invalid_vote_is_validation() {
        let err: CoreError = InvalidVoteValue(3).into();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(err.kind().code(), "VALIDATION_ERROR");
    }
}
