//! Crate-wide error taxonomy.

use thiserror::Error;

/// The error kinds the turn pipeline and its collaborators can surface.
///
/// Each variant corresponds to one row of the error taxonomy: callers match
/// on `kind()` rather than on the `Display` text, which is free to change.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rule violation: {0}")]
    RuleViolation(String),

    #[error("tool failed: {0}")]
    ToolFailed(String),

    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by callers that need to branch on error kind
/// without depending on the `Display` string (e.g. HTTP status mapping,
/// which lives outside this crate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    Validation,
    RuleViolation,
    ToolFailed,
    LlmUnavailable,
    RateLimit,
    Conflict,
    Migration,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Validation(_) => ErrorKind::Validation,
            Error::RuleViolation(_) => ErrorKind::RuleViolation,
            Error::ToolFailed(_) => ErrorKind::ToolFailed,
            Error::LlmUnavailable(_) => ErrorKind::LlmUnavailable,
            Error::RateLimit(_) => ErrorKind::RateLimit,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Migration(_) => ErrorKind::Migration,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Error::NotFound(entity.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Error::not_found("rule").kind(), ErrorKind::NotFound);
        assert_eq!(Error::invalid("empty message").kind(), ErrorKind::InvalidRequest);
    }
}
