//! BlastClaw error taxonomy.
//!
//! Per-item failures inside bulk operations are collected into outcome
//! counts by the caller — these variants describe the failure of a single
//! operation, not of a batch.

use thiserror::Error;

/// All errors produced by BlastClaw crates.
#[derive(Debug, Error)]
pub enum BlastClawError {
    /// A required field is missing or malformed (e.g. empty phone number).
    #[error("validation error: {0}")]
    Validation(String),

    /// A unique key collided or a state transition was requested that the
    /// lifecycle graph does not allow.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Backing-store failure — contention or I/O underneath SQLite.
    /// Retryable by the caller.
    #[error("store error: {0}")]
    Store(String),

    /// Invalid configuration (e.g. a sending window with no active days).
    /// Fatal for the operation — never silently defaulted.
    #[error("config error: {0}")]
    Config(String),

    /// External messaging channel failure.
    #[error("channel error: {0}")]
    Channel(String),

    /// Contact file could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlastClawError {
    /// Short machine-readable code, used in gateway responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Store(_) => "STORE",
            Self::Config(_) => "CONFIG",
            Self::Channel(_) => "CHANNEL",
            Self::Parse(_) => "PARSE",
            Self::Io(_) => "IO",
        }
    }

    /// True for the duplicate-phone conflict raised by the contact store.
    pub fn is_duplicate_phone(&self) -> bool {
        matches!(self, Self::Conflict(msg) if msg.contains("DUPLICATE_PHONE"))
    }
}

pub type Result<T> = std::result::Result<T, BlastClawError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BlastClawError::Validation("x".into()).code(), "VALIDATION");
        assert_eq!(BlastClawError::Config("x".into()).code(), "CONFIG");
    }

    #[test]
    fn test_duplicate_phone_detection() {
        let err = BlastClawError::Conflict("DUPLICATE_PHONE: +5551".into());
        assert!(err.is_duplicate_phone());
        let err = BlastClawError::Conflict("template name taken".into());
        assert!(!err.is_duplicate_phone());
    }
}
