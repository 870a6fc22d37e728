//! Error taxonomy for the enforcement engine.

use thiserror::Error;

use crate::backend::StoreError;

/// The fixed message carried by every record-access rejection.
///
/// Rejections never vary per record: distinct messages would reveal which
/// records exist to callers that may not see them.
pub const ILLEGAL_RECORD_ACCESS: &str = "illegal record access";

/// Error type for enforcement operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnforcementError {
    /// A materializing record is outside the caller's accessible scope, or
    /// requires a privilege the caller lacks. Fatal to the surrounding unit
    /// of work; never retried, never silently swallowed.
    #[error("{}", ILLEGAL_RECORD_ACCESS)]
    IllegalRecordAccess,

    /// A collaborator store failed. Propagated uninterpreted: proceeding
    /// without knowing the store's answer would be unsafe.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An administrative call named a filter that was never registered.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// Two filter registrations share a name.
    #[error("duplicate filter registration: {0}")]
    DuplicateFilter(String),

    /// An engine invariant failed, such as a poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EnforcementError {
    /// Creates an internal error.
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Result type for enforcement operations.
pub type Result<T> = std::result::Result<T, EnforcementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_message_is_fixed() {
        assert_eq!(
            EnforcementError::IllegalRecordAccess.to_string(),
            "illegal record access"
        );
    }

    #[test]
    fn store_errors_pass_through_transparently() {
        let err = EnforcementError::from(StoreError::Unavailable("grant db down".to_string()));
        assert_eq!(err.to_string(), "store unavailable: grant db down");
    }
}
