//! Error types for the cronprimer domain.

use crate::canonical_json::CanonicalJsonError;

/// The result type used throughout cronprimer-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
///
/// Schedule rejections are not errors; see [`crate::schedule::ShiftRejection`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A schedule expression could not be parsed.
    #[error(transparent)]
    ScheduleParse(#[from] ScheduleParseError),

    /// Canonical serialization failed while fingerprinting.
    #[error("fingerprint error: {0}")]
    Fingerprint(#[from] CanonicalJsonError),

    /// An in-process store failed (lock poisoning).
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// A schedule expression that is not a valid standard cron expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to parse cron schedule {expression:?}: {message}")]
pub struct ScheduleParseError {
    /// The offending expression.
    pub expression: String,
    /// Why it failed to parse.
    pub message: String,
}

impl ScheduleParseError {
    /// Creates a new parse error.
    #[must_use]
    pub fn new(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            message: message.into(),
        }
    }
}
