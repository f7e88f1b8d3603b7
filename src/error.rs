//! Error types for Rhythm Threads

use thiserror::Error;
use uuid::Uuid;

use crate::storage::{StorageError, StorageKey};

/// Rejected caller input. Raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("Invalid weekday {0}: expected 0 (Sunday) through 6 (Saturday)")]
    InvalidWeekday(u8),

    #[error("Invalid check-in time {0:?}: expected HH:MM")]
    InvalidTime(String),

    #[error("Unknown or malformed setting: {0}")]
    UnknownSetting(String),
}

impl ValidationError {
    /// Check that `value` lies in `min..=max`
    pub(crate) fn check_range(
        field: &'static str,
        value: u8,
        min: u8,
        max: u8,
    ) -> Result<(), ValidationError> {
        if (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(ValidationError::OutOfRange {
                field,
                value: value as i64,
                min: min as i64,
                max: max as i64,
            })
        }
    }
}

/// Errors surfaced by the behavioral state engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Insight unavailable, try again later: {0}")]
    AnalysisUnavailable(String),

    #[error("Stored {key} data is corrupt: {reason}")]
    StorageCorrupt { key: StorageKey, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("No signed-in user")]
    NotSignedIn,

    #[error("Reminder not found: {0}")]
    ReminderNotFound(Uuid),
}
