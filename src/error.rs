//! Unified error handling for the record-engine library.
//!
//! Only store-level failures are modeled as errors: silently dropping a
//! record write would be a data-loss bug. Missing or malformed activity data
//! is a normal domain outcome and propagates as `None`/skip instead.

use std::fmt;

/// Unified error type for record-engine operations.
#[derive(Debug, Clone)]
pub enum RecordError {
    /// The record store could not be read or written
    Store { message: String },
    /// An ingestion hook referenced an activity the activity store does not know
    ActivityNotFound { activity_id: String },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::Store { message } => {
                write!(f, "Record store error: {}", message)
            }
            RecordError::ActivityNotFound { activity_id } => {
                write!(f, "Activity '{}' not found in the activity store", activity_id)
            }
        }
    }
}

impl std::error::Error for RecordError {}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for RecordError {
    fn from(err: rusqlite::Error) -> Self {
        RecordError::Store {
            message: err.to_string(),
        }
    }
}

/// Result type alias for record-engine operations.
pub type Result<T> = std::result::Result<T, RecordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RecordError::Store {
            message: "disk I/O error".to_string(),
        };
        assert!(err.to_string().contains("disk I/O error"));

        let err = RecordError::ActivityNotFound {
            activity_id: "act-42".to_string(),
        };
        assert!(err.to_string().contains("act-42"));
    }
}
