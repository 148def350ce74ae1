//! Error types for conduit-core.

use thiserror::Error;

/// Result type alias for record encoding and decoding.
pub type Result<T> = std::result::Result<T, RecordError>;

/// Errors raised while building or reading boundary records.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Record truncated at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Field '{field}' value {value} does not fit its record width")]
    FieldOverflow { field: &'static str, value: i64 },

    #[error("Unhandled stream mode: {0}")]
    UnhandledMode(u8),

    #[error("Illegal stream configuration: {0}")]
    IllegalConfiguration(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}
