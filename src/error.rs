//! Error types for the tally engine.
//!
//! The counting engine itself is total and never fails. These errors come
//! from the persistence side: slots and the codec.

use thiserror::Error;

/// Main error type for persistence operations.
#[derive(Debug, Error)]
pub enum CounterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Storage quota exceeded: {size} bytes (quota {quota})")]
    QuotaExceeded { size: usize, quota: usize },

    #[error("Slot is locked by another process")]
    Locked,

    #[error("Slot not initialized")]
    NotInitialized,

    #[error("Invalid persisted format: {0}")]
    InvalidFormat(String),
}

impl From<serde_json::Error> for CounterError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            CounterError::Deserialization(e.to_string())
        } else {
            CounterError::Serialization(e.to_string())
        }
    }
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, CounterError>;
