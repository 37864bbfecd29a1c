//! Error types for lock and counter operations

use std::num::ParseIntError;

use kvlatch_store::StoreError;

/// Error type for coordinator and counter operations
#[derive(Debug, thiserror::Error)]
pub enum LatchError {
    #[error("timed out waiting to get lock")]
    TimedOut,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("malformed counter value at '{key}': '{value}'")]
    MalformedCounterValue {
        key: String,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("lock coordinator dropped the request")]
    Closed,

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl LatchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LatchError::TimedOut)
    }
}

pub type Result<T> = std::result::Result<T, LatchError>;
