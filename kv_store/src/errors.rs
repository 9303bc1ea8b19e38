//! Error types for store operations
//!
//! Every outcome a store can report besides success is a `StoreFault`.
//! Callers match on the variant to tell expected outcomes (missing key,
//! conflicts) from genuine failures.

use thiserror::Error;

/// Store operation faults
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreFault {
    #[error("Key not found")]
    NotFound,

    #[error("Key already exists")]
    AlreadyExists,

    #[error("CAS version mismatch")]
    CasMismatch,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Unsupported store: {0}")]
    Unsupported(String),
}

impl From<redis::RedisError> for StoreFault {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::TypeError {
            StoreFault::Malformed(err.to_string())
        } else if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
        {
            StoreFault::Transport(err.to_string())
        } else {
            StoreFault::Server(err.to_string())
        }
    }
}
