//! Error types for queuebridge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("retries exhausted after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("invalid job descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("job update rejected for [{job}]: {reason}")]
    JobUpdateRejected { job: String, reason: String },

    #[error("queue-to-build mapper not started")]
    NotStarted,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
