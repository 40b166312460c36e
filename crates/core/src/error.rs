// crates/core/src/error.rs
use thiserror::Error;

/// Errors surfaced per decoded line. Neither variant is fatal to the
/// stream: callers report the line and keep going.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed event: {message}")]
    Malformed { message: String },

    /// A fault inside the decoder was caught and converted instead of
    /// propagating to the caller.
    #[error("internal decoder fault")]
    InternalFault,
}

impl DecodeError {
    pub fn malformed(message: impl std::fmt::Display) -> Self {
        Self::Malformed {
            message: message.to_string(),
        }
    }
}
