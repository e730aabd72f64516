use std::io;
use thiserror::Error;

/// A failure while writing a native response.
///
/// Write failures are terminal: the dispatcher logs them and abandons the
/// request, it never retries a partially written response.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("response already completed")]
    AlreadyCompleted,

    #[error("connection broken: {reason}")]
    ConnectionBroken { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl WriteError {
    pub fn connection_broken<S: ToString>(reason: S) -> Self {
        Self::ConnectionBroken { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
