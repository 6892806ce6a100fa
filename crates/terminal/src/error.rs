/// Crate-wide result type for process session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed process session errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// PTY allocation or shell spawn failed.
    #[error("failed to spawn process session: {message}")]
    Spawn { message: String },

    /// Writing to the process input failed.
    #[error("failed to write to process session: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },

    /// A session lock was poisoned by a panicking thread.
    #[error("process session state poisoned: {message}")]
    Poisoned { message: String },
}

impl Error {
    #[must_use]
    pub fn spawn(message: impl std::fmt::Display) -> Self {
        Self::Spawn {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn poisoned(message: impl std::fmt::Display) -> Self {
        Self::Poisoned {
            message: message.to_string(),
        }
    }
}
