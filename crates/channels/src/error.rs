/// Crate-wide result type for channel session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed channel session errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No live session exists for the channel.
    #[error("unknown channel: {channel_id}")]
    UnknownChannel { channel_id: String },

    /// The session exists but cannot take the operation right now.
    #[error("channel session unavailable: {message}")]
    Unavailable { message: String },

    /// Spawning or driving the process session failed.
    #[error(transparent)]
    Terminal(#[from] switchboard_terminal::Error),

    /// Persisting the resume id failed.
    #[error(transparent)]
    Store(#[from] switchboard_sessions::Error),
}

impl Error {
    #[must_use]
    pub fn unknown_channel(channel_id: impl std::fmt::Display) -> Self {
        Self::UnknownChannel {
            channel_id: channel_id.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }
}
