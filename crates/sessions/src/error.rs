use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read resume store: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to write resume store {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("resume store lock poisoned: {message}")]
    Lock { message: String },
}

impl Error {
    #[must_use]
    pub fn lock_failed(message: impl Into<String>) -> Self {
        Self::Lock {
            message: message.into(),
        }
    }

    pub(crate) fn persist(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
