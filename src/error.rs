use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the cache, the knowledge store and the synthesis client.
///
/// Missing entries are not errors (they come back as `None`), and corrupt
/// cache metadata or index files are repaired in place and only logged.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid artifact key: {0:?}")]
    InvalidKey(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("synthesis failed: {0}")]
    Upstream(String),

    #[error("invalid request: {0}")]
    Validation(String),
}

impl Error {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
