//! Error types for moodlog-core

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the moodlog-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error outside the queue file (log directory, config file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading the queue file failed
    #[error("failed to read queue {}: {source}", path.display())]
    StorageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Appending to or clearing the queue file failed.
    ///
    /// After a failed append the event is not recorded. After a failed clear
    /// the queue contents are unknown and must be re-read.
    #[error("failed to {op} queue {}: {source}", path.display())]
    StorageWrite {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The queue file was rewritten between snapshot and clear
    #[error("queue {} changed since snapshot: {reason}", path.display())]
    QueueChanged { path: PathBuf, reason: String },

    /// Record line encoding error
    #[error("record encoding error: {0}")]
    Encoding(#[from] csv::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn write(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::StorageWrite {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::StorageRead {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for moodlog-core
pub type Result<T> = std::result::Result<T, Error>;
