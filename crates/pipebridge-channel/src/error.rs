use std::path::PathBuf;

/// Errors that can occur when opening or operating on an IPC channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel path is missing or cannot be opened for read/write.
    #[error("cannot open {path} for read/write: {source}")]
    Unavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the open channel.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
