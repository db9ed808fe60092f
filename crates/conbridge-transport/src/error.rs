use std::path::PathBuf;

/// Errors that can occur while creating or using a pipe endpoint.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create the endpoint (mkfifo / CreateNamedPipe).
    #[error("failed to create endpoint {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open an existing endpoint.
    #[error("failed to open endpoint {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A non-FIFO file occupies the endpoint path and will not be removed.
    #[error("refusing to replace {path}: existing path is not a fifo")]
    NotAFifo { path: PathBuf },

    /// The endpoint name is unusable on this platform.
    #[error("invalid endpoint name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// An I/O error occurred on an open channel.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel has been closed.
    #[error("channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
