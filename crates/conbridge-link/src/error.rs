/// Errors surfaced by the bridge lifecycle.
///
/// Only setup and lifecycle misuse reach callers; link failures after
/// `start` are absorbed by the connection manager.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Endpoint setup failed.
    #[error("transport error: {0}")]
    Transport(#[from] conbridge_transport::TransportError),

    /// `start` was called on a running bridge.
    #[error("bridge already started")]
    AlreadyStarted,

    /// `stop` was called on a bridge that is not running.
    #[error("bridge not started")]
    NotStarted,

    /// The polling thread could not be spawned.
    #[error("failed to spawn polling thread: {0}")]
    Spawn(std::io::Error),

    /// The polling thread panicked before it was joined.
    #[error("polling thread panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, LinkError>;
