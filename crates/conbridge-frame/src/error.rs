/// Errors that can occur while encoding, decoding or scanning messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The bytes following a record's message field are not the terminator.
    #[error("invalid record terminator (expected \"<EOL>\\0\")")]
    InvalidTerminator,

    /// A standalone command buffer does not end with the terminator.
    #[error("command is missing its \"<EOL>\\0\" terminator")]
    MissingTerminator,

    /// A record declares a string longer than the configured maximum.
    #[error("string field too large ({size} bytes, max {max})")]
    StringTooLarge { size: usize, max: usize },

    /// An inbound command grew past the pending-command limit.
    #[error("pending command too large ({size} bytes, max {max})")]
    CommandTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading records or writing commands.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete record was received.
    #[error("connection closed (incomplete record)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
