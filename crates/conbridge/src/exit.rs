use std::fmt;
use std::io;

use conbridge_frame::FrameError;
use conbridge_link::LinkError;
use conbridge_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { ref source, .. } | TransportError::Create { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::InvalidName { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::StringTooLarge { .. }
        | FrameError::CommandTooLarge { .. }
        | FrameError::InvalidTerminator
        | FrameError::MissingTerminator => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Transport(err) => transport_error(context, err),
        LinkError::AlreadyStarted | LinkError::NotStarted => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
        LinkError::Spawn(source) => io_error(context, source),
        LinkError::WorkerPanicked => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn missing_endpoint_is_transport_error() {
        let err = TransportError::Open {
            path: PathBuf::from("/tmp/none"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let cli = transport_error("connect failed", err);
        assert_eq!(cli.code, TRANSPORT_ERROR);
        assert!(cli.message.starts_with("connect failed: "));
    }

    #[test]
    fn permission_denied_keeps_its_code() {
        let err = TransportError::Create {
            path: PathBuf::from("/root/x"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(transport_error("start", err).code, PERMISSION_DENIED);
    }

    #[test]
    fn oversized_record_is_invalid_data() {
        let err = FrameError::StringTooLarge { size: 10, max: 1 };
        assert_eq!(frame_error("read", err).code, DATA_INVALID);
    }

    #[test]
    fn link_errors_unwrap_layers() {
        let err = LinkError::Transport(TransportError::InvalidName {
            name: "a/b".into(),
            reason: "contains a path separator",
        });
        assert_eq!(link_error("start", err).code, USAGE);
    }

    #[test]
    fn lifecycle_misuse_is_internal() {
        let cli = link_error("stop", LinkError::NotStarted);
        assert_eq!(cli.code, INTERNAL);
        assert!(cli.message.contains("bridge not started"));
    }
}
