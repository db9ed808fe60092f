//! Console bridge between a host process and one external program.
//!
//! The host's log records stream out over a named pipe (Windows) or FIFO
//! pair (Linux/macOS); the external program writes console commands back in.
//! The link survives client restarts: whenever it breaks, the endpoint is
//! torn down and recreated.
//!
//! # Crate Structure
//!
//! - [`transport`] — Host endpoints and the reader-side client stream
//! - [`frame`] — Log record codec and the inbound command scanner
//! - [`link`] — Connection manager, host glue and lifecycle

/// Re-export transport types.
pub mod transport {
    pub use conbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use conbridge_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use conbridge_link::*;
}

pub use conbridge_frame::LogRecord;
pub use conbridge_link::{Bridge, CommandSink, LinkConfig, LinkError, LogHub, LogListener, LogSource};
pub use conbridge_transport::{ClientStream, EndpointConfig};
