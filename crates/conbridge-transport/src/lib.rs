//! Host-side pipe endpoints for the conbridge console bridge.
//!
//! Two transport models sit behind the one [`PipeChannel`] trait:
//! - a pair of FIFOs opened once and left open (Linux/macOS)
//! - a single duplex named pipe with a listen/accept handshake (Windows)
//!
//! This is the lowest layer of conbridge. Channels never block and report
//! every I/O failure as an error the caller treats as a disconnect.

pub mod endpoint;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod fifo;
#[cfg(windows)]
pub mod named_pipe;

pub use endpoint::{EndpointConfig, DEFAULT_ENDPOINT_NAME, DEFAULT_FIFO_DIR, DEFAULT_FIFO_MODE};
pub use error::{Result, TransportError};
pub use traits::{ClientStream, ConnectionOutcome, PipeChannel, PipeEndpoint};

#[cfg(unix)]
pub use fifo::FifoChannel;
#[cfg(windows)]
pub use named_pipe::NamedPipeChannel;
