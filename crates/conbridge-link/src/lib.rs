//! Reconnecting console bridge between a host process and one external
//! reader/writer.
//!
//! [`ConnectionManager`] owns the pipe endpoint and a polling thread that
//! accepts clients, reads commands and recreates the endpoint whenever the
//! link breaks. [`Bridge`] ties a manager to a host's [`LogSource`] so every
//! published record is forwarded while a client is connected.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use conbridge_frame::LogRecord;
//! use conbridge_link::{Bridge, LinkConfig, LogHub};
//! use conbridge_transport::EndpointConfig;
//!
//! let hub = Arc::new(LogHub::new());
//! let mut bridge = Bridge::new(
//!     Arc::clone(&hub),
//!     EndpointConfig::default(),
//!     |command: &str| print!("{command}"),
//!     LinkConfig::default(),
//! );
//! bridge.start()?;
//! hub.publish(&LogRecord::new("Console", "server ready"));
//! bridge.stop()?;
//! # Ok::<(), conbridge_link::LinkError>(())
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod manager;

pub use config::{LinkConfig, DEFAULT_POLL_INTERVAL, DEFAULT_READ_CHUNK_SIZE};
pub use error::{LinkError, Result};
pub use host::{Bridge, CommandSink, LogHub, LogListener, LogSource};
pub use manager::{ConnectionManager, ConnectionState, EmitHandle, LinkStats};
