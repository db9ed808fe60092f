use std::fs::File;
use std::io::{Read, Write};

use crate::endpoint::EndpointConfig;
use crate::error::Result;

/// Result of one connection-progress attempt on a host channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// A client is attached (or the transport has no handshake).
    Connected,
    /// The endpoint is listening and no client has attached yet.
    Pending,
    /// The endpoint is unusable and must be recreated.
    Broken,
}

/// Host side of a duplex byte channel.
///
/// Implementations never block: reads return whatever is available and
/// writes fail instead of waiting for buffer space. Any error returned from
/// [`read_available`](Self::read_available) or
/// [`write_best_effort`](Self::write_best_effort) means the link is gone.
///
/// `try_connect`, `read_available` and `write_best_effort` run under the
/// manager's channel lock and must not emit `tracing` events.
pub trait PipeChannel: Send + 'static {
    /// Advance the connection handshake. Transports without one return
    /// [`ConnectionOutcome::Connected`].
    fn try_connect(&mut self) -> ConnectionOutcome;

    /// Read up to `buf.len()` bytes. `Ok(0)` means nothing is available.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `bytes` or fail.
    fn write_best_effort(&mut self, bytes: &[u8]) -> Result<()>;

    /// Release the OS handles and remove the endpoint. Idempotent.
    fn close(&mut self);

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

/// Something a [`PipeChannel`] can be created from.
///
/// The manager calls [`create_or_open`](Self::create_or_open) once at start
/// and again every time a broken channel is torn down.
pub trait PipeEndpoint: Send + Sync + 'static {
    type Channel: PipeChannel;

    /// Create the endpoint, removing any stale leftover first.
    fn create_or_open(&self) -> Result<Self::Channel>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Reader-side connection to a running host endpoint.
///
/// Reading yields encoded log records; writing sends command bytes.
/// On unix this wraps the two FIFOs, on Windows the single duplex pipe.
pub struct ClientStream {
    inner: ClientStreamInner,
}

enum ClientStreamInner {
    #[cfg(unix)]
    Fifo { records: File, commands: File },
    #[cfg(windows)]
    Pipe(File),
}

impl ClientStream {
    /// Attach to the endpoint a host created from `config`.
    ///
    /// Fails instead of waiting when no host is serving the endpoint.
    pub fn connect(config: &EndpointConfig) -> Result<Self> {
        config.validate()?;

        #[cfg(unix)]
        {
            let (records, commands) = crate::fifo::open_client(config)?;
            Ok(Self {
                inner: ClientStreamInner::Fifo { records, commands },
            })
        }

        #[cfg(windows)]
        {
            let pipe = crate::named_pipe::open_client(config)?;
            Ok(Self {
                inner: ClientStreamInner::Pipe(pipe),
            })
        }
    }

    /// Duplicate the underlying handles so reading and writing can happen on
    /// different threads.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            #[cfg(unix)]
            ClientStreamInner::Fifo { records, commands } => ClientStreamInner::Fifo {
                records: records.try_clone()?,
                commands: commands.try_clone()?,
            },
            #[cfg(windows)]
            ClientStreamInner::Pipe(pipe) => ClientStreamInner::Pipe(pipe.try_clone()?),
        };
        Ok(Self { inner })
    }
}

impl Read for ClientStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            ClientStreamInner::Fifo { records, .. } => records.read(buf),
            #[cfg(windows)]
            ClientStreamInner::Pipe(pipe) => pipe.read(buf),
        }
    }
}

impl Write for ClientStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            ClientStreamInner::Fifo { commands, .. } => commands.write(buf),
            #[cfg(windows)]
            ClientStreamInner::Pipe(pipe) => pipe.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            ClientStreamInner::Fifo { commands, .. } => commands.flush(),
            #[cfg(windows)]
            ClientStreamInner::Pipe(pipe) => pipe.flush(),
        }
    }
}

impl std::fmt::Debug for ClientStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            ClientStreamInner::Fifo { .. } => {
                f.debug_struct("ClientStream").field("type", &"fifo").finish()
            }
            #[cfg(windows)]
            ClientStreamInner::Pipe(_) => f
                .debug_struct("ClientStream")
                .field("type", &"named-pipe")
                .finish(),
        }
    }
}
