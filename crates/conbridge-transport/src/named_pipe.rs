use std::fs::{File, OpenOptions};
use std::os::windows::ffi::OsStrExt;
use std::path::PathBuf;

use tracing::{debug, info};
use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_NO_DATA, ERROR_PIPE_CONNECTED, ERROR_PIPE_LISTENING, HANDLE,
    INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    ReadFile, WriteFile, FILE_FLAG_FIRST_PIPE_INSTANCE, PIPE_ACCESS_DUPLEX,
};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, PIPE_NOWAIT, PIPE_READMODE_BYTE,
    PIPE_REJECT_REMOTE_CLIENTS, PIPE_TYPE_BYTE,
};

use crate::endpoint::EndpointConfig;
use crate::error::{Result, TransportError};
use crate::traits::{ConnectionOutcome, PipeChannel, PipeEndpoint};

/// In/out buffer size requested from the pipe driver.
const PIPE_BUFFER_SIZE: u32 = 8 * 1024;

/// Host side of a single-instance duplex named pipe in non-blocking mode.
///
/// `ConnectNamedPipe` drives the listen/accept handshake; a client that goes
/// away leaves the instance in a state that needs a fresh pipe.
pub struct NamedPipeChannel {
    handle: HANDLE,
    name: String,
}

// SAFETY: the pipe handle is exclusively owned by this value and the Win32
// pipe calls used here are safe to issue from any thread.
unsafe impl Send for NamedPipeChannel {}

impl NamedPipeChannel {
    /// Create the pipe `\\.\pipe\<name>`.
    ///
    /// `FILE_FLAG_FIRST_PIPE_INSTANCE` turns a name collision with another
    /// live server into a setup error instead of a silent second instance.
    pub fn create(config: &EndpointConfig) -> Result<Self> {
        config.validate()?;
        let name = config.pipe_name();
        let wide: Vec<u16> = std::ffi::OsStr::new(&name)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: `wide` is a NUL-terminated UTF-16 string that outlives the
        // call; a null security-attributes pointer selects the default ACL.
        let handle = unsafe {
            CreateNamedPipeW(
                wide.as_ptr(),
                PIPE_ACCESS_DUPLEX | FILE_FLAG_FIRST_PIPE_INSTANCE,
                PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_NOWAIT | PIPE_REJECT_REMOTE_CLIENTS,
                1,
                PIPE_BUFFER_SIZE,
                PIPE_BUFFER_SIZE,
                0,
                std::ptr::null(),
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            return Err(TransportError::Create {
                path: PathBuf::from(&name),
                source: std::io::Error::last_os_error(),
            });
        }

        info!(pipe = %name, "named pipe endpoint created");
        Ok(Self { handle, name })
    }

    /// Full pipe name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.handle != INVALID_HANDLE_VALUE
    }
}

fn last_error_code() -> Option<u32> {
    std::io::Error::last_os_error()
        .raw_os_error()
        .map(|code| code as u32)
}

impl PipeChannel for NamedPipeChannel {
    fn try_connect(&mut self) -> ConnectionOutcome {
        if !self.is_open() {
            return ConnectionOutcome::Broken;
        }

        // SAFETY: `handle` is a live pipe handle; no OVERLAPPED in PIPE_NOWAIT mode.
        let ok = unsafe { ConnectNamedPipe(self.handle, std::ptr::null_mut()) };
        if ok != 0 {
            return ConnectionOutcome::Connected;
        }

        match last_error_code() {
            Some(ERROR_PIPE_CONNECTED) => ConnectionOutcome::Connected,
            Some(ERROR_PIPE_LISTENING) => ConnectionOutcome::Pending,
            // ERROR_NO_DATA: the client closed before the connect completed.
            _ => ConnectionOutcome::Broken,
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        // A departed client only shows up through ConnectNamedPipe.
        if self.try_connect() == ConnectionOutcome::Broken {
            return Err(TransportError::Io(std::io::ErrorKind::BrokenPipe.into()));
        }

        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let mut read = 0u32;
        // SAFETY: `buf` is valid for `len` writable bytes and `read` is a valid out pointer.
        let ok = unsafe {
            ReadFile(
                self.handle,
                buf.as_mut_ptr(),
                len,
                &mut read,
                std::ptr::null_mut(),
            )
        };

        if ok != 0 {
            return Ok(read as usize);
        }
        match last_error_code() {
            Some(ERROR_NO_DATA) => Ok(0),
            _ => Err(TransportError::Io(std::io::Error::last_os_error())),
        }
    }

    fn write_best_effort(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        let mut offset = 0usize;
        while offset < bytes.len() {
            let remaining = &bytes[offset..];
            let len = u32::try_from(remaining.len()).unwrap_or(u32::MAX);
            let mut written = 0u32;
            // SAFETY: `remaining` is valid for `len` readable bytes and `written`
            // is a valid out pointer.
            let ok = unsafe {
                WriteFile(
                    self.handle,
                    remaining.as_ptr(),
                    len,
                    &mut written,
                    std::ptr::null_mut(),
                )
            };
            if ok == 0 {
                return Err(TransportError::Io(std::io::Error::last_os_error()));
            }
            if written == 0 {
                // PIPE_NOWAIT reports a full buffer as a zero-byte success.
                return Err(TransportError::Io(std::io::ErrorKind::WouldBlock.into()));
            }
            offset += written as usize;
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.is_open() {
            return;
        }
        // SAFETY: `handle` is live and owned; it is invalidated right after.
        unsafe {
            DisconnectNamedPipe(self.handle);
            CloseHandle(self.handle);
        }
        self.handle = INVALID_HANDLE_VALUE;
        debug!(pipe = %self.name, "named pipe closed");
    }

    fn transport_name(&self) -> &'static str {
        "named-pipe"
    }
}

impl Drop for NamedPipeChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for NamedPipeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedPipeChannel")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl PipeEndpoint for EndpointConfig {
    type Channel = NamedPipeChannel;

    fn create_or_open(&self) -> Result<NamedPipeChannel> {
        NamedPipeChannel::create(self)
    }

    fn describe(&self) -> String {
        self.pipe_name()
    }
}

/// Open the client end of the pipe for reading and writing.
pub(crate) fn open_client(config: &EndpointConfig) -> Result<File> {
    let name = config.pipe_name();
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(&name)
        .map_err(|e| TransportError::Open {
            path: PathBuf::from(name),
            source: e,
        })
}
