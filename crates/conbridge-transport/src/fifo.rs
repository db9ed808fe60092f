use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::endpoint::EndpointConfig;
use crate::error::{Result, TransportError};
use crate::traits::{ConnectionOutcome, PipeChannel, PipeEndpoint};

/// Host side of the two-FIFO endpoint.
///
/// Both FIFOs are opened `O_RDWR | O_NONBLOCK`: holding a read end on the
/// outbound FIFO means writes never raise `SIGPIPE` and opens never wait for
/// a peer. There is no handshake, so a reader's departure only shows up as a
/// write that cannot complete once the pipe buffer is full. Such a write is
/// refused whole rather than split across the boundary where the platform
/// reports free pipe space.
pub struct FifoChannel {
    outbound: Option<FifoEnd>,
    inbound: Option<FifoEnd>,
}

struct FifoEnd {
    file: File,
    path: PathBuf,
    /// `(dev, ino)` of the FIFO this channel created.
    identity: (u64, u64),
}

impl FifoChannel {
    /// Create both FIFOs described by `config` and open them.
    pub fn create(config: &EndpointConfig) -> Result<Self> {
        config.validate()?;

        let outbound = FifoEnd::create(&config.outbound_path(), config.mode)?;
        let inbound = match FifoEnd::create(&config.inbound_path(), config.mode) {
            Ok(end) => end,
            Err(err) => {
                outbound.remove();
                return Err(err);
            }
        };

        info!(
            outbound = ?outbound.path,
            inbound = ?inbound.path,
            "fifo endpoint created"
        );

        Ok(Self {
            outbound: Some(outbound),
            inbound: Some(inbound),
        })
    }

    /// Path of the outbound FIFO, if still open.
    pub fn outbound_path(&self) -> Option<&Path> {
        self.outbound.as_ref().map(|end| end.path.as_path())
    }

    /// Path of the inbound FIFO, if still open.
    pub fn inbound_path(&self) -> Option<&Path> {
        self.inbound.as_ref().map(|end| end.path.as_path())
    }
}

impl PipeChannel for FifoChannel {
    fn try_connect(&mut self) -> ConnectionOutcome {
        if self.outbound.is_some() && self.inbound.is_some() {
            ConnectionOutcome::Connected
        } else {
            ConnectionOutcome::Broken
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let end = self.inbound.as_mut().ok_or(TransportError::Closed)?;
        match end.file.read(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(0),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn write_best_effort(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.outbound.as_mut().ok_or(TransportError::Closed)?;
        ensure_room(&end.file, bytes.len()).map_err(TransportError::Io)?;
        let mut offset = 0usize;
        while offset < bytes.len() {
            match end.file.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(end) = self.outbound.take() {
            end.remove();
        }
        if let Some(end) = self.inbound.take() {
            end.remove();
        }
    }

    fn transport_name(&self) -> &'static str {
        "fifo"
    }
}

impl Drop for FifoChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FifoChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoChannel")
            .field("outbound", &self.outbound_path())
            .field("inbound", &self.inbound_path())
            .finish()
    }
}

impl PipeEndpoint for EndpointConfig {
    type Channel = FifoChannel;

    fn create_or_open(&self) -> Result<FifoChannel> {
        FifoChannel::create(self)
    }

    fn describe(&self) -> String {
        format!(
            "{} + {}",
            self.outbound_path().display(),
            self.inbound_path().display()
        )
    }
}

impl FifoEnd {
    fn create(path: &Path, mode: u32) -> Result<Self> {
        remove_stale_fifo(path)?;
        make_fifo(path, mode)?;

        let created = std::fs::symlink_metadata(path).map_err(|e| TransportError::Create {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(path)
            .map_err(|e| {
                let _ = std::fs::remove_file(path);
                TransportError::Open {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            identity: (created.dev(), created.ino()),
        })
    }

    /// Unlink the FIFO unless something else has replaced it in the meantime.
    fn remove(self) {
        let (expected_dev, expected_ino) = self.identity;
        drop(self.file);
        match std::fs::symlink_metadata(&self.path) {
            Ok(metadata)
                if metadata.file_type().is_fifo()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino =>
            {
                debug!(path = ?self.path, "removing fifo");
                let _ = std::fs::remove_file(&self.path);
            }
            Ok(_) => {
                debug!(path = ?self.path, "fifo path identity changed; skipping cleanup");
            }
            Err(_) => {}
        }
    }
}

/// Remove a FIFO left behind by a previous run. Anything else at `path` is
/// left alone and reported.
fn remove_stale_fifo(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(TransportError::Create {
                path: path.to_path_buf(),
                source: err,
            })
        }
    };

    if !metadata.file_type().is_fifo() {
        return Err(TransportError::NotAFifo {
            path: path.to_path_buf(),
        });
    }

    debug!(?path, "removing stale fifo");
    std::fs::remove_file(path).map_err(|e| TransportError::Create {
        path: path.to_path_buf(),
        source: e,
    })
}

fn make_fifo(path: &Path, mode: u32) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| TransportError::Create {
        path: path.to_path_buf(),
        source: std::io::Error::new(ErrorKind::InvalidInput, "path contains NUL"),
    })?;

    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc != 0 {
        return Err(TransportError::Create {
            path: path.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }

    // mkfifo is subject to the umask; apply the requested bits explicitly.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        TransportError::Create {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Open the reader's ends: outbound FIFO for reading, inbound for writing.
///
/// Both are opened non-blocking so a missing host is reported instead of
/// hanging, then switched back to blocking mode for ordinary stream use.
pub(crate) fn open_client(config: &EndpointConfig) -> Result<(File, File)> {
    let outbound = config.outbound_path();
    let inbound = config.inbound_path();

    for path in [&outbound, &inbound] {
        let metadata = std::fs::symlink_metadata(path).map_err(|e| TransportError::Open {
            path: path.clone(),
            source: e,
        })?;
        if !metadata.file_type().is_fifo() {
            return Err(TransportError::NotAFifo { path: path.clone() });
        }
    }

    let records = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(&outbound)
        .map_err(|e| TransportError::Open {
            path: outbound.clone(),
            source: e,
        })?;

    // ENXIO here means no process holds the read end, i.e. no host is serving.
    let commands = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(&inbound)
        .map_err(|e| TransportError::Open {
            path: inbound.clone(),
            source: e,
        })?;

    set_blocking(&records).map_err(|e| TransportError::Open {
        path: outbound,
        source: e,
    })?;
    set_blocking(&commands).map_err(|e| TransportError::Open {
        path: inbound,
        source: e,
    })?;

    debug!("attached to fifo endpoint");
    Ok((records, commands))
}

/// Writes up to this size are atomic on any POSIX pipe.
const ATOMIC_PIPE_WRITE: usize = 512;

/// Refuse a frame the pipe has no room for, before any byte of it is written.
///
/// Small frames are atomic anyway. Larger ones are checked against the free
/// buffer space where the platform reports it. The check is approximate: on
/// other platforms, or when the kernel's page accounting leaves less usable
/// space than reported, a frame can still be cut short. A failed write tears
/// the endpoint down, so a cut frame is always the last thing a reader sees
/// before EOF.
fn ensure_room(file: &File, len: usize) -> std::io::Result<()> {
    if len <= ATOMIC_PIPE_WRITE {
        return Ok(());
    }
    match pipe_room(file.as_raw_fd()) {
        Some(room) if room < len => Err(ErrorKind::WouldBlock.into()),
        _ => Ok(()),
    }
}

/// Free bytes in the pipe behind `fd`, if the platform can tell.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn pipe_room(fd: std::os::fd::RawFd) -> Option<usize> {
    // SAFETY: `fd` is an open pipe descriptor for the duration of the call.
    let capacity = unsafe { libc::fcntl(fd, libc::F_GETPIPE_SZ) };
    let capacity = usize::try_from(capacity).ok()?;
    capacity.checked_sub(queued_bytes(fd)?)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn pipe_room(_fd: std::os::fd::RawFd) -> Option<usize> {
    None
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn queued_bytes(fd: std::os::fd::RawFd) -> Option<usize> {
    let mut queued: libc::c_int = 0;
    // SAFETY: FIONREAD stores one c_int through the valid `queued` pointer.
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut queued) };
    if rc < 0 {
        return None;
    }
    usize::try_from(queued).ok()
}

fn set_blocking(file: &File) -> std::io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: `fd` is an open descriptor owned by `file` for the duration of both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above; only the O_NONBLOCK status flag is changed.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_endpoint(tag: &str) -> EndpointConfig {
        let dir = std::env::temp_dir().join(format!(
            "conbridge-fifo-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        EndpointConfig::named("console").with_dir(dir)
    }

    #[test]
    fn create_makes_two_fifos_with_mode() {
        let cfg = temp_endpoint("create");
        let channel = FifoChannel::create(&cfg).unwrap();

        for path in [cfg.outbound_path(), cfg.inbound_path()] {
            let metadata = std::fs::symlink_metadata(&path).unwrap();
            assert!(metadata.file_type().is_fifo());
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }

        drop(channel);
        assert!(!cfg.outbound_path().exists());
        assert!(!cfg.inbound_path().exists());
        let _ = std::fs::remove_dir_all(&cfg.dir);
    }

    #[test]
    fn stale_fifo_is_replaced() {
        let cfg = temp_endpoint("stale");
        let stale = FifoEnd::create(&cfg.outbound_path(), 0o600).unwrap();
        let stale_ino = stale.identity.1;
        // Simulate a crashed run: the FIFO stays on disk.
        std::mem::forget(stale);

        let channel = FifoChannel::create(&cfg).unwrap();
        let fresh = std::fs::symlink_metadata(cfg.outbound_path()).unwrap();
        assert!(fresh.file_type().is_fifo());
        assert_ne!(fresh.ino(), stale_ino);

        drop(channel);
        let _ = std::fs::remove_dir_all(&cfg.dir);
    }

    #[test]
    fn refuses_to_remove_regular_file() {
        let cfg = temp_endpoint("regular");
        std::fs::write(cfg.inbound_path(), b"keep me").unwrap();

        let result = FifoChannel::create(&cfg);
        assert!(matches!(result, Err(TransportError::NotAFifo { .. })));
        assert_eq!(std::fs::read(cfg.inbound_path()).unwrap(), b"keep me");
        assert!(
            !cfg.outbound_path().exists(),
            "half-created endpoint should be rolled back"
        );

        let _ = std::fs::remove_dir_all(&cfg.dir);
    }

    #[test]
    fn try_connect_is_immediate() {
        let cfg = temp_endpoint("connect");
        let mut channel = FifoChannel::create(&cfg).unwrap();
        assert_eq!(channel.try_connect(), ConnectionOutcome::Connected);

        channel.close();
        assert_eq!(channel.try_connect(), ConnectionOutcome::Broken);
        let _ = std::fs::remove_dir_all(&cfg.dir);
    }

    #[test]
    fn read_without_data_returns_zero() {
        let cfg = temp_endpoint("empty");
        let mut channel = FifoChannel::create(&cfg).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(channel.read_available(&mut buf).unwrap(), 0);
        let _ = std::fs::remove_dir_all(&cfg.dir);
    }

    #[test]
    fn full_pipe_fails_instead_of_blocking() {
        let cfg = temp_endpoint("full");
        let mut channel = FifoChannel::create(&cfg).unwrap();
        let chunk = vec![0x5A; 4096];

        let mut failed = false;
        // Linux pipes hold 64 KiB by default; nobody drains this one.
        for _ in 0..1024 {
            if channel.write_best_effort(&chunk).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed, "write into an undrained fifo should eventually fail");
        let _ = std::fs::remove_dir_all(&cfg.dir);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn frame_larger_than_free_space_is_not_written() {
        let cfg = temp_endpoint("room");
        let mut channel = FifoChannel::create(&cfg).unwrap();
        let fd = channel.outbound.as_ref().unwrap().file.as_raw_fd();

        let capacity = pipe_room(fd).unwrap();
        channel
            .write_best_effort(&vec![0x11; capacity - 1000])
            .unwrap();
        let queued = queued_bytes(fd).unwrap();

        let err = channel.write_best_effort(&[0x22; 2000]).unwrap_err();
        assert!(matches!(err, TransportError::Io(ref e) if e.kind() == ErrorKind::WouldBlock));
        assert_eq!(queued_bytes(fd), Some(queued), "no partial frame may be left behind");

        let _ = std::fs::remove_dir_all(&cfg.dir);
    }

    #[test]
    fn close_skips_replaced_path() {
        let cfg = temp_endpoint("replaced");
        let mut channel = FifoChannel::create(&cfg).unwrap();

        std::fs::remove_file(cfg.outbound_path()).unwrap();
        std::fs::write(cfg.outbound_path(), b"replacement").unwrap();

        channel.close();
        assert!(
            cfg.outbound_path().exists(),
            "close must not remove a path whose identity changed"
        );
        assert!(!cfg.inbound_path().exists());
        let _ = std::fs::remove_dir_all(&cfg.dir);
    }

    #[test]
    fn client_connect_fails_without_endpoint() {
        let cfg = temp_endpoint("nohost");
        let result = open_client(&cfg);
        assert!(matches!(result, Err(TransportError::Open { .. })));
        let _ = std::fs::remove_dir_all(&cfg.dir);
    }
}
