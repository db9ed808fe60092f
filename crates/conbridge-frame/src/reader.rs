use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_log_record, LogRecord, DEFAULT_MAX_STRING};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete log records from any `Read` stream.
///
/// This is the external reader's side of the outbound direction. Partial
/// reads are handled internally; callers always get whole records.
pub struct LogRecordReader<T> {
    inner: T,
    buf: BytesMut,
    max_string: usize,
}

impl<T: Read> LogRecordReader<T> {
    /// Create a reader with the default string limit.
    pub fn new(inner: T) -> Self {
        Self::with_max_string(inner, DEFAULT_MAX_STRING)
    }

    /// Create a reader that rejects string fields longer than `max_string`.
    pub fn with_max_string(inner: T, max_string: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_string,
        }
    }

    /// Read the next complete record (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_record(&mut self) -> Result<LogRecord> {
        loop {
            if let Some(record) = decode_log_record(&mut self.buf, self.max_string)? {
                return Ok(record);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Iterator for LogRecordReader<T> {
    type Item = Result<LogRecord>;

    /// Yields records until the stream closes cleanly.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_record() {
            Ok(record) => Some(Ok(record)),
            Err(FrameError::ConnectionClosed) if self.buf.is_empty() => None,
            Err(err) => Some(Err(err)),
        }
    }
}
