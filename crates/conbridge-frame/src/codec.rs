use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Message terminator used in both directions: `<EOL>` followed by a NUL.
pub const TERMINATOR: &[u8] = b"<EOL>\0";

/// Size of every numeric field and string length prefix.
const INT_SIZE: usize = 4;

/// Smallest encoded record: four 32-bit words, two empty strings, terminator.
pub const MIN_RECORD_SIZE: usize = 5 * INT_SIZE + TERMINATOR.len();

/// Default cap on a single decoded string field: 1 MiB.
pub const DEFAULT_MAX_STRING: usize = 1024 * 1024;

/// Opaque white, the color hosts use for uncolored output.
pub const DEFAULT_COLOR: i32 = i32::from_ne_bytes([255, 255, 255, 255]);

/// One log line emitted by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Host logging channel identifier.
    pub channel_id: i32,
    /// Host severity level.
    pub severity: i32,
    /// Host logging channel name.
    pub channel_name: String,
    /// Packed RGBA color in host memory order.
    pub color: i32,
    /// The log text itself.
    pub message: String,
}

impl LogRecord {
    /// Record on channel 0 with severity 0 and the default color.
    pub fn new(channel_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel_id: 0,
            severity: 0,
            channel_name: channel_name.into(),
            color: DEFAULT_COLOR,
            message: message.into(),
        }
    }

    pub fn with_channel_id(mut self, channel_id: i32) -> Self {
        self.channel_id = channel_id;
        self
    }

    pub fn with_severity(mut self, severity: i32) -> Self {
        self.severity = severity;
        self
    }

    /// Set the color from its components.
    pub fn with_rgba(mut self, r: u8, g: u8, b: u8, a: u8) -> Self {
        self.color = i32::from_ne_bytes([r, g, b, a]);
        self
    }

    /// Color components `[r, g, b, a]`.
    pub fn rgba(&self) -> [u8; 4] {
        self.color.to_ne_bytes()
    }

    /// Exact number of bytes [`encode_log_record`] produces for this record.
    pub fn encoded_len(&self) -> usize {
        MIN_RECORD_SIZE + clamp_len(self.channel_name.len()) + clamp_len(self.message.len())
    }
}

/// Encode a record into its wire form.
///
/// Wire format (all integers native-endian):
/// ```text
/// ┌────────────┬──────────┬──────────────────────┬─────────┬──────────────────────┬──────────┐
/// │ channel_id │ severity │ channel_name         │ color   │ message              │ "<EOL>\0"│
/// │ i32        │ i32      │ u32 len + UTF-8      │ i32     │ u32 len + UTF-8      │ 6 bytes  │
/// └────────────┴──────────┴──────────────────────┴─────────┴──────────────────────┴──────────┘
/// ```
pub fn encode_log_record(record: &LogRecord) -> Bytes {
    let mut dst = BytesMut::with_capacity(record.encoded_len());
    encode_log_record_into(record, &mut dst);
    dst.freeze()
}

/// Append the wire form of `record` to `dst`.
pub fn encode_log_record_into(record: &LogRecord, dst: &mut BytesMut) {
    dst.reserve(record.encoded_len());
    dst.put_i32_ne(record.channel_id);
    dst.put_i32_ne(record.severity);
    put_string(dst, &record.channel_name);
    dst.put_i32_ne(record.color);
    put_string(dst, &record.message);
    dst.put_slice(TERMINATOR);
}

fn clamp_len(len: usize) -> usize {
    len.min(u32::MAX as usize)
}

fn put_string(dst: &mut BytesMut, value: &str) {
    let bytes = value.as_bytes();
    let len = clamp_len(bytes.len());
    dst.put_u32_ne(len as u32);
    dst.put_slice(&bytes[..len]);
}

/// Decode one record from the front of `src`.
///
/// Returns `Ok(None)` if `src` doesn't hold a complete record yet. On success
/// the record's bytes are consumed.
pub fn decode_log_record(src: &mut BytesMut, max_string: usize) -> Result<Option<LogRecord>> {
    let mut peek = Peek::new(&src[..]);

    let Some(channel_id) = peek.i32() else {
        return Ok(None);
    };
    let Some(severity) = peek.i32() else {
        return Ok(None);
    };
    let Some(channel_name) = peek.string(max_string)? else {
        return Ok(None);
    };
    let Some(color) = peek.i32() else {
        return Ok(None);
    };
    let Some(message) = peek.string(max_string)? else {
        return Ok(None);
    };
    let Some(terminator) = peek.take(TERMINATOR.len()) else {
        return Ok(None);
    };
    if terminator != TERMINATOR {
        return Err(FrameError::InvalidTerminator);
    }

    let record = LogRecord {
        channel_id,
        severity,
        channel_name: String::from_utf8_lossy(channel_name).into_owned(),
        color,
        message: String::from_utf8_lossy(message).into_owned(),
    };
    let consumed = peek.pos;
    src.advance(consumed);
    Ok(Some(record))
}

/// Read-only cursor over a partially received record.
struct Peek<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Peek<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn i32(&mut self) -> Option<i32> {
        let bytes = self.take(INT_SIZE)?;
        Some(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self, max: usize) -> Result<Option<&'a [u8]>> {
        let Some(len_bytes) = self.take(INT_SIZE) else {
            return Ok(None);
        };
        let len =
            u32::from_ne_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        if len > max {
            return Err(FrameError::StringTooLarge { size: len, max });
        }
        Ok(self.take(len))
    }
}

/// Encode a command for the inbound direction: payload then terminator.
pub fn encode_command(command: &str) -> Bytes {
    let mut dst = BytesMut::with_capacity(command.len() + TERMINATOR.len());
    dst.put_slice(command.as_bytes());
    dst.put_slice(TERMINATOR);
    dst.freeze()
}

/// Decode a single, complete command buffer.
///
/// The inbound stream is handled by
/// [`CommandFrameScanner`](crate::scanner::CommandFrameScanner); this is the
/// one-shot counterpart of [`encode_command`].
pub fn decode_command(bytes: &[u8]) -> Result<String> {
    let payload = bytes
        .strip_suffix(TERMINATOR)
        .ok_or(FrameError::MissingTerminator)?;
    Ok(String::from_utf8_lossy(payload).into_owned())
}
