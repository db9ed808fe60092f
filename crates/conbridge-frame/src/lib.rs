//! Wire framing for the conbridge console bridge.
//!
//! Two message shapes share one terminator, `<EOL>` followed by a NUL byte:
//! - outbound log records: fixed-order native-endian integers and
//!   length-prefixed strings, then the terminator
//! - inbound commands: raw payload bytes, then the terminator
//!
//! [`CommandFrameScanner`] turns an arbitrarily chunked inbound byte stream
//! back into commands; [`LogRecordReader`] and [`CommandWriter`] are the
//! external process's halves of the protocol.

pub mod codec;
pub mod command;
pub mod error;
pub mod reader;
pub mod scanner;
pub mod writer;

pub use codec::{
    decode_command, decode_log_record, encode_command, encode_log_record,
    encode_log_record_into, LogRecord, DEFAULT_COLOR, DEFAULT_MAX_STRING, MIN_RECORD_SIZE,
    TERMINATOR,
};
pub use command::{normalize_command, Command};
pub use error::{FrameError, Result};
pub use reader::LogRecordReader;
pub use scanner::{
    CommandFrameScanner, InboundFraming, OverflowPolicy, ScanOverflow, ScannerConfig,
    DEFAULT_MAX_PENDING,
};
pub use writer::CommandWriter;
