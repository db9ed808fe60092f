use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};

use crate::codec::TERMINATOR;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes terminated commands to any `Write` stream.
///
/// This is the external writer's side of the inbound direction.
pub struct CommandWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> CommandWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Send one command followed by the terminator, as a single write where
    /// the stream allows it.
    pub fn send(&mut self, command: &str) -> Result<()> {
        self.buf.clear();
        self.buf.reserve(command.len() + TERMINATOR.len());
        self.buf.put_slice(command.as_bytes());
        self.buf.put_slice(TERMINATOR);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::scanner::CommandFrameScanner;

    #[test]
    fn written_commands_scan_back() {
        let mut writer = CommandWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send("status").unwrap();
        writer.send("say hi\n").unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire, b"status<EOL>\0say hi\n<EOL>\0");

        let mut scanner = CommandFrameScanner::new();
        let commands = scanner.feed(&wire).unwrap();
        assert_eq!(commands, vec!["status", "say hi\n"]);
    }

    #[test]
    fn zero_write_is_closed() {
        let mut writer = CommandWriter::new(ZeroWriter);
        assert!(matches!(
            writer.send("x"),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn short_writes_are_completed() {
        let mut writer = CommandWriter::new(ShortWriter { data: Vec::new() });
        writer.send("changelevel").unwrap();
        assert_eq!(writer.get_ref().data, b"changelevel<EOL>\0");
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ShortWriter {
        data: Vec<u8>,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(3);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
