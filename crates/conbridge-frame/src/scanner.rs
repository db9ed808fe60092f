use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};

use crate::codec::TERMINATOR;
use crate::command::Command;
use crate::error::{FrameError, Result};

/// A [`OverflowPolicy::Disconnect`] overflow, together with the commands that
/// completed earlier in the same chunk. Those are still valid and precede the
/// oversized command on the wire.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ScanOverflow {
    pub completed: Vec<Command>,
    #[source]
    pub error: FrameError,
}

/// Default cap on a command that has not seen its terminator yet: 64 KiB.
pub const DEFAULT_MAX_PENDING: usize = 64 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// What to do when a pending command outgrows [`ScannerConfig::max_pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the oversized command, skip ahead to the next terminator and
    /// carry on.
    #[default]
    DiscardCommand,
    /// Report [`FrameError::CommandTooLarge`] so the caller drops the link.
    Disconnect,
}

/// How inbound bytes are split into commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InboundFraming {
    /// Commands end with the `<EOL>\0` terminator and may span reads.
    #[default]
    Delimited,
    /// Every read carries exactly one command (message-mode transports).
    /// Trailing NUL bytes are stripped.
    MessagePerRead,
}

/// Configuration for the command scanner.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Largest pending command in bytes, terminator excluded. Default: 64 KiB.
    pub max_pending: usize,
    /// Behavior once `max_pending` is exceeded.
    pub overflow: OverflowPolicy,
    /// Inbound message boundaries.
    pub framing: InboundFraming,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING,
            overflow: OverflowPolicy::default(),
            framing: InboundFraming::default(),
        }
    }
}

/// Reassembles commands from arbitrarily chunked reads.
///
/// Bytes are scanned once. A terminator split across two reads is tracked by
/// `match_cursor`, the length of the terminator prefix seen so far; the
/// accumulated bytes are never rescanned.
pub struct CommandFrameScanner {
    terminator: &'static [u8],
    /// `fallback[i]`: longest proper prefix of `terminator[..=i]` that is also
    /// a suffix of it.
    fallback: Vec<usize>,
    buffer: BytesMut,
    match_cursor: usize,
    /// Set while skipping the rest of an oversized command.
    discarding: bool,
    config: ScannerConfig,
}

impl CommandFrameScanner {
    /// Scanner for `<EOL>\0` with default limits.
    pub fn new() -> Self {
        Self::with_config(ScannerConfig::default())
    }

    /// Scanner for `<EOL>\0` with explicit configuration.
    pub fn with_config(config: ScannerConfig) -> Self {
        Self::with_terminator(TERMINATOR, config)
    }

    /// Scanner for an arbitrary terminator.
    ///
    /// # Panics
    ///
    /// Panics if `terminator` is empty.
    pub fn with_terminator(terminator: &'static [u8], config: ScannerConfig) -> Self {
        assert!(!terminator.is_empty(), "terminator must not be empty");
        Self {
            terminator,
            fallback: failure_table(terminator),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            match_cursor: 0,
            discarding: false,
            config,
        }
    }

    /// Feed one read's worth of bytes and collect every command it completes.
    ///
    /// An empty chunk is a no-op. Fails only under
    /// [`OverflowPolicy::Disconnect`]; the pending command and the rest of the
    /// chunk are dropped, and commands completed before the overflow are
    /// returned in [`ScanOverflow::completed`].
    pub fn feed(&mut self, chunk: &[u8]) -> std::result::Result<Vec<Command>, ScanOverflow> {
        let mut commands = Vec::new();
        if chunk.is_empty() {
            return Ok(commands);
        }

        if self.config.framing == InboundFraming::MessagePerRead {
            let end = chunk.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            let payload = &chunk[..end];
            if payload.len() > self.config.max_pending {
                self.overflow(payload.len())
                    .map_err(|error| ScanOverflow {
                        completed: Vec::new(),
                        error,
                    })?;
                self.discarding = false;
            } else {
                commands.push(Command::from_payload(payload));
            }
            return Ok(commands);
        }

        let term_len = self.terminator.len();
        for &byte in chunk {
            self.match_cursor = self.next_cursor(byte);

            if self.discarding {
                if self.match_cursor == term_len {
                    self.match_cursor = 0;
                    self.discarding = false;
                    debug!("resynchronized after oversized command");
                }
                continue;
            }

            self.buffer.put_u8(byte);

            if self.match_cursor == term_len {
                self.match_cursor = 0;
                let frame = self.buffer.split();
                commands.push(Command::from_payload(&frame[..frame.len() - term_len]));
                continue;
            }

            let pending = self.buffer.len() - self.match_cursor;
            if pending > self.config.max_pending {
                if let Err(error) = self.overflow(pending) {
                    return Err(ScanOverflow {
                        completed: commands,
                        error,
                    });
                }
            }
        }

        Ok(commands)
    }

    /// Drop any partial command and terminator progress.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.match_cursor = 0;
        self.discarding = false;
    }

    /// Bytes held for the command currently being received.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Length of the terminator prefix matched so far.
    pub fn match_cursor(&self) -> usize {
        self.match_cursor
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    fn next_cursor(&self, byte: u8) -> usize {
        let mut cursor = self.match_cursor;
        loop {
            if self.terminator[cursor] == byte {
                return cursor + 1;
            }
            if cursor == 0 {
                return 0;
            }
            cursor = self.fallback[cursor - 1];
        }
    }

    fn overflow(&mut self, size: usize) -> Result<()> {
        let max = self.config.max_pending;
        self.buffer.clear();
        match self.config.overflow {
            OverflowPolicy::DiscardCommand => {
                warn!(size, max, "discarding oversized command");
                self.discarding = true;
                Ok(())
            }
            OverflowPolicy::Disconnect => {
                self.match_cursor = 0;
                Err(FrameError::CommandTooLarge { size, max })
            }
        }
    }
}

impl Default for CommandFrameScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandFrameScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandFrameScanner")
            .field("pending", &self.buffer.len())
            .field("match_cursor", &self.match_cursor)
            .field("discarding", &self.discarding)
            .field("config", &self.config)
            .finish()
    }
}

fn failure_table(pattern: &[u8]) -> Vec<usize> {
    let mut table = vec![0usize; pattern.len()];
    let mut k = 0usize;
    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = table[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        table[i] = k;
    }
    table
}
