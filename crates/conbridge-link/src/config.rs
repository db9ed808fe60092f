use std::time::Duration;

use conbridge_frame::ScannerConfig;

/// Default delay between polling iterations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default size of a single non-blocking read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024;

/// Configuration for the connection manager.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Sleep between polling iterations. Bounds both CPU use and shutdown
    /// latency. Default: 50 ms.
    pub poll_interval: Duration,
    /// Maximum bytes taken from the channel per iteration. Default: 8 KiB.
    pub read_chunk_size: usize,
    /// Inbound command scanning.
    pub scanner: ScannerConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            scanner: ScannerConfig::default(),
        }
    }
}

impl LinkConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_scanner(mut self, scanner: ScannerConfig) -> Self {
        self.scanner = scanner;
        self
    }
}
