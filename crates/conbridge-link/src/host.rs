use std::sync::Arc;

use conbridge_frame::LogRecord;
use conbridge_transport::{EndpointConfig, PipeEndpoint};
use parking_lot::RwLock;
use tracing::debug;

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::manager::{ConnectionManager, ConnectionState, EmitHandle, LinkStats};

/// Executes console commands on behalf of the external writer.
///
/// Called on the polling thread with a command that ends in exactly one
/// `\n`. The sink may emit records back through the bridge.
pub trait CommandSink: Send + Sync {
    fn execute(&self, command: &str);
}

impl<F> CommandSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn execute(&self, command: &str) {
        self(command)
    }
}

/// Receives every log record the host produces.
pub trait LogListener: Send + Sync {
    fn on_log(&self, record: &LogRecord);
}

impl<E: PipeEndpoint> LogListener for EmitHandle<E> {
    fn on_log(&self, record: &LogRecord) {
        self.emit(record);
    }
}

/// The host's logging system, seen from the bridge.
///
/// A source holds at most one bridge listener. Routing the bridge's own
/// `tracing` output back into the listener is safe, but echoes those
/// diagnostics to the client.
pub trait LogSource: Send + Sync {
    fn subscribe(&self, listener: Arc<dyn LogListener>);
    fn unsubscribe(&self);
}

impl<S: LogSource + ?Sized> LogSource for Arc<S> {
    fn subscribe(&self, listener: Arc<dyn LogListener>) {
        (**self).subscribe(listener);
    }

    fn unsubscribe(&self) {
        (**self).unsubscribe();
    }
}

/// In-process [`LogSource`] for hosts without a logging system of their own.
#[derive(Default)]
pub struct LogHub {
    listener: RwLock<Option<Arc<dyn LogListener>>>,
}

impl LogHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `record` to the subscribed listener, if any.
    pub fn publish(&self, record: &LogRecord) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener.on_log(record);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.listener.read().is_some()
    }
}

impl LogSource for LogHub {
    fn subscribe(&self, listener: Arc<dyn LogListener>) {
        *self.listener.write() = Some(listener);
    }

    fn unsubscribe(&self) {
        self.listener.write().take();
    }
}

/// A [`ConnectionManager`] wired to a host [`LogSource`].
///
/// `start` opens the endpoint, then subscribes; `stop` unsubscribes, then
/// closes. Dropping a running bridge stops it.
pub struct Bridge<S: LogSource, E: PipeEndpoint = EndpointConfig> {
    manager: ConnectionManager<E>,
    source: S,
}

impl<S: LogSource, E: PipeEndpoint> Bridge<S, E> {
    pub fn new(
        source: S,
        endpoint: E,
        sink: impl CommandSink + 'static,
        config: LinkConfig,
    ) -> Self {
        Self {
            manager: ConnectionManager::new(endpoint, sink, config),
            source,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.manager.start()?;
        self.source.subscribe(Arc::new(self.manager.handle()));
        debug!("log listener subscribed");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if !self.manager.is_running() {
            return Err(LinkError::NotStarted);
        }
        self.source.unsubscribe();
        debug!("log listener unsubscribed");
        self.manager.stop()
    }

    pub fn is_running(&self) -> bool {
        self.manager.is_running()
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn stats(&self) -> LinkStats {
        self.manager.stats()
    }

    pub fn manager(&self) -> &ConnectionManager<E> {
        &self.manager
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: LogSource, E: PipeEndpoint> Drop for Bridge<S, E> {
    fn drop(&mut self) {
        if self.manager.is_running() {
            self.source.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    struct Recorder(Mutex<Vec<String>>);

    impl LogListener for Recorder {
        fn on_log(&self, record: &LogRecord) {
            self.0.lock().push(record.message.clone());
        }
    }

    #[test]
    fn hub_without_listener_drops_records() {
        let hub = LogHub::new();
        hub.publish(&LogRecord::new("Console", "nobody"));
        assert!(!hub.is_subscribed());
    }

    #[test]
    fn hub_delivers_until_unsubscribed() {
        let hub = LogHub::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        hub.subscribe(recorder.clone());

        hub.publish(&LogRecord::new("Console", "one"));
        hub.unsubscribe();
        hub.publish(&LogRecord::new("Console", "two"));

        assert_eq!(*recorder.0.lock(), vec!["one"]);
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink_seen = Arc::clone(&seen);
        let sink = move |command: &str| sink_seen.lock().push_str(command);
        sink.execute("status\n");
        assert_eq!(*seen.lock(), "status\n");
    }

    #[test]
    fn shared_source_forwards_subscription() {
        let hub = Arc::new(LogHub::new());
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let source: Arc<LogHub> = Arc::clone(&hub);
        LogSource::subscribe(&source, recorder);
        assert!(hub.is_subscribed());
        LogSource::unsubscribe(&source);
        assert!(!hub.is_subscribed());
    }
}
