use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use conbridge_frame::{encode_log_record, Command, CommandFrameScanner, FrameError, LogRecord};
use conbridge_transport::{
    ConnectionOutcome, EndpointConfig, PipeChannel, PipeEndpoint, TransportError,
};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::host::CommandSink;

const POLL_THREAD_NAME: &str = "conbridge-poll";

/// Connection state as seen by emitters and the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No usable channel; the next poll recreates it.
    Disconnected = 0,
    /// Endpoint exists, waiting for a client.
    Listening = 1,
    /// A client is attached; records are written.
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::Connected,
            1 => Self::Listening,
            _ => Self::Disconnected,
        }
    }
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub records_sent: u64,
    pub records_dropped: u64,
    pub commands_dispatched: u64,
    pub connections: u64,
}

#[derive(Default)]
struct Counters {
    records_sent: AtomicU64,
    records_dropped: AtomicU64,
    commands_dispatched: AtomicU64,
    connections: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LinkStats {
        LinkStats {
            records_sent: self.records_sent.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            commands_dispatched: self.commands_dispatched.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
        }
    }
}

struct Slot<C> {
    channel: Option<C>,
    /// Set when the current channel failed and must be recreated.
    stale: bool,
    /// Suppresses repeated warnings while recreation keeps failing.
    recreate_failing: bool,
}

/// Something worth logging, reported after the channel lock is released.
#[derive(Debug)]
enum LinkEvent {
    Recreated,
    RecreateFailed(TransportError),
    Listening,
    ClientConnected(&'static str),
    HandshakeBroken,
    ReadFailed(TransportError),
    Overflow(FrameError),
}

struct Inbound {
    scanner: CommandFrameScanner,
    buf: Vec<u8>,
}

#[derive(Default)]
struct Step {
    commands: Vec<Command>,
    event: Option<LinkEvent>,
}

impl Step {
    fn event(event: LinkEvent) -> Self {
        Self {
            commands: Vec::new(),
            event: Some(event),
        }
    }
}

struct Link<E: PipeEndpoint> {
    endpoint: E,
    config: LinkConfig,
    sink: Arc<dyn CommandSink>,
    state: AtomicU8,
    shutdown: AtomicBool,
    slot: Mutex<Slot<E::Channel>>,
    counters: Counters,
}

impl<E: PipeEndpoint> Link<E> {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.store(next as u8, Ordering::Release);
    }

    fn mark_broken(&self, slot: &mut Slot<E::Channel>) {
        slot.stale = true;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Create the endpoint for a fresh start. Failure here is fatal to `start`.
    fn open(&self) -> Result<()> {
        let channel = self.endpoint.create_or_open()?;
        let old = {
            let mut slot = self.slot.lock();
            slot.stale = false;
            slot.recreate_failing = false;
            self.set_state(ConnectionState::Disconnected);
            slot.channel.replace(channel)
        };
        if let Some(mut old) = old {
            old.close();
        }
        Ok(())
    }

    fn close(&self) {
        let channel = {
            let mut slot = self.slot.lock();
            slot.stale = false;
            self.set_state(ConnectionState::Disconnected);
            slot.channel.take()
        };
        if let Some(mut channel) = channel {
            channel.close();
        }
    }

    fn emit(&self, record: &LogRecord) {
        if self.state() != ConnectionState::Connected {
            Counters::bump(&self.counters.records_dropped);
            return;
        }

        let frame = encode_log_record(record);
        let failure = {
            let mut slot = self.slot.lock();
            // The poller may have dropped the link since the unlocked check.
            if self.state() != ConnectionState::Connected {
                Counters::bump(&self.counters.records_dropped);
                return;
            }
            let written = match slot.channel.as_mut() {
                Some(channel) => channel.write_best_effort(&frame),
                None => Err(TransportError::Closed),
            };
            match written {
                Ok(()) => None,
                Err(err) => {
                    self.mark_broken(&mut slot);
                    Some(err)
                }
            }
        };

        match failure {
            None => Counters::bump(&self.counters.records_sent),
            Some(err) => {
                Counters::bump(&self.counters.records_dropped);
                debug!(error = %err, "record write failed; link down");
            }
        }
    }

    /// One iteration's work on the channel.
    ///
    /// Only `try_connect` and `read_available` run under the slot lock.
    /// Endpoint creation, close and scanning happen with it released, so any
    /// logging they do cannot re-enter [`Link::emit`] while the lock is held.
    fn step(&self, inbound: &mut Inbound) -> Step {
        let mut recreated = false;

        let retired = {
            let mut slot = self.slot.lock();
            let needs_recreate = self.state() == ConnectionState::Disconnected
                && (slot.stale || slot.channel.is_none());
            needs_recreate.then(|| slot.channel.take())
        };
        if let Some(old) = retired {
            if let Some(mut old) = old {
                old.close();
            }
            inbound.scanner.reset();
            match self.endpoint.create_or_open() {
                Ok(channel) => {
                    let mut slot = self.slot.lock();
                    slot.channel = Some(channel);
                    slot.stale = false;
                    slot.recreate_failing = false;
                    recreated = true;
                }
                Err(err) => {
                    let mut slot = self.slot.lock();
                    let first = !slot.recreate_failing;
                    slot.recreate_failing = true;
                    return if first {
                        Step::event(LinkEvent::RecreateFailed(err))
                    } else {
                        Step::default()
                    };
                }
            }
        }

        let mut slot = self.slot.lock();
        let Some(channel) = slot.channel.as_mut() else {
            return Step::default();
        };

        let mut connected_now = None;
        if self.state() != ConnectionState::Connected {
            match channel.try_connect() {
                ConnectionOutcome::Connected => {
                    connected_now = Some(channel.transport_name());
                    Counters::bump(&self.counters.connections);
                    self.set_state(ConnectionState::Connected);
                }
                ConnectionOutcome::Pending => {
                    let was_listening = self.state() == ConnectionState::Listening;
                    self.set_state(ConnectionState::Listening);
                    return if was_listening && !recreated {
                        Step::default()
                    } else {
                        Step::event(LinkEvent::Listening)
                    };
                }
                ConnectionOutcome::Broken => {
                    self.mark_broken(&mut slot);
                    return Step::event(LinkEvent::HandshakeBroken);
                }
            }
        }

        let mut step = Step {
            commands: Vec::new(),
            event: match (connected_now, recreated) {
                (Some(transport), _) => Some(LinkEvent::ClientConnected(transport)),
                (None, true) => Some(LinkEvent::Recreated),
                (None, false) => None,
            },
        };

        let Some(channel) = slot.channel.as_mut() else {
            return step;
        };
        let read = match channel.read_available(&mut inbound.buf) {
            Ok(n) => n,
            Err(err) => {
                self.mark_broken(&mut slot);
                step.event = Some(LinkEvent::ReadFailed(err));
                return step;
            }
        };
        drop(slot);

        if read == 0 {
            return step;
        }
        match inbound.scanner.feed(&inbound.buf[..read]) {
            Ok(commands) => step.commands = commands,
            Err(overflow) => {
                // Commands ahead of the oversized one are still delivered.
                inbound.scanner.reset();
                step.commands = overflow.completed;
                self.mark_broken(&mut self.slot.lock());
                step.event = Some(LinkEvent::Overflow(overflow.error));
            }
        }
        step
    }

    fn report(&self, event: LinkEvent) {
        match event {
            LinkEvent::Recreated => {
                debug!(endpoint = %self.endpoint.describe(), "endpoint recreated");
            }
            LinkEvent::RecreateFailed(err) => {
                warn!(
                    endpoint = %self.endpoint.describe(),
                    error = %err,
                    "failed to recreate endpoint; retrying"
                );
            }
            LinkEvent::Listening => {
                debug!(endpoint = %self.endpoint.describe(), "waiting for client");
            }
            LinkEvent::ClientConnected(transport) => {
                info!(endpoint = %self.endpoint.describe(), transport, "client connected");
            }
            LinkEvent::HandshakeBroken => {
                debug!("client departed; recreating endpoint");
            }
            LinkEvent::ReadFailed(err) => {
                debug!(error = %err, "read failed; link down");
            }
            LinkEvent::Overflow(err) => {
                warn!(error = %err, "inbound command rejected; dropping link");
            }
        }
    }

    /// One polling iteration. Commands are dispatched with no lock held so a
    /// sink that logs can re-enter [`Link::emit`].
    fn poll_once(&self, inbound: &mut Inbound) {
        let Step { commands, event } = self.step(inbound);
        if let Some(event) = event {
            self.report(event);
        }
        for command in commands {
            trace!(command = command.as_str(), "dispatching command");
            self.sink.execute(&command.normalized());
            Counters::bump(&self.counters.commands_dispatched);
        }
    }

    fn run(&self) {
        let mut inbound = Inbound {
            scanner: CommandFrameScanner::with_config(self.config.scanner.clone()),
            buf: vec![0u8; self.config.read_chunk_size.max(1)],
        };
        while !self.shutdown.load(Ordering::Acquire) {
            self.poll_once(&mut inbound);
            thread::sleep(self.config.poll_interval);
        }
        debug!("polling thread exiting");
    }
}

/// Owns the pipe endpoint and the background polling thread.
///
/// Records are written synchronously from [`emit`](Self::emit) on the
/// caller's thread. Inbound commands are read by the polling thread and
/// handed to the [`CommandSink`] on that thread. Link failures after
/// [`start`](Self::start) never surface to callers: the manager drops to
/// [`ConnectionState::Disconnected`] and recreates the endpoint.
pub struct ConnectionManager<E: PipeEndpoint = EndpointConfig> {
    link: Arc<Link<E>>,
    worker: Option<JoinHandle<()>>,
}

impl<E: PipeEndpoint> ConnectionManager<E> {
    pub fn new(endpoint: E, sink: impl CommandSink + 'static, config: LinkConfig) -> Self {
        Self::with_shared_sink(endpoint, Arc::new(sink), config)
    }

    pub fn with_shared_sink(endpoint: E, sink: Arc<dyn CommandSink>, config: LinkConfig) -> Self {
        Self {
            link: Arc::new(Link {
                endpoint,
                config,
                sink,
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                shutdown: AtomicBool::new(false),
                slot: Mutex::new(Slot {
                    channel: None,
                    stale: false,
                    recreate_failing: false,
                }),
                counters: Counters::default(),
            }),
            worker: None,
        }
    }

    /// Create the endpoint and spawn the polling thread.
    ///
    /// Endpoint setup failures are returned here; later failures are not.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(LinkError::AlreadyStarted);
        }

        self.link.shutdown.store(false, Ordering::Release);
        self.link.open()?;

        let link = Arc::clone(&self.link);
        let worker = thread::Builder::new()
            .name(POLL_THREAD_NAME.to_owned())
            .spawn(move || link.run());
        match worker {
            Ok(worker) => self.worker = Some(worker),
            Err(err) => {
                self.link.close();
                return Err(LinkError::Spawn(err));
            }
        }

        info!(endpoint = %self.link.endpoint.describe(), "console bridge started");
        Ok(())
    }

    /// Stop the polling thread and remove the endpoint.
    pub fn stop(&mut self) -> Result<()> {
        let worker = self.worker.take().ok_or(LinkError::NotStarted)?;
        self.link.shutdown.store(true, Ordering::Release);
        let joined = worker.join();
        self.link.close();
        info!(endpoint = %self.link.endpoint.describe(), "console bridge stopped");
        joined.map_err(|_| LinkError::WorkerPanicked)
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Forward one record to the connected client, or drop it.
    pub fn emit(&self, record: &LogRecord) {
        self.link.emit(record);
    }

    /// A cloneable emitter that outlives borrows of the manager.
    pub fn handle(&self) -> EmitHandle<E> {
        EmitHandle {
            link: Arc::clone(&self.link),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn stats(&self) -> LinkStats {
        self.link.counters.snapshot()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.link.config
    }

    pub fn endpoint(&self) -> &E {
        &self.link.endpoint
    }
}

impl<E: PipeEndpoint> Drop for ConnectionManager<E> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(err) = self.stop() {
                warn!(error = %err, "console bridge did not stop cleanly");
            }
        }
    }
}

/// Cheap cloneable emitter bound to one [`ConnectionManager`].
pub struct EmitHandle<E: PipeEndpoint = EndpointConfig> {
    link: Arc<Link<E>>,
}

impl<E: PipeEndpoint> EmitHandle<E> {
    pub fn emit(&self, record: &LogRecord) {
        self.link.emit(record);
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }
}

impl<E: PipeEndpoint> Clone for EmitHandle<E> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
        }
    }
}
