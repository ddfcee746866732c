//! TCP sample receiver: connection management, background ingestion and the
//! consumer-facing snapshot surface.
//!
//! One `DataReceiver` services one peer at a time, either by listening
//! (server role) or dialing out (client role). All socket work happens on a
//! background worker thread; the caller thread only ever touches the shared
//! queue and status flags. Notifications cross back to the consumer over a
//! crossbeam channel, never through shared mutable state.
//!
//! Hand-off contract: on [`ReceiverEvent::NewDataAvailable`] the consumer
//! calls [`DataReceiver::snapshot`], transforms the samples outside any lock,
//! then calls [`DataReceiver::clear`]. Skipping the clear re-observes the
//! same samples on the next tick — delivery to the consumer layer is
//! at-least-once by design.

use crate::decoder::LineDecoder;
use crate::error::IngestError;
use crate::queue::SampleQueue;
use crate::types::{ConnectionState, ReceiverEvent, Sample};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default bound on the sample queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
/// Default tick interval, ~60 Hz to match a render loop.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

/// How long an outbound connect may take before it is reported as failed.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Worker loop pacing between non-blocking socket polls.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// State shared between the API object and the worker thread.
struct Shared {
    queue: SampleQueue,
    state: Mutex<ConnectionState>,
    connected: AtomicBool,
    receiving: AtomicBool,
    shutdown: AtomicBool,
    event_tx: Sender<ReceiverEvent>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Record a connect/disconnect transition and notify the consumer.
    /// Receiving auto-starts with the connection and stops with it.
    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        self.receiving.store(connected, Ordering::Relaxed);
        self.set_state(if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        });
        let _ = self
            .event_tx
            .send(ReceiverEvent::ConnectionStatusChanged(connected));
    }

    fn emit_error(&self, message: String) {
        warn!("{message}");
        self.set_state(ConnectionState::Error);
        let _ = self.event_tx.send(ReceiverEvent::Error(message));
    }
}

/// Builder for [`DataReceiver`] with fail-fast validation of configuration.
pub struct DataReceiverBuilder {
    max_queue_capacity: usize,
    tick_interval: Duration,
}

impl Default for DataReceiverBuilder {
    fn default() -> Self {
        Self {
            max_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl DataReceiverBuilder {
    /// Bound on the sample queue (default 10000).
    pub fn max_queue_capacity(mut self, capacity: usize) -> Self {
        self.max_queue_capacity = capacity;
        self
    }

    /// Interval of the new-data tick (default 16 ms).
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn build(self) -> Result<DataReceiver, IngestError> {
        if self.max_queue_capacity == 0 {
            return Err(IngestError::InvalidConfig(
                "max_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(IngestError::InvalidConfig(
                "tick_interval must be non-zero".to_string(),
            ));
        }

        let (event_tx, event_rx) = unbounded();
        Ok(DataReceiver {
            shared: Arc::new(Shared {
                queue: SampleQueue::new(self.max_queue_capacity),
                state: Mutex::new(ConnectionState::Idle),
                connected: AtomicBool::new(false),
                receiving: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                event_tx,
            }),
            event_rx,
            tick_interval: self.tick_interval,
            worker: None,
            local_port: None,
        })
    }
}

/// Socket-to-memory ingestion pipeline for one peer.
///
/// The queue survives reconnects; the decoder's partial-line buffer does not.
pub struct DataReceiver {
    shared: Arc<Shared>,
    event_rx: Receiver<ReceiverEvent>,
    tick_interval: Duration,
    worker: Option<JoinHandle<()>>,
    local_port: Option<u16>,
}

impl DataReceiver {
    pub fn builder() -> DataReceiverBuilder {
        DataReceiverBuilder::default()
    }

    /// Receiver with default capacity and tick interval.
    pub fn new() -> Self {
        // Defaults always pass validation.
        DataReceiverBuilder::default()
            .build()
            .expect("default receiver configuration is valid")
    }

    /// Bind a listening socket and accept peers in the background.
    ///
    /// Any previous worker (server or client) is torn down first. Port 0
    /// binds an ephemeral port, readable via [`local_port`](Self::local_port).
    /// Bind failure leaves the receiver in the `Error` state and is returned
    /// to the caller as well as surfaced on the event channel; there is no
    /// automatic retry.
    pub fn start_server(&mut self, port: u16) -> Result<(), IngestError> {
        self.teardown();
        self.local_port = None;

        let listener = match TcpListener::bind(("0.0.0.0", port)) {
            Ok(listener) => listener,
            Err(e) => {
                self.shared
                    .emit_error(format!("Failed to start server on port {port}: {e}"));
                return Err(IngestError::Io {
                    source: e,
                    context: format!("Binding TCP listener on port {port}"),
                });
            }
        };
        listener
            .set_nonblocking(true)
            .map_err(|e| IngestError::Io {
                source: e,
                context: "Setting listener non-blocking".to_string(),
            })?;

        self.local_port = listener.local_addr().ok().map(|addr| addr.port());
        info!(
            "TCP server listening on port {}",
            self.local_port.unwrap_or(port)
        );

        self.shared.set_state(ConnectionState::Listening);
        // Listening, but no peer yet.
        let _ = self
            .shared
            .event_tx
            .send(ReceiverEvent::ConnectionStatusChanged(false));

        let shared = self.shared.clone();
        let tick = self.tick_interval;
        self.worker = Some(thread::spawn(move || server_loop(listener, shared, tick)));
        Ok(())
    }

    /// Stop listening and drop any attached peer.
    pub fn stop_server(&mut self) {
        self.teardown();
        self.local_port = None;
        self.shared.set_state(ConnectionState::Idle);
        info!("TCP server stopped");
    }

    /// Dial out to `host:port` from the background worker.
    ///
    /// The caller is never blocked on the handshake; until the connected
    /// notification fires the receiver reads as not connected. Connect
    /// failure is surfaced on the event channel. An unparseable address is
    /// rejected immediately.
    pub fn connect_to_host(&mut self, host: &str, port: u16) -> Result<(), IngestError> {
        self.teardown();

        let addr = format!("{host}:{port}")
            .to_socket_addrs()
            .map_err(|_| IngestError::InvalidAddress(host.to_string()))?
            .next()
            .ok_or_else(|| IngestError::InvalidAddress(host.to_string()))?;

        info!("Connecting to {addr}");
        // Externally the pending handshake reads as Idle until the connected
        // notification fires; stale state from a prior session must not show.
        self.shared.set_state(ConnectionState::Idle);
        self.local_port = None;
        let shared = self.shared.clone();
        let tick = self.tick_interval;
        self.worker = Some(thread::spawn(move || client_loop(addr, shared, tick)));
        Ok(())
    }

    /// Drop the active connection (and worker). Idempotent. The sample queue
    /// keeps its contents; the partial-line buffer dies with the connection.
    pub fn disconnect(&mut self) {
        self.teardown();
    }

    /// Channel carrying [`ReceiverEvent`] notifications. Clonable; events go
    /// to whichever consumer receives first.
    pub fn events(&self) -> Receiver<ReceiverEvent> {
        self.event_rx.clone()
    }

    /// Non-destructive copy of the buffered samples, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.shared.queue.snapshot()
    }

    /// Empty the sample queue. The consumer calls this after processing a
    /// snapshot to avoid re-observing the same samples.
    pub fn clear(&self) {
        self.shared.queue.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Port the server socket is actually bound to, if listening.
    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Re-enable the new-data tick after an explicit `stop_receiving`.
    /// Receiving starts automatically when a connection is established.
    pub fn start_receiving(&self) {
        if !self.shared.receiving.swap(true, Ordering::Relaxed) {
            debug!("Started receiving data");
        }
    }

    /// Suspend new-data notifications without touching the connection.
    pub fn stop_receiving(&self) {
        if self.shared.receiving.swap(false, Ordering::Relaxed) {
            debug!("Stopped receiving data");
        }
    }

    /// Stop the worker thread and wait for it to exit. Bounded: every wait
    /// inside the worker loop is no longer than the poll interval or the
    /// connect timeout.
    fn teardown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("Receiver worker panicked during teardown");
            }
        }
        self.shared.shutdown.store(false, Ordering::Relaxed);
    }
}

impl Default for DataReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DataReceiver {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// An accepted or established peer stream plus its private decoder.
struct Connection {
    stream: TcpStream,
    decoder: LineDecoder,
}

enum ConnStatus {
    Open,
    Closed,
    Errored(String),
}

/// Drain everything currently readable from the peer into the queue.
fn service_connection(conn: &mut Connection, shared: &Shared, buf: &mut [u8]) -> ConnStatus {
    loop {
        match conn.stream.read(buf) {
            Ok(0) => return ConnStatus::Closed,
            Ok(n) => {
                let samples = conn.decoder.feed(&buf[..n]);
                if !samples.is_empty() {
                    shared.queue.extend(samples);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return ConnStatus::Open,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return ConnStatus::Errored(format!("Socket error: {e}")),
        }
    }
}

/// Fire the coalesced new-data notification when due.
fn run_tick(shared: &Shared, next_tick: &mut Instant, tick: Duration) {
    let now = Instant::now();
    if now < *next_tick {
        return;
    }
    while *next_tick <= now {
        *next_tick += tick;
    }
    if shared.receiving.load(Ordering::Relaxed) && !shared.queue.is_empty() {
        let _ = shared.event_tx.send(ReceiverEvent::NewDataAvailable);
    }
}

fn close_connection(conn: Connection, shared: &Shared, reason: &str) {
    debug!("Connection closed ({reason})");
    drop(conn);
    shared.set_connected(false);
}

/// Track whether an accept failure is new or a repeat of the last one. A
/// persistent failure polls every couple of milliseconds; emitting it once
/// keeps the event channel from flooding with duplicates.
fn is_new_accept_error(last: &mut Option<String>, message: &str) -> bool {
    if last.as_deref() == Some(message) {
        return false;
    }
    *last = Some(message.to_string());
    true
}

/// Server-role worker: non-blocking accept plus servicing of the one active
/// peer. A second inbound peer replaces the current one.
fn server_loop(listener: TcpListener, shared: Arc<Shared>, tick: Duration) {
    let mut conn: Option<Connection> = None;
    let mut buf = [0u8; 4096];
    let mut next_tick = Instant::now() + tick;
    let mut last_accept_error: Option<String> = None;

    while !shared.shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                last_accept_error = None;
                if let Err(e) = stream.set_nonblocking(true) {
                    shared.emit_error(format!("Failed to configure client socket: {e}"));
                } else {
                    if conn.is_some() {
                        // Last writer wins: the newest peer takes over.
                        info!("Replacing active client with {peer}");
                    } else {
                        info!("Client connected: {peer}");
                    }
                    conn = Some(Connection {
                        stream,
                        decoder: LineDecoder::new(),
                    });
                    shared.set_connected(true);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                let message = format!("Accept failed: {e}");
                if is_new_accept_error(&mut last_accept_error, &message) {
                    shared.emit_error(message);
                }
            }
        }

        if let Some(active) = conn.as_mut() {
            match service_connection(active, &shared, &mut buf) {
                ConnStatus::Open => {}
                ConnStatus::Closed => {
                    close_connection(conn.take().unwrap(), &shared, "peer closed");
                }
                ConnStatus::Errored(message) => {
                    shared.emit_error(message);
                    close_connection(conn.take().unwrap(), &shared, "socket error");
                }
            }
        }

        run_tick(&shared, &mut next_tick, tick);
        thread::sleep(POLL_INTERVAL);
    }

    if conn.is_some() {
        shared.set_connected(false);
    }
    debug!("Server worker exiting");
}

/// Client-role worker: one outbound connection, serviced until it closes or
/// the receiver is torn down.
fn client_loop(addr: SocketAddr, shared: Arc<Shared>, tick: Duration) {
    let stream = match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
        Ok(stream) => stream,
        Err(e) => {
            // Errors are terminal for the attempt, not the receiver: surface
            // the detail, then settle in Disconnected.
            shared.emit_error(format!("Failed to connect to {addr}: {e}"));
            shared.set_connected(false);
            return;
        }
    };
    if let Err(e) = stream.set_nonblocking(true) {
        shared.emit_error(format!("Failed to configure socket: {e}"));
        shared.set_connected(false);
        return;
    }

    info!("Connected to {addr}");
    shared.set_connected(true);

    let mut conn = Connection {
        stream,
        decoder: LineDecoder::new(),
    };
    let mut buf = [0u8; 4096];
    let mut next_tick = Instant::now() + tick;

    while !shared.shutdown.load(Ordering::Relaxed) {
        match service_connection(&mut conn, &shared, &mut buf) {
            ConnStatus::Open => {}
            ConnStatus::Closed => {
                close_connection(conn, &shared, "peer closed");
                return;
            }
            ConnStatus::Errored(message) => {
                shared.emit_error(message);
                close_connection(conn, &shared, "socket error");
                return;
            }
        }

        run_tick(&shared, &mut next_tick, tick);
        thread::sleep(POLL_INTERVAL);
    }

    shared.set_connected(false);
    debug!("Client worker exiting");
}
