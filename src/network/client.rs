//! Consumer-side stream client
//!
//! Connects to one channel, reads the unframed byte stream in exact
//! frame-sized units, and exposes health and throughput to pollers.
//! Failures are state, not panics: the reader retries with bounded
//! backoff and anything asking for status always gets an answer
//! immediately.

use crossbeam_channel::Sender;
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::frame::Frame;
use crate::cancel::CancelToken;
use crate::config::ChannelRole;
use crate::constants::FRAME_BYTES;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Read timeout per recv; also the cancellation observation interval
/// while the socket is idle.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A peer that went quiet mid-frame for this long is treated as dead and
/// the partial frame abandoned (counted as a drop).
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection state machine, in order of progress.
///
/// `Streaming` is reached only after at least one complete frame has been
/// read; a connection that opens but never yields a frame stays
/// `Connected`, which is the operator's signal for "connected but protocol
/// broken" as opposed to "not connected".
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    NotStarted,
    Connecting,
    Connected,
    Streaming,
    Disconnected,
}

struct ClientShared {
    state: parking_lot::Mutex<ConnectionState>,
    bytes_received: AtomicU64,
    frames_received: AtomicU64,
    /// Reads abandoned mid-frame (peer closed or stalled)
    drops: AtomicU64,
    last_error: parking_lot::Mutex<String>,
    last_frame_at: parking_lot::Mutex<Option<Instant>>,
}

impl ClientShared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    fn record_error(&self, message: impl Into<String>) {
        *self.last_error.lock() = message.into();
    }
}

/// Bounded reconnect backoff: 100 ms doubling to a 2 s ceiling.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(2),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let scaled = self
            .initial
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        scaled.min(self.max)
    }
}

/// Read-only view of a client's counters, safe to poll from any thread.
#[derive(Clone)]
pub struct ClientStatusHandle {
    role: ChannelRole,
    shared: Arc<ClientShared>,
}

impl ClientStatusHandle {
    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Streaming
        )
    }

    /// True only after at least one complete frame has been read.
    pub fn streaming(&self) -> bool {
        self.state() == ConnectionState::Streaming
    }

    pub fn bytes_received(&self) -> u64 {
        self.shared.bytes_received.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.shared.frames_received.load(Ordering::Relaxed)
    }

    pub fn drops(&self) -> u64 {
        self.shared.drops.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> String {
        self.shared.last_error.lock().clone()
    }

    /// Age of the most recent complete frame, if any.
    pub fn last_frame_age(&self) -> Option<Duration> {
        self.shared.last_frame_at.lock().map(|at| at.elapsed())
    }
}

/// A reader for one channel's byte stream, running on its own thread.
pub struct StreamClient {
    handle: ClientStatusHandle,
    thread: Option<JoinHandle<()>>,
}

impl StreamClient {
    /// Start a reader for `role` at `addr`. Completed frames are offered to
    /// `sink` without blocking (a full sink drops the frame; counters keep
    /// the truth). Pass `None` to consume for telemetry only.
    pub fn connect(
        role: ChannelRole,
        addr: SocketAddr,
        cancel: CancelToken,
        sink: Option<Sender<Frame>>,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(ClientShared {
            state: parking_lot::Mutex::new(ConnectionState::NotStarted),
            bytes_received: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            drops: AtomicU64::new(0),
            last_error: parking_lot::Mutex::new(String::new()),
            last_frame_at: parking_lot::Mutex::new(None),
        });

        let thread_shared = shared.clone();
        let thread = thread::Builder::new()
            .name(format!("client-{}", role.label()))
            .spawn(move || {
                reader_loop(role, addr, cancel, thread_shared, sink);
            })?;

        Ok(Self {
            handle: ClientStatusHandle { role, shared },
            thread: Some(thread),
        })
    }

    pub fn status_handle(&self) -> ClientStatusHandle {
        self.handle.clone()
    }

    pub fn role(&self) -> ChannelRole {
        self.handle.role
    }

    /// Wait for the reader thread to exit. Call after cancelling.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.join();
    }
}

fn reader_loop(
    role: ChannelRole,
    addr: SocketAddr,
    cancel: CancelToken,
    shared: Arc<ClientShared>,
    sink: Option<Sender<Frame>>,
) {
    let backoff = BackoffPolicy::default();
    let mut attempt: u32 = 0;

    while !cancel.is_cancelled() {
        shared.set_state(ConnectionState::Connecting);

        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                attempt = 0;
                shared.record_error("");
                shared.set_state(ConnectionState::Connected);
                tracing::info!(role = %role, addr = %addr, "connected");

                read_stream(role, stream, &cancel, &shared, sink.as_ref());

                if cancel.is_cancelled() {
                    break;
                }
                shared.set_state(ConnectionState::Disconnected);
                tracing::info!(role = %role, "disconnected, will reconnect");
            }
            Err(e) => {
                shared.record_error(format!("connect failed: {}", e));
                let delay = backoff.delay(attempt);
                attempt = attempt.saturating_add(1);
                tracing::debug!(role = %role, error = %e, ?delay, "connect failed, backing off");
                if !cancel.sleep(delay) {
                    break;
                }
            }
        }
    }
    shared.set_state(ConnectionState::Disconnected);
    tracing::info!(role = %role, "client stopped");
}

/// Read the unframed stream in exact [`FRAME_BYTES`] units.
///
/// The transport sends fixed-size frames back-to-back with no header and
/// no length prefix, so alignment is purely positional: accumulate bytes
/// until exactly one frame is filled, then start the next. Any other
/// framing here would stall the pipeline against the real transport.
fn read_stream(
    role: ChannelRole,
    mut stream: TcpStream,
    cancel: &CancelToken,
    shared: &ClientShared,
    sink: Option<&Sender<Frame>>,
) {
    if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        shared.record_error(format!("socket setup failed: {}", e));
        return;
    }

    let mut buf = vec![0u8; FRAME_BYTES];
    let mut filled = 0usize;
    let mut stalled_since: Option<Instant> = None;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled > 0 {
                    shared.drops.fetch_add(1, Ordering::Relaxed);
                }
                shared.record_error("stream closed by engine".to_string());
                return;
            }
            Ok(n) => {
                stalled_since = None;
                filled += n;
                shared.bytes_received.fetch_add(n as u64, Ordering::Relaxed);

                if filled == FRAME_BYTES {
                    filled = 0;
                    shared.frames_received.fetch_add(1, Ordering::Relaxed);
                    *shared.last_frame_at.lock() = Some(Instant::now());
                    shared.set_state(ConnectionState::Streaming);

                    if let Some(sink) = sink {
                        if let Some(frame) = Frame::from_le_bytes(&buf) {
                            // Non-blocking: a slow consumer loses frames,
                            // never stalls the reader.
                            let _ = sink.try_send(frame);
                        }
                    }
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Idle is fine; quiet mid-frame for too long is not.
                if filled > 0 {
                    let since = *stalled_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= STALL_TIMEOUT {
                        shared.drops.fetch_add(1, Ordering::Relaxed);
                        shared.record_error("peer stalled mid-frame".to_string());
                        tracing::warn!(role = %role, "peer stalled mid-frame, reconnecting");
                        return;
                    }
                }
            }
            Err(e) => {
                if filled > 0 {
                    shared.drops.fetch_add(1, Ordering::Relaxed);
                }
                shared.record_error(format!("recv failed: {}", e));
                return;
            }
        }
    }
}
