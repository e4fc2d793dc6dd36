//! Engine-side stream transport
//!
//! One listener per channel, serving exactly one client at a time as an
//! explicit state machine: `Listening -> Serving(client) -> Listening`.
//! A second connection attempt waits in the accept backlog until the
//! current client disconnects (accept-serially policy).

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::frame::SharedFrameRing;
use crate::cancel::CancelToken;
use crate::config::ChannelRole;
use crate::constants::FRAME_INTERVAL;
use crate::error::TransportError;

/// How often the serve loop polls the non-blocking listener.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Transport state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    /// Waiting for a client
    Listening,
    /// Streaming to the single accepted client
    Serving,
    /// Shut down via cancellation
    Stopped,
}

struct TransportShared {
    state: parking_lot::Mutex<TransportState>,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    clients_served: AtomicU64,
}

/// A running transport for one channel.
pub struct StreamTransport {
    role: ChannelRole,
    local_addr: SocketAddr,
    shared: Arc<TransportShared>,
    thread: Option<JoinHandle<()>>,
}

impl StreamTransport {
    /// Bind the channel listener and start serving frames from `ring`.
    ///
    /// Binding happens on the caller's thread so a port conflict surfaces
    /// as an immediate error rather than a dead background thread.
    pub fn bind(
        role: ChannelRole,
        addr: SocketAddr,
        ring: SharedFrameRing,
        cancel: CancelToken,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::BindFailed {
            addr: addr.to_string(),
            source: e,
        })?;
        // Non-blocking accept lets the serve loop observe cancellation
        // between polls instead of parking in accept().
        listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::AcceptFailed(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::AcceptFailed(e.to_string()))?;

        let shared = Arc::new(TransportShared {
            state: parking_lot::Mutex::new(TransportState::Listening),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            clients_served: AtomicU64::new(0),
        });

        let thread_shared = shared.clone();
        let thread = thread::Builder::new()
            .name(format!("transport-{}", role.label()))
            .spawn(move || {
                serve_loop(role, listener, ring, cancel, thread_shared);
            })
            .map_err(|e| TransportError::AcceptFailed(e.to_string()))?;

        tracing::info!(role = %role, addr = %local_addr, "transport listening");

        Ok(Self {
            role,
            local_addr,
            shared,
            thread: Some(thread),
        })
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    /// Actual bound address (useful when binding port 0 in tests).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> TransportState {
        self.shared.state.lock().clone()
    }

    pub fn frames_sent(&self) -> u64 {
        self.shared.frames_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.shared.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn clients_served(&self) -> u64 {
        self.shared.clients_served.load(Ordering::Relaxed)
    }

    /// Wait for the transport thread to exit. Call after cancelling.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.join();
    }
}

fn serve_loop(
    role: ChannelRole,
    listener: TcpListener,
    ring: SharedFrameRing,
    cancel: CancelToken,
    shared: Arc<TransportShared>,
) {
    while !cancel.is_cancelled() {
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::info!(role = %role, peer = %peer, "client connected");
                shared.clients_served.fetch_add(1, Ordering::Relaxed);
                *shared.state.lock() = TransportState::Serving;

                serve_client(role, stream, &ring, &cancel, &shared);

                *shared.state.lock() = TransportState::Listening;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                // Accept failures are recovered locally; keep listening.
                tracing::warn!(role = %role, error = %e, "accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    *shared.state.lock() = TransportState::Stopped;
    tracing::info!(role = %role, "transport stopped");
}

/// Stream frames to one client until it disconnects or we shut down.
///
/// Pacing uses a monotonic deadline advanced by exactly one frame period
/// per iteration; jitter in send or pop time does not accumulate.
fn serve_client(
    role: ChannelRole,
    mut stream: TcpStream,
    ring: &SharedFrameRing,
    cancel: &CancelToken,
    shared: &TransportShared,
) {
    if let Err(e) = stream.set_nonblocking(false) {
        tracing::warn!(role = %role, error = %e, "failed to configure client socket");
        return;
    }
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(role = %role, error = %e, "failed to set TCP_NODELAY");
    }

    let mut deadline = Instant::now();
    loop {
        if let Some(frame) = ring.pop() {
            let bytes = frame.to_le_bytes();
            // write_all retries partial writes until the frame is on the wire.
            if let Err(e) = stream.write_all(&bytes) {
                tracing::info!(role = %role, error = %e, "client disconnected");
                return;
            }
            shared.frames_sent.fetch_add(1, Ordering::Relaxed);
            shared
                .bytes_sent
                .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        }

        deadline += FRAME_INTERVAL;
        if !cancel.sleep_until(deadline) {
            return;
        }
    }
}
