//! Status aggregation
//!
//! Merges process lifecycle, per-channel client counters and capture-side
//! health into one snapshot. Pure read-and-merge: every field comes from
//! atomics or short-lived locks owned by the components themselves, so a
//! poller never waits on the pipeline and a stuck engine shows up as a
//! stale or crashed state rather than a hang.

use serde::Serialize;
use std::sync::Arc;

use crate::config::ChannelRole;
use crate::control::EngineProcess;
use crate::network::client::ClientStatusHandle;

/// External controller's view of the engine process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running,
    Stopped,
    Crashed { exit_code: Option<i32> },
}

/// Externally visible state of one channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    pub role: ChannelRole,
    pub connected: bool,
    pub bytes_transferred: u64,
    pub last_error: String,
    /// True only after at least one full frame has been received.
    /// `connected && !streaming` over time is the protocol-misalignment
    /// signal.
    pub streaming: bool,
}

/// One consistent, non-blocking snapshot of the whole system.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub process: ProcessState,
    pub last_log: String,
    pub last_err: String,
    pub channels: Vec<ChannelStatus>,
}

/// Combines an optional engine process handle with per-channel client
/// handles. Holds only cheap cloneable views; safe to snapshot from any
/// thread at any time.
#[derive(Default)]
pub struct StatusAggregator {
    process: Option<Arc<EngineProcess>>,
    clients: Vec<ClientStatusHandle>,
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(mut self, process: Arc<EngineProcess>) -> Self {
        self.process = Some(process);
        self
    }

    pub fn with_client(mut self, client: ClientStatusHandle) -> Self {
        self.clients.push(client);
        self
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let (process, last_log, last_err) = match &self.process {
            Some(p) => {
                let status = p.status();
                (status.state, status.last_log, status.last_err)
            }
            None => (ProcessState::NotStarted, String::new(), String::new()),
        };

        let channels = self
            .clients
            .iter()
            .map(|client| ChannelStatus {
                role: client.role(),
                connected: client.connected(),
                bytes_transferred: client.bytes_received(),
                last_error: client.last_error(),
                streaming: client.streaming(),
            })
            .collect();

        StatusSnapshot {
            process,
            last_log,
            last_err,
            channels,
        }
    }
}
