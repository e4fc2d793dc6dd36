//! Engine process lifecycle
//!
//! The external controller's handle on the capture binary: spawn it with
//! the channel ports as arguments, watch its output, probe readiness,
//! and stop it gracefully with a forced kill after a grace period.

use parking_lot::Mutex;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{EngineConfig, SourceKind};
use crate::error::ControlError;
use crate::status::ProcessState;

/// Longest log line kept in the status fields.
const LOG_LINE_LIMIT: usize = 400;

const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(200);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Point-in-time view of the engine process.
#[derive(Debug, Clone)]
pub struct ProcessStatus {
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub last_log: String,
    pub last_err: String,
}

/// A spawned engine process.
///
/// All methods are non-blocking except [`EngineProcess::wait_ready`] and
/// [`EngineProcess::stop`], which are bounded by their timeout arguments.
pub struct EngineProcess {
    child: Mutex<Option<Child>>,
    pid: u32,
    ready: AtomicBool,
    stop_requested: AtomicBool,
    /// Terminal state recorded once the child has been reaped. Fixed at
    /// reap time: a crash observed before any stop request stays a crash.
    exit_state: Mutex<Option<ProcessState>>,
    last_log: Arc<Mutex<String>>,
    last_err: Arc<Mutex<String>>,
    host: String,
    mic_port: u16,
    loopback_port: u16,
}

impl EngineProcess {
    /// Spawn the engine binary at `program` with `config`'s host, ports
    /// and source kind as arguments.
    pub fn spawn(program: impl AsRef<OsStr>, config: &EngineConfig) -> Result<Self, ControlError> {
        let mut command = Command::new(program);
        command
            .arg("--host")
            .arg(&config.host)
            .arg("--mic-port")
            .arg(config.mic_port.to_string())
            .arg("--loop-port")
            .arg(config.loopback_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if config.source == SourceKind::SyntheticTone {
            command.arg("--synth");
        }

        let mut child = command
            .spawn()
            .map_err(|e| ControlError::SpawnFailed(e.to_string()))?;
        let pid = child.id();

        let last_log = Arc::new(Mutex::new(String::new()));
        let last_err = Arc::new(Mutex::new(String::new()));
        if let Some(stdout) = child.stdout.take() {
            spawn_stdout_reader(stdout, last_log.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_reader(stderr, last_err.clone());
        }

        tracing::info!(pid, mic_port = config.mic_port, loopback_port = config.loopback_port,
            "engine process spawned");

        Ok(Self {
            child: Mutex::new(Some(child)),
            pid,
            ready: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            exit_state: Mutex::new(None),
            last_log,
            last_err,
            host: config.host.clone(),
            mic_port: config.mic_port,
            loopback_port: config.loopback_port,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Current lifecycle state; reaps the child if it has exited.
    pub fn state(&self) -> ProcessState {
        if let Some(state) = self.exit_state.lock().clone() {
            return state;
        }

        let mut guard = self.child.lock();
        let Some(child) = guard.as_mut() else {
            return ProcessState::NotStarted;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                let state = self.exited_state(status.code());
                *self.exit_state.lock() = Some(state.clone());
                *guard = None;
                state
            }
            Ok(None) => {
                if self.ready.load(Ordering::SeqCst) {
                    ProcessState::Running
                } else {
                    ProcessState::Starting
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "try_wait failed");
                ProcessState::Crashed { exit_code: None }
            }
        }
    }

    fn exited_state(&self, exit_code: Option<i32>) -> ProcessState {
        if self.stop_requested.load(Ordering::SeqCst) {
            ProcessState::Stopped
        } else {
            ProcessState::Crashed { exit_code }
        }
    }

    /// Block until the engine is running and both channel ports accept a
    /// connection, or `timeout` elapses.
    pub fn wait_ready(&self, timeout: Duration) -> Result<(), ControlError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let ProcessState::Crashed { exit_code } = self.state() {
                return Err(ControlError::ExitedEarly(exit_code));
            }

            if self.can_connect(self.mic_port) && self.can_connect(self.loopback_port) {
                self.ready.store(true, Ordering::SeqCst);
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(ControlError::NotReady(timeout));
            }
            thread::sleep(READY_POLL_INTERVAL);
        }
    }

    fn can_connect(&self, port: u16) -> bool {
        format!("{}:{}", self.host, port)
            .parse()
            .ok()
            .and_then(|addr| TcpStream::connect_timeout(&addr, PORT_PROBE_TIMEOUT).ok())
            .is_some()
    }

    /// Request graceful shutdown, force-terminating after `grace`.
    pub fn stop(&self, grace: Duration) {
        // Reap before requesting anything: a process that already exited
        // on its own keeps reporting a crash, not a stop.
        if !matches!(
            self.state(),
            ProcessState::Starting | ProcessState::Running
        ) {
            return;
        }
        self.stop_requested.store(true, Ordering::SeqCst);

        // Graceful first: SIGTERM where the platform has it.
        #[cfg(unix)]
        {
            unsafe {
                libc::kill(self.pid as libc::pid_t, libc::SIGTERM);
            }
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !matches!(
                self.state(),
                ProcessState::Starting | ProcessState::Running
            ) {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }

        let mut guard = self.child.lock();
        if let Some(child) = guard.as_mut() {
            tracing::warn!(pid = self.pid, "engine did not exit in time, killing");
            let _ = child.kill();
            let code = child.wait().ok().and_then(|status| status.code());
            *self.exit_state.lock() = Some(self.exited_state(code));
            *guard = None;
        }
    }

    pub fn status(&self) -> ProcessStatus {
        ProcessStatus {
            state: self.state(),
            pid: Some(self.pid),
            last_log: self.last_log.lock().clone(),
            last_err: self.last_err.lock().clone(),
        }
    }
}

fn truncate_line(line: &str) -> &str {
    let end = line
        .char_indices()
        .nth(LOG_LINE_LIMIT)
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    &line[..end]
}

fn spawn_stdout_reader(stdout: ChildStdout, last_log: Arc<Mutex<String>>) {
    let _ = thread::Builder::new()
        .name("engine-stdout".to_string())
        .spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(|l| l.ok()) {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(target: "engine_output", "{}", line);
                *last_log.lock() = truncate_line(line).to_string();
            }
        });
}

fn spawn_stderr_reader(stderr: ChildStderr, last_err: Arc<Mutex<String>>) {
    let _ = thread::Builder::new()
        .name("engine-stderr".to_string())
        .spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(target: "engine_output", "{}", line);
                *last_err.lock() = truncate_line(line).to_string();
            }
        });
}
