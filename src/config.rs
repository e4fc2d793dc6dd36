//! Engine configuration
//!
//! Defaults match the well-known ports of the original deployment. A TOML
//! file may override them; CLI flags override both.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::constants::{DEFAULT_HOST, DEFAULT_LOOPBACK_PORT, DEFAULT_MIC_PORT, FRAME_RING_CAPACITY};
use crate::error::{Error, Result};

/// Which logical audio source a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    /// Default capture endpoint (microphone input)
    Microphone,
    /// Default render endpoint opened in capture-loopback mode
    Loopback,
}

impl ChannelRole {
    pub const ALL: [ChannelRole; 2] = [ChannelRole::Microphone, ChannelRole::Loopback];

    /// Short label used in thread names and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            ChannelRole::Microphone => "mic",
            ChannelRole::Loopback => "loop",
        }
    }
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a channel's samples come from.
///
/// `SyntheticTone` is an explicit test mode: it is never substituted
/// silently when a real device fails, and its selection is logged with a
/// warning at capture start so a test tone cannot be mistaken for live
/// audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Real device capture (production default)
    #[default]
    Device,
    /// Deterministic sine generator at real-time rate
    SyntheticTone,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bind host for both listeners. Loopback address by design; the
    /// engine serves a local consumer only.
    pub host: String,

    /// TCP port for the microphone channel
    pub mic_port: u16,

    /// TCP port for the loopback channel
    pub loopback_port: u16,

    /// Sample source for both channels
    pub source: SourceKind,

    /// Frames buffered between capture and transport while no client is
    /// connected; oldest frames are discarded beyond this bound.
    pub ring_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            mic_port: DEFAULT_MIC_PORT,
            loopback_port: DEFAULT_LOOPBACK_PORT,
            source: SourceKind::default(),
            ring_capacity: FRAME_RING_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Port assigned to `role`.
    pub fn port(&self, role: ChannelRole) -> u16 {
        match role {
            ChannelRole::Microphone => self.mic_port,
            ChannelRole::Loopback => self.loopback_port,
        }
    }

    /// Socket address a channel's listener binds (and a client connects) to.
    pub fn channel_addr(&self, role: ChannelRole) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port(role))
            .parse()
            .map_err(|e| Error::Config(format!("invalid channel address: {}", e)))
    }

    /// Both channels must have distinct ports.
    pub fn validate(&self) -> Result<()> {
        if self.mic_port == self.loopback_port {
            return Err(Error::Config(format!(
                "mic and loopback channels share port {}",
                self.mic_port
            )));
        }
        if self.mic_port == 0 || self.loopback_port == 0 {
            return Err(Error::Config("channel ports must be non-zero".into()));
        }
        Ok(())
    }
}
