//! The engine: one capture-to-transport pipeline per channel
//!
//! Starts and stops the whole pipeline as a unit; there is no independent
//! lifecycle for sub-pieces. The two channels share nothing mutable
//! except the cancellation token.

use crate::audio::capture::{CaptureSession, CaptureState};
use crate::audio::frame::{create_shared_ring, SharedFrameRing};
use crate::cancel::CancelToken;
use crate::config::{ChannelRole, EngineConfig};
use crate::error::{Error, Result};
use crate::network::transport::{StreamTransport, TransportState};

/// One channel's pipeline: capture thread -> frame ring -> transport thread.
struct Channel {
    role: ChannelRole,
    ring: SharedFrameRing,
    capture: CaptureSession,
    transport: StreamTransport,
}

/// In-process health view of one channel, logged periodically by the
/// engine binary.
#[derive(Debug, Clone)]
pub struct ChannelHealth {
    pub role: ChannelRole,
    pub capture: CaptureState,
    pub transport: TransportState,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_buffered: usize,
    pub frames_discarded: usize,
}

/// The running engine.
pub struct Engine {
    cancel: CancelToken,
    channels: Vec<Channel>,
}

impl Engine {
    /// Validate `config`, bind both listeners, then start both capture
    /// sessions. Binding first means a port conflict fails startup before
    /// any device is touched.
    pub fn start(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let cancel = CancelToken::new();

        tracing::info!(
            mic_port = config.mic_port,
            loopback_port = config.loopback_port,
            source = ?config.source,
            "starting engine"
        );

        // On any failure the token must fire before the error propagates:
        // channels already built join their threads on drop, and those
        // threads run until cancelled. Without this a bind conflict on the
        // second channel would hang the caller in the first channel's drop.
        let fail = |e: Error| {
            cancel.cancel();
            e
        };

        let mut channels = Vec::with_capacity(ChannelRole::ALL.len());
        for role in ChannelRole::ALL {
            let ring = create_shared_ring(config.ring_capacity);
            let addr = config.channel_addr(role).map_err(&fail)?;
            let transport = StreamTransport::bind(role, addr, ring.clone(), cancel.clone())
                .map_err(|e| fail(e.into()))?;
            let capture = CaptureSession::spawn(role, config.source, ring.clone(), cancel.clone())
                .map_err(|e| fail(e.into()))?;
            channels.push(Channel {
                role,
                ring,
                capture,
                transport,
            });
        }

        Ok(Self { cancel, channels })
    }

    /// Token observed by every component; cancel it to stop the engine.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Per-channel health, assembled without blocking the pipeline.
    pub fn health(&self) -> Vec<ChannelHealth> {
        self.channels
            .iter()
            .map(|channel| ChannelHealth {
                role: channel.role,
                capture: channel.capture.state(),
                transport: channel.transport.state(),
                frames_sent: channel.transport.frames_sent(),
                bytes_sent: channel.transport.bytes_sent(),
                frames_buffered: channel.ring.len(),
                frames_discarded: channel.ring.discarded(),
            })
            .collect()
    }

    /// True while every capture session is still open or running.
    pub fn capture_healthy(&self) -> bool {
        self.channels
            .iter()
            .all(|c| !matches!(c.capture.state(), CaptureState::Failed(_)))
    }

    /// Cancel and join every thread. Completes within roughly one frame
    /// period, since all blocking boundaries observe the token.
    pub fn shutdown(mut self) {
        tracing::info!("engine shutting down");
        self.cancel.cancel();
        for channel in &mut self.channels {
            channel.capture.join();
            channel.transport.join();
        }
        tracing::info!("engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;
    use crate::constants::FRAME_INTERVAL;

    fn tone_config() -> EngineConfig {
        EngineConfig {
            mic_port: 0,
            loopback_port: 0,
            source: SourceKind::SyntheticTone,
            ..Default::default()
        }
    }

    #[test]
    fn zero_ports_rejected_by_validate() {
        assert!(Engine::start(tone_config()).is_err());
    }

    #[test]
    fn partial_startup_failure_returns_error_promptly() {
        // Occupy the loopback channel's port so the mic channel builds
        // first and the second bind fails. Startup must then return an
        // error instead of hanging on the mic channel's teardown.
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = blocker.local_addr().unwrap().port();
        let config = EngineConfig {
            mic_port: 39313,
            loopback_port: taken,
            ..tone_config()
        };

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(Engine::start(config).map(|engine| engine.shutdown()));
        });
        let result = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("start must return, not hang");
        assert!(result.is_err());
    }

    #[test]
    fn engine_starts_and_stops_with_tone_source() {
        // Distinct high ports, unlikely to collide with anything local.
        let config = EngineConfig {
            mic_port: 39311,
            loopback_port: 39312,
            ..tone_config()
        };
        let engine = Engine::start(config).unwrap();
        std::thread::sleep(FRAME_INTERVAL * 3);

        let health = engine.health();
        assert_eq!(health.len(), 2);
        assert!(engine.capture_healthy());
        assert!(health
            .iter()
            .all(|h| h.transport == TransportState::Listening));

        engine.shutdown();
    }
}
