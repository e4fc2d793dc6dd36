//! Capture sessions
//!
//! One dedicated thread per channel role owns one audio endpoint and feeds
//! normalized, assembled frames into that channel's ring. The synthetic
//! tone source implements the same session surface so test mode and
//! production capture are interchangeable to the rest of the pipeline,
//! but never substituted for each other.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::device::Endpoint;
use crate::audio::format::{NativeBuffer, NativeFormat, Normalizer, SampleFormat};
use crate::audio::frame::{FrameAssembler, SharedFrameRing};
use crate::audio::synth::ToneGenerator;
use crate::cancel::CancelToken;
use crate::config::{ChannelRole, SourceKind};
use crate::constants::{FRAME_INTERVAL, SAMPLE_RATE};
use crate::error::AudioError;

/// Lifecycle of a capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    /// Session created, device not yet delivering
    Open,
    /// Device delivering buffers
    Running,
    /// Stopped cleanly via cancellation
    Stopped,
    /// Unrecoverable device error; the message is surfaced in status
    Failed(String),
}

struct SessionShared {
    state: parking_lot::Mutex<CaptureState>,
    samples_captured: AtomicU64,
}

/// A running capture session for one channel.
///
/// The session owns its device handle exclusively; dropping or joining the
/// session closes the device. It does not stop itself on transport
/// trouble; a disconnected consumer is the transport's problem.
pub struct CaptureSession {
    role: ChannelRole,
    shared: Arc<SessionShared>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureSession {
    /// Spawn the capture thread for `role`, producing into `ring` until
    /// `cancel` fires.
    pub fn spawn(
        role: ChannelRole,
        source: SourceKind,
        ring: SharedFrameRing,
        cancel: CancelToken,
    ) -> Result<Self, AudioError> {
        let shared = Arc::new(SessionShared {
            state: parking_lot::Mutex::new(CaptureState::Open),
            samples_captured: AtomicU64::new(0),
        });

        let thread_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(format!("capture-{}", role.label()))
            .spawn(move || {
                let result = match source {
                    SourceKind::Device => {
                        run_device_capture(role, &ring, &cancel, &thread_shared)
                    }
                    SourceKind::SyntheticTone => {
                        run_tone_capture(role, &ring, &cancel, &thread_shared)
                    }
                };
                let mut state = thread_shared.state.lock();
                match result {
                    Ok(()) => {
                        tracing::info!(role = %role, "capture session stopped");
                        *state = CaptureState::Stopped;
                    }
                    Err(e) => {
                        tracing::error!(role = %role, error = %e, "capture session failed");
                        *state = CaptureState::Failed(e.to_string());
                    }
                }
            })
            .map_err(|e| AudioError::SessionFailed(e.to_string()))?;

        Ok(Self {
            role,
            shared,
            thread: Some(handle),
        })
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn state(&self) -> CaptureState {
        self.shared.state.lock().clone()
    }

    pub fn samples_captured(&self) -> u64 {
        self.shared.samples_captured.load(Ordering::Relaxed)
    }

    /// Wait for the capture thread to exit. Call after cancelling.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_device_capture(
    role: ChannelRole,
    ring: &SharedFrameRing,
    cancel: &CancelToken,
    shared: &Arc<SessionShared>,
) -> Result<(), AudioError> {
    let endpoint = Endpoint::default_for_role(role)?;
    let reported = endpoint.native_format()?;
    tracing::info!(
        role = %role,
        device = %endpoint.name,
        format = %reported,
        "opened capture endpoint"
    );

    // Request the canonical rate from the backend; the device keeps its own
    // channel count and sample type, which the normalizer folds down. A
    // device that cannot run at 48 kHz fails the stream build and the
    // session with it; there is no resampling stage.
    let native = NativeFormat {
        sample_rate: SAMPLE_RATE,
        ..reported
    };
    let config = cpal::StreamConfig {
        channels: native.channels,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let (error_tx, error_rx) = bounded::<AudioError>(16);
    let stream = match native.sample_format {
        SampleFormat::F32 => build_stream::<f32>(
            &endpoint,
            &config,
            native,
            ring.clone(),
            shared.clone(),
            error_tx,
            |data| NativeBuffer::F32(data),
        )?,
        SampleFormat::I16 => build_stream::<i16>(
            &endpoint,
            &config,
            native,
            ring.clone(),
            shared.clone(),
            error_tx,
            |data| NativeBuffer::I16(data),
        )?,
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamError(e.to_string()))?;
    *shared.state.lock() = CaptureState::Running;
    tracing::info!(role = %role, "capture running");

    keepalive(cancel, &error_rx)
    // Stream drops here, closing the device.
}

/// Build a typed cpal input stream whose callback normalizes and assembles
/// into the channel ring.
fn build_stream<T>(
    endpoint: &Endpoint,
    config: &cpal::StreamConfig,
    native: NativeFormat,
    ring: SharedFrameRing,
    shared: Arc<SessionShared>,
    error_tx: Sender<AudioError>,
    to_buffer: fn(&[T]) -> NativeBuffer<'_>,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + Send + 'static,
{
    let normalizer = Normalizer::new(native)?;
    let mut assembler = FrameAssembler::new();
    let mut scratch: Vec<i16> = Vec::new();

    endpoint
        .inner()
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                normalizer.normalize(to_buffer(data), &mut scratch);
                shared
                    .samples_captured
                    .fetch_add(scratch.len() as u64, Ordering::Relaxed);
                assembler.push(&scratch);
                while let Some(frame) = assembler.next_frame() {
                    ring.push(frame);
                }
            },
            move |err| {
                let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}

/// Keep the session thread alive while the stream delivers via callbacks.
/// Buffers arriving empty is the backend's business; our only jobs here are
/// watching for stream errors and observing cancellation.
fn keepalive(cancel: &CancelToken, error_rx: &Receiver<AudioError>) -> Result<(), AudioError> {
    while !cancel.is_cancelled() {
        if let Ok(err) = error_rx.try_recv() {
            return Err(err);
        }
        thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}

/// Synthetic tone session: real-time paced, explicitly labelled test mode.
fn run_tone_capture(
    role: ChannelRole,
    ring: &SharedFrameRing,
    cancel: &CancelToken,
    shared: &Arc<SessionShared>,
) -> Result<(), AudioError> {
    tracing::warn!(
        role = %role,
        "SYNTHETIC TONE source active - this is a test mode, not live capture"
    );
    let mut generator = ToneGenerator::for_role(role);
    *shared.state.lock() = CaptureState::Running;

    let mut deadline = Instant::now();
    loop {
        let frame = generator.next_frame();
        shared
            .samples_captured
            .fetch_add(frame.samples().len() as u64, Ordering::Relaxed);
        ring.push(frame);

        deadline += FRAME_INTERVAL;
        if !cancel.sleep_until(deadline) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::create_shared_ring;
    use crate::constants::FRAME_SAMPLES;

    #[test]
    fn tone_session_produces_frames_then_stops() {
        let ring = create_shared_ring(32);
        let cancel = CancelToken::new();
        let mut session = CaptureSession::spawn(
            ChannelRole::Loopback,
            SourceKind::SyntheticTone,
            ring.clone(),
            cancel.clone(),
        )
        .unwrap();

        // Three frame periods is enough for at least one frame.
        thread::sleep(FRAME_INTERVAL * 3);
        assert!(!ring.is_empty());
        assert_eq!(session.state(), CaptureState::Running);

        cancel.cancel();
        session.join();
        assert_eq!(session.state(), CaptureState::Stopped);
        assert!(session.samples_captured() >= FRAME_SAMPLES as u64);
    }

    #[test]
    fn tone_session_frames_are_full_size() {
        let ring = create_shared_ring(8);
        let cancel = CancelToken::new();
        let mut session = CaptureSession::spawn(
            ChannelRole::Microphone,
            SourceKind::SyntheticTone,
            ring.clone(),
            cancel.clone(),
        )
        .unwrap();

        thread::sleep(FRAME_INTERVAL * 2);
        cancel.cancel();
        session.join();

        while let Some(frame) = ring.pop() {
            assert_eq!(frame.samples().len(), FRAME_SAMPLES);
        }
    }
}
