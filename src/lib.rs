//! # Dual Audio Engine
//!
//! Low-latency capture of two independent live audio sources (microphone and
//! system loopback) delivered as canonical PCM byte streams over local TCP.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ENGINE PROCESS                           │
//! │                                                                  │
//! │  ┌──────────────┐                    ┌──────────────┐            │
//! │  │  Microphone  │                    │ Render device│            │
//! │  │  (capture)   │                    │  (loopback)  │            │
//! │  └──────┬───────┘                    └──────┬───────┘            │
//! │         │ native buffers (f32/i16, N ch)    │                    │
//! │         ▼                                   ▼                    │
//! │  ┌──────────────┐                    ┌──────────────┐            │
//! │  │  Normalizer  │ 48 kHz mono s16le  │  Normalizer  │            │
//! │  └──────┬───────┘                    └──────┬───────┘            │
//! │         ▼                                   ▼                    │
//! │  ┌──────────────┐                    ┌──────────────┐            │
//! │  │   Assembler  │ 960-sample frames  │   Assembler  │            │
//! │  └──────┬───────┘                    └──────┬───────┘            │
//! │         ▼ bounded ring                      ▼ bounded ring       │
//! │  ┌──────────────┐                    ┌──────────────┐            │
//! │  │  Transport   │ 20 ms pacing       │  Transport   │            │
//! │  │ 127.0.0.1:A  │                    │ 127.0.0.1:B  │            │
//! │  └──────┬───────┘                    └──────┬───────┘            │
//! └─────────┼───────────────────────────────────┼────────────────────┘
//!           │ raw 1920-byte frames, no framing  │
//!           ▼                                   ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       CONSUMER PROCESS                           │
//! │  ┌──────────────┐                    ┌──────────────┐            │
//! │  │ StreamClient │                    │ StreamClient │            │
//! │  └──────┬───────┘                    └──────┬───────┘            │
//! │         └───────────────┬───────────────────┘                    │
//! │                         ▼                                        │
//! │                ┌─────────────────┐                               │
//! │                │ StatusAggregator│──▶ JSON snapshot              │
//! │                └─────────────────┘                               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The wire protocol is deliberately headerless: fixed-size frames sent
//! back-to-back with no length prefix and no delimiter. Both sides of that
//! contract live in this crate ([`network::transport`] and
//! [`network::client`]) and must only ever be changed together.

pub mod audio;
pub mod cancel;
pub mod config;
pub mod control;
pub mod diagnostic;
pub mod engine;
pub mod error;
pub mod network;
pub mod status;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Canonical sample rate for the wire format
    pub const SAMPLE_RATE: u32 = 48_000;

    /// Canonical channel count (mono)
    pub const CHANNELS: u16 = 1;

    /// Samples per frame (20 ms at 48 kHz)
    pub const FRAME_SAMPLES: usize = 960;

    /// Bytes per frame on the wire (s16le)
    pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

    /// Wall-clock duration of one frame
    pub const FRAME_INTERVAL: Duration = Duration::from_millis(20);

    /// Default TCP port for the microphone channel
    pub const DEFAULT_MIC_PORT: u16 = 17711;

    /// Default TCP port for the loopback channel
    pub const DEFAULT_LOOPBACK_PORT: u16 = 17712;

    /// Default bind/connect host (loopback address only, by design)
    pub const DEFAULT_HOST: &str = "127.0.0.1";

    /// Frames buffered between capture and transport while no client is
    /// connected: 150 frames = 3 seconds of audio. Beyond this the oldest
    /// frames are discarded.
    pub const FRAME_RING_CAPACITY: usize = 150;
}
