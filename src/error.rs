//! Error types for the audio engine

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// Capture subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Capture session failed: {0}")]
    SessionFailed(String),
}

/// Engine-side transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Socket bind failed on {addr}: {source}")]
    BindFailed {
        addr: String,
        source: std::io::Error,
    },

    #[error("Accept failed: {0}")]
    AcceptFailed(String),
}

/// Engine process lifecycle errors
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Failed to spawn engine process: {0}")]
    SpawnFailed(String),

    #[error("Engine exited early with code {0:?}")]
    ExitedEarly(Option<i32>),

    #[error("Engine not ready within {0:?}")]
    NotReady(std::time::Duration),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
