//! Audio subsystem: device endpoints, normalization, framing, capture

pub mod capture;
pub mod device;
pub mod format;
pub mod frame;
pub mod synth;

pub use capture::{CaptureSession, CaptureState};
pub use format::{NativeBuffer, NativeFormat, Normalizer, SampleFormat};
pub use frame::{Frame, FrameAssembler, FrameRing, SharedFrameRing};
