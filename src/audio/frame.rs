//! Fixed-size PCM frames and the assembler that produces them
//!
//! Devices deliver buffers of arbitrary size at irregular intervals; the
//! wire carries exactly [`FRAME_SAMPLES`] samples per frame. The
//! [`FrameAssembler`] bridges the two, and the [`FrameRing`] is the single
//! cross-thread hand-off between a capture session and its transport.

use crossbeam::queue::ArrayQueue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::constants::{FRAME_BYTES, FRAME_SAMPLES};

/// An immutable frame of canonical PCM: exactly [`FRAME_SAMPLES`] mono
/// 16-bit samples (20 ms at 48 kHz).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    samples: Vec<i16>,
}

impl Frame {
    /// Build a frame from exactly [`FRAME_SAMPLES`] samples.
    ///
    /// Returns `None` for any other length; partial frames must never
    /// exist, let alone reach the wire.
    pub fn from_samples(samples: Vec<i16>) -> Option<Self> {
        if samples.len() == FRAME_SAMPLES {
            Some(Self { samples })
        } else {
            None
        }
    }

    /// A frame of pure silence.
    pub fn silence() -> Self {
        Self {
            samples: vec![0; FRAME_SAMPLES],
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Wire representation: [`FRAME_BYTES`] bytes, samples little-endian.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_BYTES);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    /// Parse a frame from its wire representation.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FRAME_BYTES {
            return None;
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Some(Self { samples })
    }
}

/// Accumulates normalized samples and slices off full frames.
///
/// Leftover samples (fewer than [`FRAME_SAMPLES`]) stay buffered until more
/// data arrives; a short frame is never emitted.
#[derive(Default)]
pub struct FrameAssembler {
    pending: VecDeque<i16>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a normalized buffer to the accumulator.
    pub fn push(&mut self, samples: &[i16]) {
        self.pending.extend(samples.iter().copied());
    }

    /// Slice one full frame off the front, if available.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.pending.len() < FRAME_SAMPLES {
            return None;
        }
        let samples: Vec<i16> = self.pending.drain(..FRAME_SAMPLES).collect();
        Frame::from_samples(samples)
    }

    /// Samples currently buffered short of a full frame boundary.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Bounded SPSC queue of assembled frames.
///
/// Written by one capture session, drained by one transport. While no
/// client is connected the transport does not drain, so the ring caps
/// memory by discarding the oldest frame on overflow.
pub struct FrameRing {
    queue: ArrayQueue<Frame>,
    discarded: AtomicUsize,
}

impl FrameRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            discarded: AtomicUsize::new(0),
        }
    }

    /// Push a frame, discarding the oldest buffered frame when full.
    pub fn push(&self, frame: Frame) {
        let mut frame = frame;
        while let Err(rejected) = self.queue.push(frame) {
            let _ = self.queue.pop();
            self.discarded.fetch_add(1, Ordering::Relaxed);
            frame = rejected;
        }
    }

    pub fn pop(&self) -> Option<Frame> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Frames dropped because no consumer drained the ring in time.
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a frame ring
pub type SharedFrameRing = Arc<FrameRing>;

/// Create a new shared frame ring
pub fn create_shared_ring(capacity: usize) -> SharedFrameRing {
    Arc::new(FrameRing::new(capacity))
}
