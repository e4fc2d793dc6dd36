//! Deterministic synthetic signal generation
//!
//! Explicit test mode only: selected via [`crate::config::SourceKind`],
//! never substituted when a real device fails. Also backs the `--proof`
//! diagnostic mode.

use crate::audio::frame::Frame;
use crate::config::ChannelRole;
use crate::constants::{FRAME_SAMPLES, SAMPLE_RATE};

/// Peak amplitude of generated tones (about -10 dBFS)
pub const TONE_AMPLITUDE: f64 = 10_000.0;

/// Per-role tone frequency, so the two channels are distinguishable by ear.
pub fn tone_frequency(role: ChannelRole) -> f64 {
    match role {
        ChannelRole::Microphone => 440.0,
        ChannelRole::Loopback => 220.0,
    }
}

/// Continuous sine generator with phase carried across frames.
pub struct ToneGenerator {
    phase: f64,
    phase_inc: f64,
}

impl ToneGenerator {
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            phase: 0.0,
            phase_inc: std::f64::consts::TAU * frequency_hz / SAMPLE_RATE as f64,
        }
    }

    pub fn for_role(role: ChannelRole) -> Self {
        Self::new(tone_frequency(role))
    }

    fn next_sample(&mut self) -> i16 {
        let sample = (self.phase.sin() * TONE_AMPLITUDE) as i16;
        self.phase += self.phase_inc;
        if self.phase >= std::f64::consts::TAU {
            self.phase -= std::f64::consts::TAU;
        }
        sample
    }

    /// Generate one full frame of tone.
    pub fn next_frame(&mut self) -> Frame {
        let samples: Vec<i16> = (0..FRAME_SAMPLES).map(|_| self.next_sample()).collect();
        Frame::from_samples(samples).expect("generator emits exactly one frame")
    }

    /// Generate `count` raw samples (diagnostic WAV output).
    pub fn samples(&mut self, count: usize) -> Vec<i16> {
        (0..count).map(|_| self.next_sample()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_stays_within_amplitude() {
        let mut gen = ToneGenerator::for_role(ChannelRole::Microphone);
        let frame = gen.next_frame();
        assert!(frame
            .samples()
            .iter()
            .all(|&s| (s as f64).abs() <= TONE_AMPLITUDE));
    }

    #[test]
    fn tone_is_not_silence() {
        let mut gen = ToneGenerator::for_role(ChannelRole::Loopback);
        let frame = gen.next_frame();
        assert!(frame.samples().iter().any(|&s| s != 0));
    }

    #[test]
    fn phase_continuous_across_frames() {
        // 440 Hz at 48 kHz: one 20 ms frame holds 8.8 cycles, so the frame
        // boundary falls mid-cycle and a phase reset would show as a jump.
        let mut gen = ToneGenerator::new(440.0);
        let first = gen.next_frame();
        let second = gen.next_frame();
        let last = *first.samples().last().unwrap() as i32;
        let next = second.samples()[0] as i32;
        // Adjacent samples of a 440 Hz sine differ by well under 6% of peak.
        assert!((last - next).abs() < (TONE_AMPLITUDE * 0.06) as i32);
    }

    #[test]
    fn generator_is_deterministic() {
        let mut a = ToneGenerator::new(220.0);
        let mut b = ToneGenerator::new(220.0);
        assert_eq!(a.next_frame(), b.next_frame());
    }
}
