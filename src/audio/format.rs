//! Format normalization: native device buffers to canonical mono s16le
//!
//! Pure transformation, no I/O. All device/format branching lives behind
//! [`Normalizer::normalize`]; a new native representation is a new
//! [`NativeBuffer`] variant, not a branch in capture code.

use crate::constants::SAMPLE_RATE;
use crate::error::AudioError;

/// Sample representation a device delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    I16,
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleFormat::F32 => f.write_str("f32"),
            SampleFormat::I16 => f.write_str("i16"),
        }
    }
}

/// The format a device reports for its buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl NativeFormat {
    /// The canonical wire rate is fixed; a device that cannot run at
    /// 48 kHz is rejected rather than resampled, because dropping or
    /// duplicating samples would break the assembler's fixed-duration
    /// guarantee.
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.sample_rate != SAMPLE_RATE {
            return Err(AudioError::UnsupportedFormat(format!(
                "device rate {} Hz, need {} Hz",
                self.sample_rate, SAMPLE_RATE
            )));
        }
        if self.channels == 0 {
            return Err(AudioError::UnsupportedFormat("zero channels".into()));
        }
        Ok(())
    }
}

impl std::fmt::Display for NativeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}",
            self.sample_rate, self.channels, self.sample_format
        )
    }
}

/// One native buffer of interleaved samples, borrowed from the device
/// callback.
#[derive(Debug, Clone, Copy)]
pub enum NativeBuffer<'a> {
    F32(&'a [f32]),
    I16(&'a [i16]),
}

/// Converts interleaved native buffers into canonical mono i16 samples.
pub struct Normalizer {
    channels: usize,
}

impl Normalizer {
    pub fn new(format: NativeFormat) -> Result<Self, AudioError> {
        format.validate()?;
        Ok(Self {
            channels: format.channels as usize,
        })
    }

    /// Normalize one buffer, appending mono samples to `out`.
    ///
    /// Float samples are clamped to [-1.0, 1.0] per channel, averaged
    /// across channels, scaled by 32767 and truncated. Integer samples are
    /// averaged in i32, so the mean of pre-clamped inputs cannot overflow.
    /// Trailing samples short of a full channel group are ignored (devices
    /// deliver whole frames; anything else is a driver bug).
    pub fn normalize(&self, buffer: NativeBuffer<'_>, out: &mut Vec<i16>) {
        match buffer {
            NativeBuffer::F32(samples) => {
                for group in samples.chunks_exact(self.channels) {
                    let mean: f32 = group.iter().map(|s| s.clamp(-1.0, 1.0)).sum::<f32>()
                        / self.channels as f32;
                    out.push((mean * 32767.0) as i16);
                }
            }
            NativeBuffer::I16(samples) => {
                for group in samples.chunks_exact(self.channels) {
                    let mean: i32 =
                        group.iter().map(|&s| s as i32).sum::<i32>() / self.channels as i32;
                    out.push(mean as i16);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(channels: u16, sample_format: SampleFormat) -> Normalizer {
        Normalizer::new(NativeFormat {
            sample_rate: SAMPLE_RATE,
            channels,
            sample_format,
        })
        .unwrap()
    }

    #[test]
    fn stereo_float_reference_vector() {
        // Two stereo frames: (1.0, -1.0) and (0.5, 0.5)
        let n = normalizer(2, SampleFormat::F32);
        let mut out = Vec::new();
        n.normalize(NativeBuffer::F32(&[1.0, -1.0, 0.5, 0.5]), &mut out);
        assert_eq!(out, vec![0, 16383]);
    }

    #[test]
    fn float_clamped_before_scaling() {
        let n = normalizer(1, SampleFormat::F32);
        let mut out = Vec::new();
        n.normalize(NativeBuffer::F32(&[2.0, -3.5, 1.0, -1.0]), &mut out);
        assert_eq!(out, vec![32767, -32767, 32767, -32767]);
    }

    #[test]
    fn mono_float_passthrough_scale() {
        let n = normalizer(1, SampleFormat::F32);
        let mut out = Vec::new();
        n.normalize(NativeBuffer::F32(&[0.0, 0.5, -0.25]), &mut out);
        assert_eq!(out, vec![0, 16383, -8191]);
    }

    #[test]
    fn stereo_i16_mean() {
        let n = normalizer(2, SampleFormat::I16);
        let mut out = Vec::new();
        n.normalize(NativeBuffer::I16(&[1000, 2000, -500, 500, i16::MAX, i16::MAX]), &mut out);
        assert_eq!(out, vec![1500, 0, i16::MAX]);
    }

    #[test]
    fn quad_channel_mean() {
        let n = normalizer(4, SampleFormat::F32);
        let mut out = Vec::new();
        n.normalize(NativeBuffer::F32(&[0.5, 0.5, 0.5, 0.5]), &mut out);
        assert_eq!(out, vec![16383]);
    }

    #[test]
    fn wrong_sample_rate_rejected() {
        let err = NativeFormat {
            sample_rate: 44_100,
            channels: 2,
            sample_format: SampleFormat::F32,
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat(_)));
    }
}
