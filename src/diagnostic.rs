//! Proof mode
//!
//! Offline verification that generate -> encode -> file-write works end to
//! end without a live client: one fixed-duration synthetic tone per role,
//! persisted as standard uncompressed WAV in the canonical format.

use std::path::{Path, PathBuf};

use crate::audio::synth::ToneGenerator;
use crate::config::ChannelRole;
use crate::constants::SAMPLE_RATE;
use crate::error::Result;

/// Generate `seconds` of tone per role and write `mic.wav` / `loop.wav`
/// into `dir`. Returns the written paths.
pub fn run_proof(dir: &Path, seconds: u32) -> Result<Vec<PathBuf>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let total_samples = seconds as usize * SAMPLE_RATE as usize;
    let mut written = Vec::new();

    for role in ChannelRole::ALL {
        let path = dir.join(format!("{}.wav", role.label()));
        let mut generator = ToneGenerator::for_role(role);

        let mut writer = hound::WavWriter::create(&path, spec)?;
        for sample in generator.samples(total_samples) {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;

        tracing::info!(role = %role, path = %path.display(), seconds, "proof file written");
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_writes_canonical_wav_per_role() {
        let dir = tempfile::tempdir().unwrap();
        let paths = run_proof(dir.path(), 1).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("mic.wav"));
        assert!(paths[1].ends_with("loop.wav"));

        for path in &paths {
            let reader = hound::WavReader::open(path).unwrap();
            let spec = reader.spec();
            assert_eq!(spec.sample_rate, SAMPLE_RATE);
            assert_eq!(spec.channels, 1);
            assert_eq!(spec.bits_per_sample, 16);
            assert_eq!(reader.len(), SAMPLE_RATE);
        }
    }

    #[test]
    fn proof_signal_is_audible_not_silence() {
        let dir = tempfile::tempdir().unwrap();
        let paths = run_proof(dir.path(), 1).unwrap();
        let mut reader = hound::WavReader::open(&paths[0]).unwrap();
        let peak = reader
            .samples::<i16>()
            .map(|s| s.unwrap().unsigned_abs())
            .max()
            .unwrap();
        assert!(peak > 5000);
    }
}
