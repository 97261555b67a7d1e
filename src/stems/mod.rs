// Separated stem model
// The separation engine itself is an external collaborator; this module owns
// the stem records it produces, output validation, and path derivation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::audio::AudioError;
use crate::classify::InstrumentLabel;
use crate::device::Device;

/// Sample rate every separated stem is normalized to
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Fixed output names promised by the separation backends
pub const STEM_NAMES: [&str; 4] = ["vocals", "drums", "bass", "other"];

#[derive(Debug, Error)]
pub enum StemError {
    /// Both separation backends were exhausted; fatal for the mix
    #[error("Stem separation failed: {0}")]
    SeparationFailed(String),

    /// A promised output file is missing after separation; fatal for the stem
    #[error("Expected stem output missing: {0}")]
    StemNotFound(PathBuf),

    #[error("Stem {path} has sample rate {actual} Hz, expected {expected}")]
    SampleRateMismatch {
        path: PathBuf,
        actual: u32,
        expected: u32,
    },

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("Failed to read stem header: {0}")]
    WavHeader(#[from] hound::Error),
}

/// Summary of one separated stem, produced by the separation collaborator.
/// The instrument label is attached in place after classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StemSummary {
    /// Path to the stem audio file
    pub path: PathBuf,

    /// Duration in seconds
    pub duration: f64,

    /// Sample rate in Hz; always TARGET_SAMPLE_RATE for valid stems
    pub sample_rate: u32,

    /// Number of channels
    pub channels: u16,

    /// Dominant instrument, attached after analysis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<InstrumentLabel>,
}

/// Contract for the external source-separation engine.
/// Implementations write 16-bit PCM WAV stems at TARGET_SAMPLE_RATE into
/// `out_dir`, named from STEM_NAMES, and fail with `SeparationFailed` only
/// when every backend is unavailable.
pub trait Separator {
    fn separate(
        &self,
        input: &Path,
        out_dir: &Path,
        stems: usize,
        device: Device,
    ) -> Result<Vec<StemSummary>, StemError>;
}

/// Derive the MIDI output path for a stem: same file, `.mid` extension.
/// This path doubles as the transcription cache key.
pub fn derived_midi_path(stem_path: &Path) -> PathBuf {
    stem_path.with_extension("mid")
}

/// Validate a separation output directory against the fixed stem-name set and
/// build summaries from the WAV headers. A missing promised file is fatal for
/// that stem.
pub fn collect_stem_summaries(out_dir: &Path) -> Result<Vec<StemSummary>, StemError> {
    let mut summaries = Vec::with_capacity(STEM_NAMES.len());

    for name in STEM_NAMES {
        let path = out_dir.join(format!("{}.wav", name));
        if !path.exists() {
            return Err(StemError::StemNotFound(path));
        }

        let reader = hound::WavReader::open(&path)?;
        let spec = reader.spec();

        if spec.sample_rate != TARGET_SAMPLE_RATE {
            return Err(StemError::SampleRateMismatch {
                path,
                actual: spec.sample_rate,
                expected: TARGET_SAMPLE_RATE,
            });
        }

        let frames = reader.duration();
        summaries.push(StemSummary {
            path,
            duration: frames as f64 / spec.sample_rate as f64,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            instrument: None,
        });
    }

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_stem(dir: &Path, name: &str, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dir.join(format!("{}.wav", name)), spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_derived_midi_path() {
        let midi = derived_midi_path(Path::new("/tmp/stems/vocals.wav"));
        assert_eq!(midi, PathBuf::from("/tmp/stems/vocals.mid"));
    }

    #[test]
    fn test_collect_stem_summaries() {
        let dir = TempDir::new().unwrap();
        for name in STEM_NAMES {
            write_stem(dir.path(), name, TARGET_SAMPLE_RATE, 44100);
        }

        let summaries = collect_stem_summaries(dir.path()).unwrap();

        assert_eq!(summaries.len(), 4);
        for (summary, name) in summaries.iter().zip(STEM_NAMES) {
            assert!(summary.path.ends_with(format!("{}.wav", name)));
            assert_eq!(summary.sample_rate, TARGET_SAMPLE_RATE);
            assert_eq!(summary.channels, 1);
            assert!((summary.duration - 1.0).abs() < 1e-9);
            assert!(summary.instrument.is_none());
        }
    }

    #[test]
    fn test_collect_missing_stem_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_stem(dir.path(), "vocals", TARGET_SAMPLE_RATE, 100);
        // drums, bass, other are missing

        let result = collect_stem_summaries(dir.path());
        assert!(matches!(result, Err(StemError::StemNotFound(_))));
    }

    #[test]
    fn test_separator_contract() {
        // A stand-in for the external separation engine: writes the promised
        // stem set and reports it via the shared summary builder
        struct FixtureSeparator;

        impl Separator for FixtureSeparator {
            fn separate(
                &self,
                _input: &Path,
                out_dir: &Path,
                _stems: usize,
                _device: Device,
            ) -> Result<Vec<StemSummary>, StemError> {
                for name in STEM_NAMES {
                    write_stem(out_dir, name, TARGET_SAMPLE_RATE, 4410);
                }
                collect_stem_summaries(out_dir)
            }
        }

        let dir = TempDir::new().unwrap();
        let summaries = FixtureSeparator
            .separate(Path::new("mix.wav"), dir.path(), 4, Device::Cpu)
            .unwrap();

        assert_eq!(summaries.len(), 4);
        assert!(summaries.iter().all(|s| s.path.exists()));
    }

    #[test]
    fn test_collect_rejects_wrong_sample_rate() {
        let dir = TempDir::new().unwrap();
        for name in STEM_NAMES {
            write_stem(dir.path(), name, 22050, 100);
        }

        let result = collect_stem_summaries(dir.path());
        assert!(matches!(
            result,
            Err(StemError::SampleRateMismatch { actual: 22050, .. })
        ));
    }
}
