// Stem audio ingestion
// Reads separated stem WAV files and normalizes samples to f32

use hound::{SampleFormat, WavReader};
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to read WAV file: {0}")]
    WavReadError(#[from] hound::Error),

    #[error("Failed to open audio file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
}

/// Decoded audio for one stem
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved samples normalized to f32 in range [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Sample rate in Hz (stems are produced at 44100)
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Total number of frames (samples / channels)
    pub frame_count: usize,
}

impl AudioData {
    /// Duration of the stem in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let channels = self.channels as usize;
        let mut mono = Vec::with_capacity(self.frame_count);

        for frame_idx in 0..self.frame_count {
            let mut sum = 0.0;
            for ch in 0..channels {
                sum += self.samples[frame_idx * channels + ch];
            }
            mono.push(sum / channels as f32);
        }

        mono
    }
}

/// Load a stem WAV file from disk
pub fn load_wav(path: &Path) -> Result<AudioData, AudioError> {
    let mut file = std::fs::File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    ingest_wav(&data)
}

/// Ingest a WAV file from raw bytes
/// Returns AudioData with normalized samples and metadata
pub fn ingest_wav(data: &[u8]) -> Result<AudioData, AudioError> {
    let cursor = Cursor::new(data);
    let mut reader = WavReader::new(cursor)?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels;

    let samples = normalize_samples(&mut reader, spec.sample_format, spec.bits_per_sample)?;

    let frame_count = if channels > 0 {
        samples.len() / channels as usize
    } else {
        0
    };

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
        frame_count,
    })
}

/// Normalize PCM samples of any supported bit depth to f32 [-1.0, 1.0]
fn normalize_samples<R: std::io::Read>(
    reader: &mut WavReader<R>,
    format: SampleFormat,
    bit_depth: u16,
) -> Result<Vec<f32>, AudioError> {
    let samples = match (format, bit_depth) {
        (SampleFormat::Int, 8) => {
            // 8-bit PCM is unsigned, range [0, 255]
            reader
                .samples::<i32>()
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|s| (s as f32 - 128.0) / 128.0)
                .collect()
        }
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 32768.0)
            .collect(),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 8_388_608.0)
            .collect(),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 2_147_483_648.0)
            .collect(),
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                format, bit_depth
            )));
        }
    };

    Ok(samples)
}
