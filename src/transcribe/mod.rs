// Transcription engine
// A closed set of note-extraction algorithms behind one dispatch table,
// plus the instrument-to-model selection heuristic

pub mod onset_frame;
pub mod pitch_track;
pub mod spectral_peak;
pub mod tempo;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

use crate::classify::InstrumentLabel;

pub use tempo::{estimate_tempo, TempoEstimate};

/// Default temporal quantization grid in milliseconds
pub const DEFAULT_PRECISION_MS: u32 = 10;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("Transcription model failed: {0}")]
    ModelFailure(String),
}

/// One transcribed note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Note start in seconds from stem start
    pub onset: f64,

    /// Note end in seconds; always greater than onset
    pub offset: f64,

    /// MIDI note number, 0-127
    pub pitch: u8,

    /// Velocity in [0.0, 1.0]
    pub velocity: f32,
}

/// Result of transcribing one stem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSummary {
    /// Where the MIDI file was written
    pub midi_path: PathBuf,

    /// The transcribed notes, also persisted in the MIDI file
    pub notes: Vec<NoteEvent>,

    /// Estimated tempo in BPM
    pub tempo: f64,

    /// Which algorithm produced the notes
    pub model_used: ModelId,
}

/// Closed set of transcription algorithm identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    /// Onset detection + chroma pitch estimate
    #[serde(rename = "onset-frame")]
    OnsetFrame,

    /// Frame-wise monophonic pitch tracker
    #[serde(rename = "monophonic-pitch-track")]
    MonophonicPitchTrack,

    /// Percussion-specific mapping; extension point, currently substituted
    #[serde(rename = "percussion-template")]
    PercussionTemplate,

    /// Rule-based spectral peak picking, the CPU-cheap fallback
    #[serde(rename = "heuristic-spectral-peak")]
    SpectralPeak,

    /// High-capacity learned model; pluggable, substituted when absent
    #[serde(rename = "high-capacity")]
    HighCapacity,
}

impl ModelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::OnsetFrame => "onset-frame",
            ModelId::MonophonicPitchTrack => "monophonic-pitch-track",
            ModelId::PercussionTemplate => "percussion-template",
            ModelId::SpectralPeak => "heuristic-spectral-peak",
            ModelId::HighCapacity => "high-capacity",
        }
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an instrument label to a transcription algorithm.
/// Pure and total; GPU capability arrives as an explicit flag so routing
/// stays deterministic and testable.
pub fn select_model(instrument: InstrumentLabel, gpu_available: bool) -> ModelId {
    match instrument {
        InstrumentLabel::Piano => ModelId::OnsetFrame,
        InstrumentLabel::Vocals | InstrumentLabel::Guitar => ModelId::MonophonicPitchTrack,
        InstrumentLabel::Drums => ModelId::PercussionTemplate,
        InstrumentLabel::Bass | InstrumentLabel::Synth | InstrumentLabel::Unknown => {
            if gpu_available {
                ModelId::HighCapacity
            } else {
                ModelId::SpectralPeak
            }
        }
    }
}

/// Snap a timestamp to the nearest multiple of the precision grid
pub fn quantize_time(t: f64, precision_secs: f64) -> f64 {
    if precision_secs <= 0.0 {
        return t;
    }
    (t / precision_secs).round() * precision_secs
}

/// Pluggable high-capacity transcription model.
/// The engine substitutes the spectral-peak heuristic when no model is
/// registered.
pub trait HighCapacityModel: Send + Sync {
    fn name(&self) -> &str;

    fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Vec<NoteEvent>, TranscribeError>;
}

/// Dispatches a model identifier to its implementing algorithm
pub struct TranscriptionEngine {
    high_capacity: Option<Box<dyn HighCapacityModel>>,
    runs: AtomicUsize,
}

impl TranscriptionEngine {
    pub fn new() -> Self {
        TranscriptionEngine {
            high_capacity: None,
            runs: AtomicUsize::new(0),
        }
    }

    /// Register a high-capacity model implementation
    pub fn with_high_capacity(model: Box<dyn HighCapacityModel>) -> Self {
        TranscriptionEngine {
            high_capacity: Some(model),
            runs: AtomicUsize::new(0),
        }
    }

    /// Total algorithm invocations since construction
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::Relaxed)
    }

    /// Run one transcription algorithm over a mono stem
    pub fn run(
        &self,
        model: ModelId,
        samples: &[f32],
        sample_rate: u32,
        precision_ms: u32,
    ) -> Result<Vec<NoteEvent>, TranscribeError> {
        self.runs.fetch_add(1, Ordering::Relaxed);

        match model {
            ModelId::OnsetFrame => Ok(onset_frame::transcribe(samples, sample_rate)),
            ModelId::MonophonicPitchTrack => {
                Ok(pitch_track::transcribe(samples, sample_rate, precision_ms))
            }
            ModelId::PercussionTemplate => {
                log::info!(
                    "percussion-template model not implemented, substituting {}",
                    ModelId::SpectralPeak
                );
                Ok(spectral_peak::transcribe(samples, sample_rate))
            }
            ModelId::SpectralPeak => Ok(spectral_peak::transcribe(samples, sample_rate)),
            ModelId::HighCapacity => match &self.high_capacity {
                Some(model) => model.transcribe(samples, sample_rate),
                None => {
                    log::info!(
                        "high-capacity model unavailable, substituting {}",
                        ModelId::SpectralPeak
                    );
                    Ok(spectral_peak::transcribe(samples, sample_rate))
                }
            },
        }
    }
}

impl Default for TranscriptionEngine {
    fn default() -> Self {
        Self::new()
    }
}
