// Audio processing module
// Handles WAV ingestion and spectral analysis of separated stems

pub mod features;
pub mod ingest;

pub use features::{
    chroma_frames, detect_onsets, extract_stem_features, magnitude_spectrogram, Onset,
    OnsetConfig, Spectrogram, StemFeatures,
};
pub use ingest::{ingest_wav, load_wav, AudioData, AudioError};
