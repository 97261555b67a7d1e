// Instrument classification for separated stems
// Nearest-neighbor lookup against a fixed prototype table, behind a
// pluggable backend so a trained model can replace it without touching the
// calling contract

use serde::{Deserialize, Serialize};

use crate::audio::features::{extract_stem_features, StemFeatures};

/// Closed set of instrument labels a stem can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentLabel {
    Vocals,
    Drums,
    Bass,
    Piano,
    Guitar,
    Synth,
    Unknown,
}

impl InstrumentLabel {
    /// All labels in reference-table order; this order breaks voting ties
    pub const ALL: [InstrumentLabel; 7] = [
        InstrumentLabel::Vocals,
        InstrumentLabel::Drums,
        InstrumentLabel::Bass,
        InstrumentLabel::Piano,
        InstrumentLabel::Guitar,
        InstrumentLabel::Synth,
        InstrumentLabel::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentLabel::Vocals => "vocals",
            InstrumentLabel::Drums => "drums",
            InstrumentLabel::Bass => "bass",
            InstrumentLabel::Piano => "piano",
            InstrumentLabel::Guitar => "guitar",
            InstrumentLabel::Synth => "synth",
            InstrumentLabel::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for InstrumentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prototype feature vectors, one per label, in tie-break order.
/// Layout matches StemFeatures::as_vector:
/// [cepstral c0, spectral centroid Hz, zero-crossing rate, RMS]
const REFERENCE_TABLE: [(InstrumentLabel, [f32; 4]); 7] = [
    (InstrumentLabel::Vocals, [0.1, 3000.0, 0.1, 0.3]),
    (InstrumentLabel::Drums, [0.05, 2000.0, 0.05, 0.5]),
    (InstrumentLabel::Bass, [0.0, 1500.0, 0.02, 0.4]),
    (InstrumentLabel::Piano, [0.2, 2500.0, 0.08, 0.2]),
    (InstrumentLabel::Guitar, [0.15, 2200.0, 0.06, 0.25]),
    (InstrumentLabel::Synth, [0.12, 1800.0, 0.04, 0.35]),
    (InstrumentLabel::Unknown, [0.08, 2000.0, 0.03, 0.3]),
];

/// Classification backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierBackend {
    /// k-NN against the built-in reference table
    Reference,

    /// Placeholder for a trained model; currently always returns Unknown
    Advanced,
}

/// Stem instrument classifier.
/// Constructed once at startup and passed by reference to every call; holds
/// no mutable state.
pub struct Classifier {
    backend: ClassifierBackend,
    k: usize,
}

impl Classifier {
    pub fn new(backend: ClassifierBackend) -> Self {
        Classifier { backend, k: 3 }
    }

    pub fn backend(&self) -> ClassifierBackend {
        self.backend
    }

    /// Classify a stem's dominant instrument.
    /// Best-effort: misclassification is silent, never an error.
    pub fn classify(&self, samples: &[f32], sample_rate: u32) -> InstrumentLabel {
        match self.backend {
            ClassifierBackend::Reference => {
                let features = extract_stem_features(samples, sample_rate);
                self.classify_features(&features)
            }
            ClassifierBackend::Advanced => InstrumentLabel::Unknown,
        }
    }

    /// Classify an already-extracted feature vector
    pub fn classify_features(&self, features: &StemFeatures) -> InstrumentLabel {
        let vector = features.as_vector();

        // Distance to every prototype, keeping the table index so that equal
        // distances and tied votes both resolve in table order
        let mut distances: Vec<(usize, f32)> = REFERENCE_TABLE
            .iter()
            .enumerate()
            .map(|(idx, (_, proto))| (idx, euclidean_distance(&vector, proto)))
            .collect();
        distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        // Majority vote among the k nearest
        let mut votes = [0usize; REFERENCE_TABLE.len()];
        for (idx, _) in distances.iter().take(self.k) {
            votes[*idx] += 1;
        }

        let max_votes = votes.iter().copied().max().unwrap_or(0);
        if max_votes == 0 {
            return InstrumentLabel::Unknown;
        }

        // First table entry holding the maximum wins ties
        let winner = votes.iter().position(|&v| v == max_votes).unwrap_or(6);
        REFERENCE_TABLE[winner].0
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierBackend::Reference)
    }
}

fn euclidean_distance(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
