// Tempo estimation from inter-onset intervals
// Folds IOIs into one octave of the valid BPM range and histograms them

use crate::audio::features::Onset;

pub const MIN_BPM: f64 = 60.0;
pub const MAX_BPM: f64 = 180.0;
pub const FALLBACK_BPM: f64 = 120.0;

/// Minimum onsets required before the estimate is trusted
const MIN_ONSETS: usize = 4;

/// Histogram bin width in seconds
const BIN_WIDTH: f64 = 0.01;

/// Tempo estimate with a confidence score
#[derive(Debug, Clone)]
pub struct TempoEstimate {
    /// Estimated beats per minute, clamped to [MIN_BPM, MAX_BPM]
    pub bpm: f64,

    /// Fraction of intervals agreeing with the winning bin [0.0, 1.0]
    pub confidence: f32,
}

impl TempoEstimate {
    fn fallback() -> Self {
        TempoEstimate {
            bpm: FALLBACK_BPM,
            confidence: 0.0,
        }
    }
}

/// Estimate tempo from detected onsets.
///
/// Inter-onset intervals are folded by octaves into the interval range
/// corresponding to [MIN_BPM, MAX_BPM], then histogrammed; the densest bin
/// wins. Too few onsets yield the fallback tempo with zero confidence.
pub fn estimate_tempo(onsets: &[Onset]) -> TempoEstimate {
    if onsets.len() < MIN_ONSETS {
        return TempoEstimate::fallback();
    }

    let min_interval = 60.0 / MAX_BPM;
    let max_interval = 60.0 / MIN_BPM;

    let mut intervals = Vec::with_capacity(onsets.len() - 1);
    for pair in onsets.windows(2) {
        let mut ioi = pair[1].time - pair[0].time;
        if ioi <= 0.0 {
            continue;
        }

        // Fold into the valid interval octave
        while ioi < min_interval {
            ioi *= 2.0;
        }
        while ioi > max_interval {
            ioi /= 2.0;
        }
        intervals.push(ioi);
    }

    if intervals.is_empty() {
        return TempoEstimate::fallback();
    }

    let num_bins = ((max_interval - min_interval) / BIN_WIDTH).ceil() as usize + 1;
    let mut histogram = vec![0usize; num_bins];

    for &ioi in &intervals {
        let bin = (((ioi - min_interval) / BIN_WIDTH) as usize).min(num_bins - 1);
        histogram[bin] += 1;
    }

    let (best_bin, &best_count) = histogram
        .iter()
        .enumerate()
        .max_by_key(|(_, &count)| count)
        .expect("histogram is non-empty");

    let interval = min_interval + (best_bin as f64 + 0.5) * BIN_WIDTH;
    let bpm = (60.0 / interval).clamp(MIN_BPM, MAX_BPM);
    let confidence = best_count as f32 / intervals.len() as f32;

    TempoEstimate { bpm, confidence }
}
