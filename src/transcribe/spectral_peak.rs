// Heuristic spectral-peak transcription
// The CPU-cheap fallback for ambiguous or polyphonic material: picks peaks
// in the frame-averaged magnitude curve and reads the strongest frequency
// bin at each peak frame

use crate::audio::features::{hz_to_midi, magnitude_spectrogram, Spectrogram};
use crate::transcribe::NoteEvent;

const WINDOW_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;

const NOTE_DURATION_SECS: f64 = 0.5;
const VELOCITY: f32 = 0.7;

/// Peak-picking windows over the frame-averaged magnitude curve
#[derive(Debug, Clone)]
pub struct PeakPickConfig {
    /// Frames before/after that a peak must dominate
    pub pre_max: usize,
    pub post_max: usize,

    /// Frames before/after contributing to the local mean
    pub pre_avg: usize,
    pub post_avg: usize,

    /// Minimum height above the local mean
    pub delta: f32,

    /// Minimum separation between accepted peaks, in frames
    pub wait: usize,
}

impl Default for PeakPickConfig {
    fn default() -> Self {
        PeakPickConfig {
            pre_max: 5,
            post_max: 5,
            pre_avg: 5,
            post_avg: 5,
            delta: 0.5,
            wait: 10,
        }
    }
}

pub fn transcribe(samples: &[f32], sample_rate: u32) -> Vec<NoteEvent> {
    let spec = magnitude_spectrogram(samples, sample_rate, WINDOW_SIZE, HOP_SIZE);
    if spec.num_frames() == 0 {
        return Vec::new();
    }

    let curve = frame_averaged_magnitude(&spec);
    let peaks = peak_pick(&curve, &PeakPickConfig::default());

    let mut notes = Vec::with_capacity(peaks.len());

    for peak in peaks {
        let mags = &spec.mags[peak];
        let bin = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);

        // The DC bin has no pitch to report
        if bin == 0 {
            continue;
        }

        let hz = bin as f32 * spec.bin_hz();
        let pitch = hz_to_midi(hz).round().clamp(0.0, 127.0) as u8;
        let onset = spec.frame_time(peak);

        notes.push(NoteEvent {
            onset,
            offset: onset + NOTE_DURATION_SECS,
            pitch,
            velocity: VELOCITY,
        });
    }

    notes
}

/// Mean magnitude across all bins, per frame
fn frame_averaged_magnitude(spec: &Spectrogram) -> Vec<f32> {
    spec.mags
        .iter()
        .map(|mags| {
            if mags.is_empty() {
                0.0
            } else {
                mags.iter().sum::<f32>() / mags.len() as f32
            }
        })
        .collect()
}

/// Pick local maxima of a curve that dominate their max window, clear the
/// local mean by delta, and respect the minimum separation
pub fn peak_pick(curve: &[f32], config: &PeakPickConfig) -> Vec<usize> {
    let mut peaks = Vec::new();
    let mut last_peak: Option<usize> = None;

    for i in 0..curve.len() {
        let max_lo = i.saturating_sub(config.pre_max);
        let max_hi = (i + config.post_max + 1).min(curve.len());
        let window_max = curve[max_lo..max_hi]
            .iter()
            .fold(f32::MIN, |m, &v| m.max(v));

        let avg_lo = i.saturating_sub(config.pre_avg);
        let avg_hi = (i + config.post_avg + 1).min(curve.len());
        let window_mean =
            curve[avg_lo..avg_hi].iter().sum::<f32>() / (avg_hi - avg_lo) as f32;

        let is_max = curve[i] >= window_max;
        let clears_mean = curve[i] >= window_mean + config.delta;
        let separated = last_peak.map_or(true, |last| i - last > config.wait);

        if is_max && clears_mean && separated {
            peaks.push(i);
            last_peak = Some(i);
        }
    }

    peaks
}
