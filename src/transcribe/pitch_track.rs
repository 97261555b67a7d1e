// Monophonic pitch-track transcription
// A frame-wise autocorrelation pitch tracker supplies frequency and
// confidence; onsets are detected independently and look up the nearest
// pitch frame. Onset and offset times snap to the configured precision grid.

use crate::audio::features::{detect_onsets, hz_to_midi, OnsetConfig};
use crate::transcribe::{quantize_time, NoteEvent};

const WINDOW_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;

/// Trackable fundamental range in Hz
const MIN_FREQ: f32 = 50.0;
const MAX_FREQ: f32 = 1000.0;

const NOTE_DURATION_SECS: f64 = 0.5;

/// One frame of the pitch tracker's output
#[derive(Debug, Clone)]
pub struct PitchFrame {
    /// Frame timestamp in seconds
    pub time: f64,

    /// Estimated fundamental frequency in Hz; 0.0 when unvoiced
    pub frequency: f32,

    /// Periodicity confidence [0.0, 1.0]
    pub confidence: f32,
}

/// Estimate a fundamental frequency and confidence for every frame
pub fn track_pitch(samples: &[f32], sample_rate: u32) -> Vec<PitchFrame> {
    if samples.len() < WINDOW_SIZE || sample_rate == 0 {
        return Vec::new();
    }

    let min_lag = ((sample_rate as f32 / MAX_FREQ) as usize).max(2);
    let max_lag = ((sample_rate as f32 / MIN_FREQ) as usize).min(WINDOW_SIZE / 2);

    let num_frames = (samples.len() - WINDOW_SIZE) / HOP_SIZE + 1;
    let mut frames = Vec::with_capacity(num_frames);

    for frame_idx in 0..num_frames {
        let start = frame_idx * HOP_SIZE;
        let frame = &samples[start..start + WINDOW_SIZE];
        let time = start as f64 / sample_rate as f64;

        let energy: f32 = frame.iter().map(|s| s * s).sum();
        if energy < 1e-6 {
            frames.push(PitchFrame {
                time,
                frequency: 0.0,
                confidence: 0.0,
            });
            continue;
        }

        let (best_lag, best_corr) = best_autocorrelation_lag(frame, min_lag, max_lag);
        let confidence = (best_corr / energy).clamp(0.0, 1.0);
        let frequency = sample_rate as f32 / best_lag as f32;

        frames.push(PitchFrame {
            time,
            frequency,
            confidence,
        });
    }

    frames
}

/// Find the lag with maximum autocorrelation within the search range
fn best_autocorrelation_lag(frame: &[f32], min_lag: usize, max_lag: usize) -> (usize, f32) {
    let mut best_lag = min_lag;
    let mut best_corr = f32::MIN;

    for lag in min_lag..=max_lag {
        let mut corr = 0.0;
        for i in 0..frame.len() - lag {
            corr += frame[i] * frame[i + lag];
        }
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    (best_lag, best_corr)
}

pub fn transcribe(samples: &[f32], sample_rate: u32, precision_ms: u32) -> Vec<NoteEvent> {
    let pitch_frames = track_pitch(samples, sample_rate);
    if pitch_frames.is_empty() {
        return Vec::new();
    }

    let onsets = detect_onsets(samples, sample_rate, &OnsetConfig::default());
    let precision_secs = precision_ms as f64 / 1000.0;

    let mut notes = Vec::with_capacity(onsets.len());

    for onset in onsets {
        let frame = nearest_frame(&pitch_frames, onset.time);
        if frame.frequency <= 0.0 {
            continue;
        }

        let pitch = hz_to_midi(frame.frequency).round().clamp(0.0, 127.0) as u8;

        notes.push(NoteEvent {
            onset: quantize_time(onset.time, precision_secs),
            offset: quantize_time(onset.time + NOTE_DURATION_SECS, precision_secs),
            pitch,
            velocity: frame.confidence.clamp(0.0, 1.0),
        });
    }

    notes
}

/// Locate the pitch frame whose timestamp is closest to the given time
fn nearest_frame(frames: &[PitchFrame], time: f64) -> &PitchFrame {
    frames
        .iter()
        .min_by(|a, b| {
            (a.time - time)
                .abs()
                .partial_cmp(&(b.time - time).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("frames is non-empty")
}
