// Onset-frame transcription
// Detects onsets, then estimates a rough pitch per onset from the chroma
// bin with maximum energy at the onset frame, shifted to a fixed octave

use crate::audio::features::{chroma_frames, detect_onsets, magnitude_spectrogram, OnsetConfig};
use crate::transcribe::NoteEvent;

/// Chroma classes are anchored to the octave starting at middle C
const OCTAVE_OFFSET: u8 = 60;

const NOTE_DURATION_SECS: f64 = 0.5;
const VELOCITY: f32 = 0.8;

const WINDOW_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;

pub fn transcribe(samples: &[f32], sample_rate: u32) -> Vec<NoteEvent> {
    let onsets = detect_onsets(samples, sample_rate, &OnsetConfig::default());
    if onsets.is_empty() {
        return Vec::new();
    }

    let spec = magnitude_spectrogram(samples, sample_rate, WINDOW_SIZE, HOP_SIZE);
    let chroma = chroma_frames(&spec);

    let frame_secs = HOP_SIZE as f64 / sample_rate as f64;

    onsets
        .iter()
        .map(|onset| {
            let pitch = if chroma.is_empty() {
                OCTAVE_OFFSET
            } else {
                let frame = ((onset.time / frame_secs).round() as usize).min(chroma.len() - 1);
                let class = chroma[frame]
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                OCTAVE_OFFSET + class as u8
            };

            NoteEvent {
                onset: onset.time,
                offset: onset.time + NOTE_DURATION_SECS,
                pitch,
                velocity: VELOCITY,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, duration_secs: f32, sample_rate: u32) -> Vec<f32> {
        let n = (duration_secs * sample_rate as f32) as usize;
        let fade = (0.01 * sample_rate as f32) as usize;
        (0..n)
            .map(|i| {
                let env = if i < fade {
                    i as f32 / fade as f32
                } else if i + fade > n {
                    (n - i) as f32 / fade as f32
                } else {
                    1.0
                };
                0.5 * env
                    * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(transcribe(&[], 44100).is_empty());
    }

    #[test]
    fn test_pitches_land_in_fixed_octave() {
        let sample_rate = 44100;
        // C4 then E4, separated by silence
        let mut samples = tone(261.63, 0.4, sample_rate);
        samples.extend(vec![0.0; sample_rate as usize / 10]);
        samples.extend(tone(329.63, 0.4, sample_rate));

        let notes = transcribe(&samples, sample_rate);

        assert!(notes.len() >= 2);
        for note in &notes {
            assert!((60u8..72).contains(&note.pitch));
            assert!((note.offset - note.onset - NOTE_DURATION_SECS).abs() < 1e-9);
            assert_eq!(note.velocity, VELOCITY);
        }
        // Pitch classes: C maps to 60, E to 64
        assert_eq!(notes[0].pitch, 60);
        assert_eq!(notes[1].pitch, 64);
    }
}
