// MIDI note assembly
// Converts note-event sequences plus tempo/instrument metadata into standard
// MIDI files, and reads them back for verification

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::Path;
use thiserror::Error;

use crate::classify::InstrumentLabel;
use crate::transcribe::NoteEvent;

/// Pulses per quarter note used for all written files
pub const PPQ: u16 = 480;

/// MIDI channel reserved for percussion (channel 10, zero-indexed)
const PERCUSSION_CHANNEL: u8 = 9;

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("Failed to write MIDI file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid MIDI data: {0}")]
    Parse(#[from] midly::Error),
}

/// General MIDI program for an instrument label
pub fn gm_program(instrument: InstrumentLabel) -> u8 {
    match instrument {
        InstrumentLabel::Piano => 0,
        InstrumentLabel::Guitar => 24,
        InstrumentLabel::Bass => 32,
        // Drums carry program 0 and address the percussion channel instead
        InstrumentLabel::Drums => 0,
        InstrumentLabel::Vocals => 52,
        InstrumentLabel::Synth => 80,
        InstrumentLabel::Unknown => 0,
    }
}

/// Output channel for an instrument label
pub fn gm_channel(instrument: InstrumentLabel) -> u8 {
    match instrument {
        InstrumentLabel::Drums => PERCUSSION_CHANNEL,
        _ => 0,
    }
}

/// Write a single-track MIDI file on channel 0
pub fn write_midi(
    notes: &[NoteEvent],
    tempo_bpm: f64,
    program: u8,
    out_path: &Path,
) -> Result<(), MidiError> {
    write_midi_on_channel(notes, tempo_bpm, program, 0, out_path)
}

/// Write a single-track MIDI file at the given tempo, GM program, and channel
pub fn write_midi_on_channel(
    notes: &[NoteEvent],
    tempo_bpm: f64,
    program: u8,
    channel: u8,
    out_path: &Path,
) -> Result<(), MidiError> {
    let track = build_track(notes, tempo_bpm, program, channel, true);

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::from(PPQ)),
        },
        tracks: vec![track],
    };

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    std::fs::write(out_path, bytes)?;

    Ok(())
}

/// Write one parallel track per named note list into a single file
pub fn write_midi_multi(
    tracks: &[(String, Vec<NoteEvent>)],
    tempo_bpm: f64,
    program: u8,
    out_path: &Path,
) -> Result<(), MidiError> {
    let mut smf_tracks = Vec::with_capacity(tracks.len());

    for (idx, (name, notes)) in tracks.iter().enumerate() {
        // Tempo lives on the first track only
        let mut track = build_track(notes, tempo_bpm, program, 0, idx == 0);
        track.insert(
            0,
            TrackEvent {
                delta: u28::from(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
            },
        );
        smf_tracks.push(track);
    }

    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(u15::from(PPQ)),
        },
        tracks: smf_tracks,
    };

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    std::fs::write(out_path, bytes)?;

    Ok(())
}

/// Ticks per second at the given tempo and the fixed PPQ
fn ticks_per_second(tempo_bpm: f64) -> f64 {
    PPQ as f64 * tempo_bpm / 60.0
}

/// Build one MIDI track from note events.
/// The assembler tolerates unordered input; events are sorted by tick before
/// delta encoding.
fn build_track<'a>(
    notes: &[NoteEvent],
    tempo_bpm: f64,
    program: u8,
    channel: u8,
    include_tempo: bool,
) -> Vec<TrackEvent<'a>> {
    let ticks_per_sec = ticks_per_second(tempo_bpm);
    let mut track = Vec::new();

    if include_tempo {
        let us_per_quarter = (60_000_000.0 / tempo_bpm) as u32;
        track.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(us_per_quarter))),
        });
    }

    track.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Midi {
            channel: u4::from(channel),
            message: MidiMessage::ProgramChange {
                program: u7::from(program),
            },
        },
    });

    // Absolute-tick event list, then delta encode
    let mut events: Vec<(u32, TrackEventKind)> = Vec::with_capacity(notes.len() * 2);

    for note in notes {
        let tick_on = (note.onset * ticks_per_sec).round() as u32;
        let tick_off = (note.offset * ticks_per_sec).round().max(1.0) as u32;
        let velocity = (note.velocity.clamp(0.0, 1.0) * 127.0).round() as u8;

        events.push((
            tick_on,
            TrackEventKind::Midi {
                channel: u4::from(channel),
                message: MidiMessage::NoteOn {
                    key: u7::from(note.pitch.min(127)),
                    vel: u7::from(velocity),
                },
            },
        ));
        events.push((
            tick_off,
            TrackEventKind::Midi {
                channel: u4::from(channel),
                message: MidiMessage::NoteOff {
                    key: u7::from(note.pitch.min(127)),
                    vel: u7::from(0),
                },
            },
        ));
    }

    events.sort_by_key(|(tick, _)| *tick);

    let mut last_tick = 0u32;
    for (tick, kind) in events {
        track.push(TrackEvent {
            delta: u28::from(tick.saturating_sub(last_tick)),
            kind,
        });
        last_tick = tick;
    }

    track.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    track
}

/// Read a MIDI file back into note events.
/// Matches note-on to the next note-off (or zero-velocity note-on) for the
/// same key and channel.
pub fn read_midi(path: &Path) -> Result<Vec<NoteEvent>, MidiError> {
    let bytes = std::fs::read(path)?;
    let smf = Smf::parse(&bytes)?;

    let ppq = match smf.header.timing {
        Timing::Metrical(ppq) => u16::from(ppq) as f64,
        Timing::Timecode(fps, subframe) => {
            // Rare for our own files; treat one frame-subdivision as one tick
            fps.as_f32() as f64 * subframe as f64
        }
    };

    // Default 120 BPM unless a tempo event says otherwise
    let mut us_per_quarter = 500_000.0;
    let mut notes = Vec::new();

    for track in &smf.tracks {
        let mut tick = 0u64;
        let mut active: Vec<(u8, u8, u64, f32)> = Vec::new(); // (channel, key, start_tick, velocity)

        for event in track {
            tick += u32::from(event.delta) as u64;

            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    us_per_quarter = u32::from(tempo) as f64;
                }
                TrackEventKind::Midi { channel, message } => match message {
                    MidiMessage::NoteOn { key, vel } if u8::from(vel) > 0 => {
                        active.push((
                            u8::from(channel),
                            u8::from(key),
                            tick,
                            u8::from(vel) as f32 / 127.0,
                        ));
                    }
                    MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                        let key = u8::from(key);
                        let channel = u8::from(channel);
                        if let Some(pos) = active
                            .iter()
                            .position(|(ch, k, _, _)| *ch == channel && *k == key)
                        {
                            let (_, _, start_tick, velocity) = active.remove(pos);
                            let secs_per_tick = us_per_quarter / 1_000_000.0 / ppq;
                            notes.push(NoteEvent {
                                onset: start_tick as f64 * secs_per_tick,
                                offset: tick as f64 * secs_per_tick,
                                pitch: key,
                                velocity,
                            });
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }
    }

    notes.sort_by(|a, b| a.onset.partial_cmp(&b.onset).unwrap_or(std::cmp::Ordering::Equal));
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn note(onset: f64, offset: f64, pitch: u8, velocity: f32) -> NoteEvent {
        NoteEvent {
            onset,
            offset,
            pitch,
            velocity,
        }
    }

    #[test]
    fn test_gm_program_table() {
        assert_eq!(gm_program(InstrumentLabel::Piano), 0);
        assert_eq!(gm_program(InstrumentLabel::Guitar), 24);
        assert_eq!(gm_program(InstrumentLabel::Bass), 32);
        assert_eq!(gm_program(InstrumentLabel::Vocals), 52);
        assert_eq!(gm_program(InstrumentLabel::Synth), 80);
        assert_eq!(gm_program(InstrumentLabel::Unknown), 0);
    }

    #[test]
    fn test_drums_use_percussion_channel() {
        assert_eq!(gm_channel(InstrumentLabel::Drums), 9);
        assert_eq!(gm_channel(InstrumentLabel::Piano), 0);
    }

    #[test]
    fn test_round_trip_preserves_notes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.mid");

        let notes = vec![
            note(0.0, 0.5, 60, 0.8),
            note(0.5, 1.0, 62, 0.5),
            note(1.0, 1.5, 64, 1.0),
        ];

        write_midi(&notes, 120.0, 0, &path).unwrap();
        let read_back = read_midi(&path).unwrap();

        assert_eq!(read_back.len(), notes.len());

        // One tick at 120 BPM / 480 PPQ is about 1ms
        let tick_secs = 1.0 / ticks_per_second(120.0);
        for (original, parsed) in notes.iter().zip(read_back.iter()) {
            assert_eq!(parsed.pitch, original.pitch);
            assert!((parsed.onset - original.onset).abs() <= tick_secs);
            assert!((parsed.offset - original.offset).abs() <= tick_secs);
            assert!((parsed.velocity - original.velocity).abs() <= 1.0 / 127.0);
        }
    }

    #[test]
    fn test_unordered_input_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("unordered.mid");

        let notes = vec![
            note(1.0, 1.5, 64, 0.9),
            note(0.0, 0.5, 60, 0.9),
            note(0.5, 1.0, 62, 0.9),
        ];

        write_midi(&notes, 120.0, 0, &path).unwrap();
        let read_back = read_midi(&path).unwrap();

        assert_eq!(read_back.len(), 3);
        assert!(read_back.windows(2).all(|w| w[0].onset <= w[1].onset));
        assert_eq!(read_back[0].pitch, 60);
        assert_eq!(read_back[2].pitch, 64);
    }

    #[test]
    fn test_empty_note_list_still_writes_a_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.mid");

        write_midi(&[], 120.0, 0, &path).unwrap();

        assert!(path.exists());
        assert!(read_midi(&path).unwrap().is_empty());
    }

    #[test]
    fn test_multi_track_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("multi.mid");

        let tracks = vec![
            ("lead".to_string(), vec![note(0.0, 0.5, 72, 0.9)]),
            ("bass".to_string(), vec![note(0.0, 1.0, 36, 0.8)]),
        ];

        write_midi_multi(&tracks, 100.0, 0, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.tracks.len(), 2);

        let read_back = read_midi(&path).unwrap();
        assert_eq!(read_back.len(), 2);
    }

    #[test]
    fn test_tempo_event_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tempo.mid");

        write_midi(&[note(0.0, 0.5, 60, 0.8)], 140.0, 0, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        let has_tempo = smf.tracks[0].iter().any(|e| {
            matches!(
                e.kind,
                TrackEventKind::Meta(MetaMessage::Tempo(t)) if u32::from(t) == 428_571
            )
        });
        assert!(has_tempo);
    }
}
