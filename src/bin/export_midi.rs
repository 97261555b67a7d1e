use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use stemscribe::midi::{write_midi, write_midi_multi};
use stemscribe::transcribe::NoteEvent;

/// Export MIDI from a JSON document of note events
#[derive(Parser)]
#[command(name = "export-midi")]
#[command(about = "Write note events from JSON to a standard MIDI file")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// JSON file holding either an array of note events or an object mapping
    /// track names to arrays
    notes_json: PathBuf,

    /// Output MIDI path, or output directory with --separate
    out_path: PathBuf,

    /// Tempo in BPM
    #[arg(long, default_value_t = 120.0)]
    tempo: f64,

    /// General MIDI program number
    #[arg(long, default_value_t = 0)]
    program: u8,

    /// Write one MIDI file per track instead of one multi-track file
    #[arg(long)]
    separate: bool,
}

/// Accepted input shapes for the note document
#[derive(Deserialize)]
#[serde(untagged)]
enum NotesDocument {
    Flat(Vec<NoteEvent>),
    Tracks(BTreeMap<String, Vec<NoteEvent>>),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let text = fs::read_to_string(&cli.notes_json)
        .with_context(|| format!("failed to read {}", cli.notes_json.display()))?;
    let document: NotesDocument = serde_json::from_str(&text)
        .with_context(|| format!("invalid note document {}", cli.notes_json.display()))?;

    match document {
        NotesDocument::Flat(notes) => {
            if cli.separate {
                anyhow::bail!("--separate requires an object mapping track names to notes");
            }
            write_midi(&notes, cli.tempo, cli.program, &cli.out_path)?;
            println!("Wrote {} notes to {}", notes.len(), cli.out_path.display());
        }
        NotesDocument::Tracks(tracks) => {
            if cli.separate {
                fs::create_dir_all(&cli.out_path)?;
                for (name, notes) in &tracks {
                    let path = cli.out_path.join(format!("{}.mid", name));
                    write_midi(notes, cli.tempo, cli.program, &path)?;
                    println!("Wrote {} notes to {}", notes.len(), path.display());
                }
            } else {
                let tracks: Vec<(String, Vec<NoteEvent>)> = tracks.into_iter().collect();
                write_midi_multi(&tracks, cli.tempo, cli.program, &cli.out_path)?;
                println!(
                    "Wrote {} track(s) to {}",
                    tracks.len(),
                    cli.out_path.display()
                );
            }
        }
    }

    Ok(())
}
