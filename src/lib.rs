// Stemscribe - Mixed-audio to per-instrument MIDI transcription
// Module declarations

pub mod audio;
pub mod classify;
pub mod device;
pub mod midi;
pub mod pipeline;
pub mod settings;
pub mod stems;
pub mod transcribe;

pub use classify::{Classifier, ClassifierBackend, InstrumentLabel};
pub use device::Device;
pub use pipeline::{CancelToken, Job, JobQueue, Orchestrator, TranscribeOptions};
pub use stems::{Separator, StemSummary};
pub use transcribe::{select_model, ModelId, NoteEvent, TranscriptionEngine, TranscriptionSummary};
