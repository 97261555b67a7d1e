// Pipeline orchestration module
// Job scheduling, batch transcription, and run tracing

pub mod orchestrator;
pub mod queue;
pub mod trace;

pub use orchestrator::{Orchestrator, PipelineError, TranscribeOptions};
pub use queue::{CancelToken, Job, JobQueue};
pub use trace::{read_trace_file, TraceEntry, TraceError, TraceWriter};
