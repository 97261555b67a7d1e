// Pipeline run trace
// Append-only JSONL record of orchestration progress, one entry per stage
// step, consumed by the front end's log view

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A single entry in the run trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// ISO 8601 timestamp
    pub timestamp: String,

    /// Pipeline stage name (e.g. "classify", "transcribe", "cache")
    pub stage: String,

    /// Progress through the batch [0.0, 1.0]
    pub progress: f32,

    /// Human-readable description of the step
    pub message: String,
}

impl TraceEntry {
    pub fn new(stage: impl Into<String>, progress: f32, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            stage: stage.into(),
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }
}

/// Appends trace entries to a JSONL file, creating it on first write
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        file.flush()?;

        Ok(())
    }
}

/// Read all entries of a trace file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_progress_clamping() {
        assert_eq!(TraceEntry::new("s", -0.5, "m").progress, 0.0);
        assert_eq!(TraceEntry::new("s", 1.5, "m").progress, 1.0);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.jsonl");
        let writer = TraceWriter::new(path.clone());

        writer.write(&TraceEntry::new("classify", 0.0, "start")).unwrap();
        writer.write(&TraceEntry::new("transcribe", 0.5, "halfway")).unwrap();

        let entries = read_trace_file(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stage, "classify");
        assert_eq!(entries[1].progress, 0.5);
    }
}
