// Transcription orchestration
// Drives classify -> select -> transcribe -> write across all stems of one
// mix. GPU-class work runs strictly sequentially; everything else runs on a
// bounded CPU worker pool. One bad stem never sinks the batch.

use rayon::prelude::*;
use thiserror::Error;

use crate::audio::{self, AudioError, OnsetConfig};
use crate::classify::{Classifier, InstrumentLabel};
use crate::device::Device;
use crate::midi::{self, MidiError};
use crate::pipeline::queue::CancelToken;
use crate::pipeline::trace::{TraceEntry, TraceWriter};
use crate::stems::{derived_midi_path, StemSummary};
use crate::transcribe::{
    estimate_tempo, select_model, ModelId, TranscribeError, TranscriptionEngine,
    TranscriptionSummary, DEFAULT_PRECISION_MS,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Transcribe(#[from] TranscribeError),

    #[error(transparent)]
    Midi(#[from] MidiError),
}

/// Per-batch options
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    /// Re-transcribe even when a MIDI output already exists
    pub force_rerun: bool,

    /// Temporal quantization grid in milliseconds
    pub precision_ms: u32,

    /// Fixed model override; None selects per instrument
    pub model: Option<ModelId>,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        TranscribeOptions {
            force_rerun: false,
            precision_ms: DEFAULT_PRECISION_MS,
            model: None,
        }
    }
}

/// Drives the per-stem transcription pipeline for one mix
pub struct Orchestrator {
    classifier: Classifier,
    engine: TranscriptionEngine,
    trace: Option<TraceWriter>,
}

impl Orchestrator {
    pub fn new(classifier: Classifier, engine: TranscriptionEngine) -> Self {
        Orchestrator {
            classifier,
            engine,
            trace: None,
        }
    }

    /// Record run progress to a JSONL trace file
    pub fn with_trace(mut self, trace: TraceWriter) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn engine(&self) -> &TranscriptionEngine {
        &self.engine
    }

    /// Transcribe every stem of one mix.
    ///
    /// Stems whose MIDI output already exists are skipped unless force_rerun
    /// is set (the cache key is the derived output path; staleness is
    /// accepted by design). Instrument labels are attached to the summaries
    /// in place, honoring labels the caller pre-attached as hints.
    ///
    /// Returns GPU-bucket results in submission order followed by CPU-bucket
    /// results; a failed stem contributes no entry.
    pub fn transcribe_all_stems(
        &self,
        stems: &mut [StemSummary],
        device: Device,
        options: &TranscribeOptions,
        cancel: &CancelToken,
    ) -> Vec<TranscriptionSummary> {
        let total = stems.len();
        let mut work: Vec<(usize, ModelId)> = Vec::with_capacity(total);

        for (idx, stem) in stems.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                log::info!("transcription batch cancelled before stem {}", idx);
                return Vec::new();
            }

            let midi_path = derived_midi_path(&stem.path);
            if midi_path.exists() && !options.force_rerun {
                log::info!("cached: {} already exists, skipping", midi_path.display());
                self.trace_step("cache", idx, total, format!("cached {}", stem.path.display()));
                continue;
            }

            if stem.instrument.is_none() {
                match audio::load_wav(&stem.path) {
                    Ok(data) => {
                        let mono = data.to_mono();
                        let label = self.classifier.classify(&mono, data.sample_rate);
                        log::info!("classified {} as {}", stem.path.display(), label);
                        stem.instrument = Some(label);
                    }
                    Err(e) => {
                        log::error!("failed to read stem {}: {}", stem.path.display(), e);
                        continue;
                    }
                }
            }

            let instrument = stem.instrument.unwrap_or(InstrumentLabel::Unknown);
            let model = options
                .model
                .unwrap_or_else(|| select_model(instrument, device.is_gpu()));
            self.trace_step(
                "classify",
                idx,
                total,
                format!("{} -> {} ({})", stem.path.display(), instrument, model),
            );
            work.push((idx, model));
        }

        // GPU execution is a serialized shared resource; everything else can
        // fan out across the CPU pool
        let (gpu_bucket, cpu_bucket): (Vec<_>, Vec<_>) = work
            .into_iter()
            .partition(|(_, model)| *model == ModelId::HighCapacity && device.is_gpu());

        let stems_ro: &[StemSummary] = stems;
        let mut results = Vec::with_capacity(total);

        for (done, (idx, model)) in gpu_bucket.iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!("transcription batch cancelled, {} GPU stem(s) remaining",
                    gpu_bucket.len() - done);
                break;
            }
            if let Some(summary) = self.transcribe_stem(&stems_ro[*idx], *model, options) {
                results.push(summary);
            }
        }

        let cpu_results: Vec<TranscriptionSummary> = cpu_bucket
            .par_iter()
            .filter_map(|(idx, model)| {
                if cancel.is_cancelled() {
                    return None;
                }
                self.transcribe_stem(&stems_ro[*idx], *model, options)
            })
            .collect();

        results.extend(cpu_results);
        results
    }

    /// Transcribe one stem, isolating any failure to a log line
    fn transcribe_stem(
        &self,
        stem: &StemSummary,
        model: ModelId,
        options: &TranscribeOptions,
    ) -> Option<TranscriptionSummary> {
        match self.try_transcribe_stem(stem, model, options) {
            Ok(summary) => {
                log::info!(
                    "transcribed {} with {}: {} notes at {:.1} BPM",
                    stem.path.display(),
                    model,
                    summary.notes.len(),
                    summary.tempo
                );
                Some(summary)
            }
            Err(e) => {
                log::error!("transcription failed for {}: {}", stem.path.display(), e);
                None
            }
        }
    }

    fn try_transcribe_stem(
        &self,
        stem: &StemSummary,
        model: ModelId,
        options: &TranscribeOptions,
    ) -> Result<TranscriptionSummary, PipelineError> {
        let data = audio::load_wav(&stem.path)?;
        let mono = data.to_mono();

        let onsets = audio::detect_onsets(&mono, data.sample_rate, &OnsetConfig::default());
        let tempo = estimate_tempo(&onsets);

        let notes = self
            .engine
            .run(model, &mono, data.sample_rate, options.precision_ms)?;

        let instrument = stem.instrument.unwrap_or(InstrumentLabel::Unknown);
        let midi_path = derived_midi_path(&stem.path);
        midi::write_midi_on_channel(
            &notes,
            tempo.bpm,
            midi::gm_program(instrument),
            midi::gm_channel(instrument),
            &midi_path,
        )?;

        Ok(TranscriptionSummary {
            midi_path,
            notes,
            tempo: tempo.bpm,
            model_used: model,
        })
    }

    fn trace_step(&self, stage: &str, idx: usize, total: usize, message: String) {
        if let Some(trace) = &self.trace {
            let progress = if total == 0 {
                1.0
            } else {
                idx as f32 / total as f32
            };
            if let Err(e) = trace.write(&TraceEntry::new(stage, progress, message)) {
                log::warn!("failed to write trace entry: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassifierBackend;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn write_sine_stem(dir: &Path, name: &str, freq: f32, duration_secs: f32) -> PathBuf {
        let sample_rate = 44100u32;
        let path = dir.join(format!("{}.wav", name));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let n = (duration_secs * sample_rate as f32) as usize;
        let fade = (0.01 * sample_rate as f32) as usize;
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..n {
            let env = if i < fade {
                i as f32 / fade as f32
            } else if i + fade > n {
                (n - i) as f32 / fade as f32
            } else {
                1.0
            };
            let sample = 0.5
                * env
                * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin();
            writer.write_sample((sample * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn stem(path: PathBuf, instrument: Option<InstrumentLabel>) -> StemSummary {
        StemSummary {
            path,
            duration: 0.4,
            sample_rate: 44100,
            channels: 1,
            instrument,
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            Classifier::new(ClassifierBackend::Reference),
            TranscriptionEngine::new(),
        )
    }

    #[test]
    fn test_cached_stem_produces_no_work() {
        let dir = TempDir::new().unwrap();
        let path = write_sine_stem(dir.path(), "vocals", 261.63, 0.4);
        std::fs::write(derived_midi_path(&path), b"already here").unwrap();

        let orch = orchestrator();
        let mut stems = vec![stem(path, Some(InstrumentLabel::Vocals))];

        let results = orch.transcribe_all_stems(
            &mut stems,
            Device::Cpu,
            &TranscribeOptions::default(),
            &CancelToken::new(),
        );

        assert!(results.is_empty());
        assert_eq!(orch.engine().run_count(), 0);
    }

    #[test]
    fn test_force_rerun_ignores_cache() {
        let dir = TempDir::new().unwrap();
        let path = write_sine_stem(dir.path(), "vocals", 261.63, 0.4);
        std::fs::write(derived_midi_path(&path), b"stale").unwrap();

        let orch = orchestrator();
        let mut stems = vec![stem(path, Some(InstrumentLabel::Vocals))];

        let options = TranscribeOptions {
            force_rerun: true,
            ..Default::default()
        };
        let results =
            orch.transcribe_all_stems(&mut stems, Device::Cpu, &options, &CancelToken::new());

        assert_eq!(results.len(), 1);
        assert_eq!(orch.engine().run_count(), 1);
    }

    #[test]
    fn test_three_stem_batch_model_assignment() {
        let dir = TempDir::new().unwrap();
        let piano = write_sine_stem(dir.path(), "piano", 261.63, 0.4);
        let vocals = write_sine_stem(dir.path(), "vocals", 329.63, 0.4);
        let other = write_sine_stem(dir.path(), "other", 220.0, 0.4);

        let orch = orchestrator();
        let mut stems = vec![
            stem(piano.clone(), Some(InstrumentLabel::Piano)),
            stem(vocals.clone(), Some(InstrumentLabel::Vocals)),
            stem(other.clone(), Some(InstrumentLabel::Unknown)),
        ];

        let results = orch.transcribe_all_stems(
            &mut stems,
            Device::Cpu,
            &TranscribeOptions::default(),
            &CancelToken::new(),
        );

        assert_eq!(results.len(), 3);

        let model_for = |path: &Path| {
            let midi = derived_midi_path(path);
            results
                .iter()
                .find(|s| s.midi_path == midi)
                .map(|s| s.model_used)
        };

        assert_eq!(model_for(&piano), Some(ModelId::OnsetFrame));
        assert_eq!(model_for(&vocals), Some(ModelId::MonophonicPitchTrack));
        assert_eq!(model_for(&other), Some(ModelId::SpectralPeak));

        for summary in &results {
            assert!(summary.midi_path.exists());
            assert!(summary.tempo > 0.0);
        }
    }

    #[test]
    fn test_gpu_bucket_runs_first_in_submission_order() {
        let dir = TempDir::new().unwrap();
        let synth_a = write_sine_stem(dir.path(), "synth_a", 220.0, 0.3);
        let piano = write_sine_stem(dir.path(), "piano", 261.63, 0.3);
        let synth_b = write_sine_stem(dir.path(), "synth_b", 440.0, 0.3);

        let orch = orchestrator();
        let mut stems = vec![
            stem(synth_a.clone(), Some(InstrumentLabel::Synth)),
            stem(piano.clone(), Some(InstrumentLabel::Piano)),
            stem(synth_b.clone(), Some(InstrumentLabel::Synth)),
        ];

        let results = orch.transcribe_all_stems(
            &mut stems,
            Device::Gpu,
            &TranscribeOptions::default(),
            &CancelToken::new(),
        );

        assert_eq!(results.len(), 3);

        // Both synth stems route to the high-capacity class on GPU and come
        // back first, in submission order
        assert_eq!(results[0].midi_path, derived_midi_path(&synth_a));
        assert_eq!(results[0].model_used, ModelId::HighCapacity);
        assert_eq!(results[1].midi_path, derived_midi_path(&synth_b));
        assert_eq!(results[1].model_used, ModelId::HighCapacity);
        assert_eq!(results[2].midi_path, derived_midi_path(&piano));
    }

    #[test]
    fn test_failed_stem_does_not_sink_the_batch() {
        let dir = TempDir::new().unwrap();
        let good = write_sine_stem(dir.path(), "vocals", 261.63, 0.4);
        let missing = dir.path().join("drums.wav");

        let orch = orchestrator();
        let mut stems = vec![
            stem(missing, Some(InstrumentLabel::Drums)),
            stem(good.clone(), Some(InstrumentLabel::Vocals)),
        ];

        let results = orch.transcribe_all_stems(
            &mut stems,
            Device::Cpu,
            &TranscribeOptions::default(),
            &CancelToken::new(),
        );

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].midi_path, derived_midi_path(&good));
    }

    #[test]
    fn test_classification_attaches_label_in_place() {
        let dir = TempDir::new().unwrap();
        let path = write_sine_stem(dir.path(), "mystery", 261.63, 0.4);

        let orch = orchestrator();
        let mut stems = vec![stem(path, None)];

        orch.transcribe_all_stems(
            &mut stems,
            Device::Cpu,
            &TranscribeOptions::default(),
            &CancelToken::new(),
        );

        assert!(stems[0].instrument.is_some());
    }

    #[test]
    fn test_cancelled_batch_does_nothing() {
        let dir = TempDir::new().unwrap();
        let path = write_sine_stem(dir.path(), "vocals", 261.63, 0.4);

        let orch = orchestrator();
        let mut stems = vec![stem(path, Some(InstrumentLabel::Vocals))];

        let token = CancelToken::new();
        token.cancel();
        let results = orch.transcribe_all_stems(
            &mut stems,
            Device::Cpu,
            &TranscribeOptions::default(),
            &token,
        );

        assert!(results.is_empty());
        assert_eq!(orch.engine().run_count(), 0);
    }

    #[test]
    fn test_fixed_model_override() {
        let dir = TempDir::new().unwrap();
        let path = write_sine_stem(dir.path(), "piano", 261.63, 0.4);

        let orch = orchestrator();
        let mut stems = vec![stem(path, Some(InstrumentLabel::Piano))];

        let options = TranscribeOptions {
            model: Some(ModelId::SpectralPeak),
            ..Default::default()
        };
        let results =
            orch.transcribe_all_stems(&mut stems, Device::Cpu, &options, &CancelToken::new());

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].model_used, ModelId::SpectralPeak);
    }

    #[test]
    fn test_batch_runs_through_job_queue() {
        use crate::pipeline::queue::{Job, JobQueue};
        use std::sync::{Arc, Mutex};

        let dir = TempDir::new().unwrap();
        let path = write_sine_stem(dir.path(), "vocals", 261.63, 0.4);

        let queue: JobQueue<Vec<TranscriptionSummary>> = JobQueue::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = Arc::clone(&received);
        let mut stems = vec![stem(path, Some(InstrumentLabel::Vocals))];
        queue.enqueue(Job::with_callback(
            "transcribe-batch",
            move || {
                let orch = orchestrator();
                orch.transcribe_all_stems(
                    &mut stems,
                    Device::Cpu,
                    &TranscribeOptions::default(),
                    &CancelToken::new(),
                )
            },
            move |results| {
                *received_clone.lock().unwrap() = results;
            },
        ));

        queue.start();
        queue.wait_idle();

        let results = received.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].midi_path.exists());
    }

    #[test]
    fn test_trace_records_batch_progress() {
        let dir = TempDir::new().unwrap();
        let path = write_sine_stem(dir.path(), "vocals", 261.63, 0.4);
        let trace_path = dir.path().join("trace.jsonl");

        let orch = orchestrator().with_trace(TraceWriter::new(trace_path.clone()));
        let mut stems = vec![stem(path, Some(InstrumentLabel::Vocals))];

        orch.transcribe_all_stems(
            &mut stems,
            Device::Cpu,
            &TranscribeOptions::default(),
            &CancelToken::new(),
        );

        let entries = crate::pipeline::trace::read_trace_file(&trace_path).unwrap();
        assert!(!entries.is_empty());
        assert!(entries.iter().any(|e| e.stage == "classify"));
    }
}
