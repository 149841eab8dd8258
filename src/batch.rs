//! Batch driver: resolves inputs and runs one segmentation pass per video.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::ClipperConfig;
use crate::detect::create_classifier;
use crate::ingest::{is_video_path, FileSource};
use crate::output::{create_writer, prepare_output_dir};
use crate::pipeline::{process_video, RunOptions, RunSummary};

/// Expand the configured input into the list of videos to process.
///
/// `stub://` URLs and files pass through. Directories yield their video files
/// in sorted order; subdirectories are not searched.
pub fn resolve_inputs(input: &str) -> Result<Vec<String>> {
    if input.starts_with("stub://") {
        return Ok(vec![input.to_string()]);
    }
    let path = Path::new(input);
    if !path.exists() {
        bail!("input path {} does not exist", path.display());
    }
    if !path.is_dir() {
        return Ok(vec![input.to_string()]);
    }

    let mut videos = Vec::new();
    let entries =
        fs::read_dir(path).with_context(|| format!("failed to list input dir {}", path.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list input dir {}", path.display()))?;
        let candidate = entry.path();
        if candidate.is_file() && is_video_path(&candidate) {
            videos.push(candidate.display().to_string());
        }
    }
    videos.sort();
    if videos.is_empty() {
        log::warn!("no video files found in {}", path.display());
    }
    Ok(videos)
}

/// Segment one input into the configured output directory.
///
/// The output directory is rescanned per input so ordinals continue across
/// the batch and across earlier runs.
pub fn run_input(config: &ClipperConfig, input: &str, stop: &AtomicBool) -> Result<RunSummary> {
    let inventory = prepare_output_dir(&config.output.dir)?;
    let mut source = FileSource::open(input)?;
    let mut classifier = create_classifier(&config.classifier);
    let mut writer = create_writer(config.output.writer, &config.output.ffmpeg_bin);
    let options = RunOptions {
        segmenter: config.segmenter.clone(),
        sample_every: config.sample_every,
        output_dir: config.output.dir.clone(),
        length_suffix: config.output.length_suffix,
        existing_clips: inventory.existing_clips,
    };
    process_video(
        &mut source,
        classifier.as_mut(),
        writer.as_mut(),
        &options,
        stop,
    )
    .with_context(|| format!("failed to process {}", input))
}

/// Result of one input within a batch.
#[derive(Clone, Debug, Serialize)]
pub struct InputOutcome {
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate of a batch.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchSummary {
    pub inputs: Vec<InputOutcome>,
    pub clips_kept: usize,
    pub clips_discarded: u32,
    pub failed: u32,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn record(&mut self, input: &str, result: Result<RunSummary>) {
        match result {
            Ok(run) => {
                self.clips_kept += run.kept.len();
                self.clips_discarded += run.discarded;
                self.cancelled |= run.cancelled;
                self.inputs.push(InputOutcome {
                    input: input.to_string(),
                    run: Some(run),
                    error: None,
                });
            }
            Err(e) => {
                log::error!("{}: {:#}", input, e);
                self.failed += 1;
                self.inputs.push(InputOutcome {
                    input: input.to_string(),
                    run: None,
                    error: Some(format!("{:#}", e)),
                });
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Per-input callbacks for progress reporting around a batch.
pub trait BatchObserver {
    fn input_started(&mut self, _position: usize, _total: usize, _input: &str) {}

    fn input_finished(&mut self, _input: &str, _result: &Result<RunSummary>) {}
}

impl BatchObserver for () {}

/// Process every resolved input in order. Input failures are recorded and the
/// batch moves on; a stop request ends the batch after the current input.
pub fn run_batch(
    config: &ClipperConfig,
    stop: &AtomicBool,
    observer: &mut dyn BatchObserver,
) -> Result<BatchSummary> {
    let inputs = resolve_inputs(&config.input)?;
    let mut summary = BatchSummary::default();
    for (position, input) in inputs.iter().enumerate() {
        if stop.load(Ordering::Relaxed) {
            log::warn!("stop requested, skipping remaining inputs");
            summary.cancelled = true;
            break;
        }
        observer.input_started(position + 1, inputs.len(), input);
        let result = run_input(config, input, stop);
        observer.input_finished(input, &result);
        summary.record(input, result);
    }
    log::info!(
        "batch done: {} inputs, {} clips kept, {} failed",
        summary.inputs.len(),
        summary.clips_kept,
        summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_inputs_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.y4m", "a.MP4", "notes.txt", "c.webm"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.mkv")).unwrap();

        let inputs = resolve_inputs(dir.path().to_str().unwrap()).unwrap();
        let names: Vec<_> = inputs
            .iter()
            .map(|p| Path::new(p).file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.MP4", "b.y4m", "c.webm"]);
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = resolve_inputs(missing.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn stub_urls_pass_through() {
        assert_eq!(
            resolve_inputs("stub://lobby?frames=10").unwrap(),
            vec!["stub://lobby?frames=10".to_string()]
        );
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl BatchObserver for Recorder {
        fn input_started(&mut self, position: usize, total: usize, input: &str) {
            self.events.push(format!("start {}/{} {}", position, total, input));
        }

        fn input_finished(&mut self, input: &str, result: &Result<RunSummary>) {
            self.events.push(format!("done {} ok={}", input, result.is_ok()));
        }
    }

    #[test]
    fn observer_sees_each_input() {
        let out = tempfile::tempdir().unwrap();
        let mut cfg = ClipperConfig::default();
        cfg.input = "stub://quiet?frames=5&motion=".to_string();
        cfg.output.dir = out.path().to_path_buf();

        let mut recorder = Recorder::default();
        let summary = run_batch(&cfg, &AtomicBool::new(false), &mut recorder).unwrap();
        assert!(summary.is_success());
        assert_eq!(
            recorder.events,
            vec![
                "start 1/1 stub://quiet?frames=5&motion=".to_string(),
                "done stub://quiet?frames=5&motion= ok=true".to_string(),
            ]
        );
    }

    #[test]
    fn stop_before_batch_skips_inputs() {
        let out = tempfile::tempdir().unwrap();
        let mut cfg = ClipperConfig::default();
        cfg.input = "stub://scene".to_string();
        cfg.output.dir = out.path().to_path_buf();

        let mut recorder = Recorder::default();
        let summary = run_batch(&cfg, &AtomicBool::new(true), &mut recorder).unwrap();
        assert!(summary.cancelled);
        assert!(summary.inputs.is_empty());
        assert!(recorder.events.is_empty());
    }

    #[test]
    fn failures_are_counted() {
        let mut summary = BatchSummary::default();
        summary.record("broken.mp4", Err(anyhow::anyhow!("decode failed")));
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());
        assert_eq!(summary.inputs[0].error.as_deref(), Some("decode failed"));
    }
}
