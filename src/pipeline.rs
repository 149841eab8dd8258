//! Per-video run driver.
//!
//! Pulls frames from a `FrameSource`, classifies every `sample_every`-th
//! frame against the frame decoded just before it, feeds the verdicts to a
//! `ClipSegmenter` and executes the resulting actions against a `ClipWriter`.
//! Frames skipped by the sampling cadence are still appended while a clip is
//! open so clips play back at the source frame rate.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::detect::MotionClassifier;
use crate::frame::{Frame, FrameGeometry};
use crate::ingest::FrameSource;
use crate::output::{ClipNaming, ClipWriter};
use crate::segment::{Action, ClipSegmenter, MotionInterval, MotionSample, SegmenterConfig};

/// Settings for one pass over one video.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub segmenter: SegmenterConfig,
    /// Classify every Nth decoded frame. Zero is treated as one.
    pub sample_every: u32,
    pub output_dir: PathBuf,
    pub length_suffix: bool,
    /// Clips already in `output_dir`; the first new clip gets the next ordinal.
    pub existing_clips: u32,
}

/// A clip promoted to its permanent name.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClipRecord {
    pub ordinal: u32,
    pub path: PathBuf,
    pub interval: MotionInterval,
    pub length_secs: u64,
    pub frames: u64,
}

/// Outcome of one video.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub input: String,
    pub frames_decoded: u64,
    pub frames_classified: u64,
    pub kept: Vec<ClipRecord>,
    pub discarded: u32,
    /// The stop flag ended the run before the source was exhausted.
    pub cancelled: bool,
}

struct OpenClip {
    ordinal: u32,
    temp_path: PathBuf,
    frames: u64,
}

struct ClipSink<'a> {
    writer: &'a mut dyn ClipWriter,
    naming: ClipNaming,
    geometry: FrameGeometry,
    open: Option<OpenClip>,
}

impl ClipSink<'_> {
    fn append(&mut self, frame: &Frame) -> Result<()> {
        if let Some(clip) = self.open.as_mut() {
            self.writer.append(frame)?;
            clip.frames += 1;
        }
        Ok(())
    }

    /// Execute one segmenter action. `frame` is the sample's frame; it becomes
    /// the first frame of an opened clip and is not written on close.
    fn execute(&mut self, action: Action, frame: &Frame, summary: &mut RunSummary) -> Result<()> {
        match action {
            Action::Open { ordinal, start_ms } => {
                let temp_path = self.naming.temp_path(ordinal);
                log::debug!("motion started at {:.0}ms, opening {}", start_ms, temp_path.display());
                self.writer
                    .open(
                        &temp_path,
                        self.geometry.fps,
                        self.geometry.width,
                        self.geometry.height,
                    )
                    .with_context(|| format!("failed to open clip {}", temp_path.display()))?;
                self.open = Some(OpenClip {
                    ordinal,
                    temp_path,
                    frames: 0,
                });
                self.append(frame)
            }
            Action::Write => self.append(frame),
            Action::Keep { ordinal, interval } => {
                let clip = self.take_open(ordinal)?;
                let final_path = self.naming.final_path(ordinal, &interval);
                self.writer.finalize_keep(&clip.temp_path, &final_path)?;
                log::info!(
                    "kept clip {} ({:.0}ms..{:.0}ms, {} frames)",
                    final_path.display(),
                    interval.start_ms,
                    interval.end_ms,
                    clip.frames
                );
                summary.kept.push(ClipRecord {
                    ordinal,
                    path: final_path,
                    interval,
                    length_secs: interval.length_secs(),
                    frames: clip.frames,
                });
                Ok(())
            }
            Action::Discard { ordinal, interval } => {
                let clip = self.take_open(ordinal)?;
                self.writer.finalize_discard(&clip.temp_path)?;
                log::info!(
                    "discarded motion {:.0}ms..{:.0}ms ({:.0}ms, not longer than minimum)",
                    interval.start_ms,
                    interval.end_ms,
                    interval.duration_ms()
                );
                summary.discarded += 1;
                Ok(())
            }
        }
    }

    fn take_open(&mut self, ordinal: u32) -> Result<OpenClip> {
        let clip = self
            .open
            .take()
            .with_context(|| format!("clip {} closed while no clip is open", ordinal))?;
        anyhow::ensure!(
            clip.ordinal == ordinal,
            "clip {} closed while clip {} is open",
            ordinal,
            clip.ordinal
        );
        Ok(clip)
    }
}

/// Segment one video into clips.
///
/// Stops early when `stop` is set; the in-flight clip is still closed by the
/// end-of-stream flush. Writer and classifier errors abort the run.
pub fn process_video(
    source: &mut dyn FrameSource,
    classifier: &mut dyn MotionClassifier,
    writer: &mut dyn ClipWriter,
    options: &RunOptions,
    stop: &AtomicBool,
) -> Result<RunSummary> {
    let sample_every = u64::from(options.sample_every.max(1));
    let mut summary = RunSummary {
        input: source.describe(),
        ..RunSummary::default()
    };
    let mut segmenter = ClipSegmenter::new(&options.segmenter, options.existing_clips);
    let mut sink = ClipSink {
        naming: ClipNaming::new(&options.output_dir, writer.extension(), options.length_suffix),
        writer,
        geometry: source.geometry(),
        open: None,
    };
    let mut progress = Progress::new(source.frame_count());

    log::info!(
        "processing {} with {} classifier, {} writer",
        summary.input,
        classifier.name(),
        sink.writer.name()
    );

    let mut previous: Option<Frame> = None;
    let mut last_timestamp_ms: Option<f64> = None;
    let mut index: u64 = 0;
    loop {
        if stop.load(Ordering::Relaxed) {
            log::warn!("stop requested, flushing {}", summary.input);
            summary.cancelled = true;
            break;
        }
        let Some(frame) = source.next_frame()? else {
            break;
        };
        last_timestamp_ms = Some(frame.timestamp_ms);

        match &previous {
            Some(prev) if index % sample_every == 0 => {
                let motion = classifier
                    .classify(prev, &frame)
                    .with_context(|| format!("classifier failed at frame {}", index))?;
                summary.frames_classified += 1;
                let sample = MotionSample::new(frame.timestamp_ms, motion);
                if let Some(action) = segmenter.step(sample) {
                    sink.execute(action, &frame, &mut summary)?;
                }
            }
            Some(_) => sink.append(&frame)?,
            None => {}
        }

        previous = Some(frame);
        index += 1;
        progress.advance(index, &summary.input);
    }

    if let Some(end_ms) = last_timestamp_ms {
        if let Some(action) = segmenter.finish_at(end_ms) {
            if let Some(last) = previous.as_ref() {
                sink.execute(action, last, &mut summary)?;
            }
        }
    }

    summary.frames_decoded = source.stats().frames_decoded;
    log::info!(
        "finished {}: {} frames, {} clips kept, {} discarded",
        summary.input,
        summary.frames_decoded,
        summary.kept.len(),
        summary.discarded
    );
    Ok(summary)
}

// Logs every 10% when the frame count is known.
struct Progress {
    total: Option<u64>,
    next_percent: u64,
}

impl Progress {
    fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            next_percent: 10,
        }
    }

    fn advance(&mut self, done: u64, label: &str) {
        let Some(total) = self.total else {
            return;
        };
        let percent = done.saturating_mul(100) / total;
        if percent >= self.next_percent && self.next_percent <= 100 {
            log::info!("{}: {}% ({}/{} frames)", label, percent.min(100), done, total);
            self.next_percent = (percent / 10 + 1) * 10;
        }
    }
}
