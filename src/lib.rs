//! Motion Clipper
//!
//! Scans videos frame by frame, detects intervals of visual motion by
//! differencing consecutive frames, and writes each sufficiently long interval
//! out as its own clip.
//!
//! # Architecture
//!
//! Per frame: classifier → segmenter → zero or one action → writer.
//!
//! - `detect`: frame-pair motion classifiers (`diff`, `exact`)
//! - `segment`: the pure Idle/Active clip segmenter
//! - `output`: clip writers, naming and the temp-then-promote commit
//! - `ingest`: frame sources (synthetic scenes, y4m, ffmpeg-decoded files)
//! - `pipeline`: the per-video run driver
//! - `batch`: input resolution and the multi-video driver
//! - `config`: file → env → validation configuration layer

pub mod batch;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod segment;
pub mod y4m;

pub use batch::{
    resolve_inputs, run_batch, run_input, BatchObserver, BatchSummary, InputOutcome,
};
pub use config::{ClipperConfig, OutputSettings};
pub use detect::{create_classifier, ClassifierKind, ClassifierSettings, MotionClassifier};
pub use frame::{Frame, FrameGeometry};
pub use ingest::{FileSource, FrameSource, SyntheticConfig, SyntheticSource};
pub use output::{create_writer, ClipNaming, ClipWriter, WriterKind};
pub use pipeline::{process_video, ClipRecord, RunOptions, RunSummary};
pub use segment::{
    segment_samples, Action, ClipSegmenter, MotionInterval, MotionSample, SegmenterConfig,
    SegmenterState,
};
