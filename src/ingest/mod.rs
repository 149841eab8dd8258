//! Frame ingestion sources.
//!
//! This module provides different sources for decoded frames:
//! - Synthetic scenes (`stub://` URLs, testing and demos)
//! - YUV4MPEG2 files (`.y4m`, pure Rust)
//! - Other local video files (feature: ingest-file-ffmpeg)
//!
//! All sources yield `Frame`s in presentation order with timestamps on the
//! stream clock. End of stream is `Ok(None)`, never an error.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod synthetic;
pub(crate) mod y4m_file;

use anyhow::Result;

use crate::frame::{Frame, FrameGeometry};

pub use file::{is_video_path, FileSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Ordered, finite stream of decoded frames.
pub trait FrameSource {
    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;

    /// Frame size and nominal rate.
    fn geometry(&self) -> FrameGeometry;

    /// Decode the next frame. `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Timestamp of the most recently decoded frame.
    fn position_ms(&self) -> f64;

    /// Total frames in the stream, when known.
    fn frame_count(&self) -> Option<u64>;

    /// Frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_decoded: u64,
    pub path: String,
}
