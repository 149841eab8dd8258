//! Local file frame source.
//!
//! This module provides `FileSource`, which picks a decoder for a local input:
//! - `stub://...` URLs decode to a synthetic scene
//! - `.y4m` files decode in pure Rust
//! - anything else decodes through FFmpeg (feature: ingest-file-ffmpeg)
//!
//! Remote URLs are rejected.

use anyhow::{anyhow, Result};
use std::path::Path;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::{SyntheticConfig, SyntheticSource};
use super::y4m_file::Y4mFileSource;
use super::{FrameSource, SourceStats};
use crate::frame::{Frame, FrameGeometry};

/// File extensions treated as video when scanning an input directory.
pub const VIDEO_EXTENSIONS: &[&str] = &["y4m", "mp4", "mov", "avi", "mkv", "m4v", "webm"];

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    Y4m(Y4mFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn open(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes): '{}'",
                path
            ));
        }
        if path.starts_with("stub://") {
            let config = SyntheticConfig::from_url(path)?;
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticSource::new(config)?),
            });
        }
        if has_extension(Path::new(path), "y4m") {
            return Ok(Self {
                backend: FileBackend::Y4m(Y4mFileSource::open(path)?),
            });
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(FfmpegFileSource::open(path)?),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "decoding '{}' requires the ingest-file-ffmpeg feature (only .y4m is built in)",
                path
            ))
        }
    }

    fn source(&self) -> &dyn FrameSource {
        match &self.backend {
            FileBackend::Synthetic(source) => source,
            FileBackend::Y4m(source) => source,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source,
        }
    }

    fn source_mut(&mut self) -> &mut dyn FrameSource {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source,
            FileBackend::Y4m(source) => source,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source,
        }
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        self.source().describe()
    }

    fn geometry(&self) -> FrameGeometry {
        self.source().geometry()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.source_mut().next_frame()
    }

    fn position_ms(&self) -> f64 {
        self.source().position_ms()
    }

    fn frame_count(&self) -> Option<u64> {
        self.source().frame_count()
    }

    fn stats(&self) -> SourceStats {
        self.source().stats()
    }
}

/// True when the path has one of the `VIDEO_EXTENSIONS`.
pub fn is_video_path(path: &Path) -> bool {
    VIDEO_EXTENSIONS
        .iter()
        .any(|ext| has_extension(path, ext))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_remote_urls() {
        assert!(FileSource::open("rtsp://camera/stream").is_err());
        assert!(FileSource::open("   ").is_err());
    }

    #[test]
    fn opens_synthetic_source() {
        let mut source = FileSource::open("stub://porch?frames=2").unwrap();
        assert_eq!(source.describe(), "stub://porch");
        assert_eq!(source.frame_count(), Some(2));
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn recognises_video_extensions() {
        assert!(is_video_path(Path::new("a/b/clip.MP4")));
        assert!(is_video_path(Path::new("clip.y4m")));
        assert!(!is_video_path(Path::new("notes.txt")));
        assert!(!is_video_path(Path::new("mp4")));
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    #[test]
    fn container_formats_need_ffmpeg_feature() {
        let err = FileSource::open("holiday.mp4").err().unwrap();
        assert!(err.to_string().contains("ingest-file-ffmpeg"));
    }
}
