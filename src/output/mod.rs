//! Clip writers and the temp-then-promote commit protocol.
//!
//! A writer always records into a temporary artifact. `finalize_keep`
//! promotes it to its permanent name with a rename that never overwrites;
//! `finalize_discard` deletes it. A crash between the two leaves only a temp
//! artifact, which the next run sweeps away.

pub mod ffmpeg;
pub mod naming;
pub mod y4m;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::frame::Frame;

pub use self::ffmpeg::FfmpegClipWriter;
pub use self::y4m::Y4mClipWriter;
pub use naming::{prepare_output_dir, scan_output_dir, ClipNaming, OutputInventory};

/// Default ffmpeg binary for the ffmpeg writer.
pub const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";

/// Sink for clip frames.
///
/// At most one clip is open at a time. Errors surface at the call that
/// failed; the caller decides whether to abort the run.
pub trait ClipWriter {
    /// Writer identifier.
    fn name(&self) -> &'static str;

    /// File extension of produced clips, without the dot.
    fn extension(&self) -> &'static str;

    /// Start a new temporary clip at `path`.
    fn open(&mut self, path: &Path, fps: f64, width: u32, height: u32) -> Result<()>;

    /// Append one frame to the open clip.
    fn append(&mut self, frame: &Frame) -> Result<()>;

    /// Close the open clip and move `temp_path` to `final_path`.
    fn finalize_keep(&mut self, temp_path: &Path, final_path: &Path) -> Result<()>;

    /// Close the open clip and delete `temp_path`.
    fn finalize_discard(&mut self, temp_path: &Path) -> Result<()>;
}

/// Which writer a run uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WriterKind {
    /// Uncompressed YUV4MPEG2, no external tools.
    #[default]
    Y4m,
    /// H.264 MP4 through an ffmpeg subprocess.
    Ffmpeg,
}

impl WriterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WriterKind::Y4m => "y4m",
            WriterKind::Ffmpeg => "ffmpeg",
        }
    }
}

pub fn create_writer(kind: WriterKind, ffmpeg_bin: &str) -> Box<dyn ClipWriter> {
    match kind {
        WriterKind::Y4m => Box::new(Y4mClipWriter::new()),
        WriterKind::Ffmpeg => Box::new(FfmpegClipWriter::new(ffmpeg_bin)),
    }
}

/// Move a finished temp artifact into place. Refuses to overwrite.
pub fn promote(temp_path: &Path, final_path: &Path) -> Result<()> {
    if final_path.exists() {
        bail!(
            "refusing to overwrite existing clip {}",
            final_path.display()
        );
    }
    fs::rename(temp_path, final_path).with_context(|| {
        format!(
            "failed to promote {} to {}",
            temp_path.display(),
            final_path.display()
        )
    })
}

/// Delete a temp artifact. Already gone is fine.
pub fn remove_temp(temp_path: &Path) -> Result<()> {
    match fs::remove_file(temp_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to delete {}", temp_path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("temp_clip_1.y4m");
        let done = dir.path().join("clip_1_2s.y4m");
        fs::write(&temp, b"frames").unwrap();

        promote(&temp, &done).unwrap();
        assert!(!temp.exists());
        assert_eq!(fs::read(&done).unwrap(), b"frames");
    }

    #[test]
    fn promote_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("temp_clip_1.y4m");
        let done = dir.path().join("clip_1_2s.y4m");
        fs::write(&temp, b"new").unwrap();
        fs::write(&done, b"old").unwrap();

        assert!(promote(&temp, &done).is_err());
        assert_eq!(fs::read(&done).unwrap(), b"old");
        assert!(temp.exists());
    }

    #[test]
    fn remove_temp_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("temp_clip_4.y4m");
        remove_temp(&temp).unwrap();
        fs::write(&temp, b"x").unwrap();
        remove_temp(&temp).unwrap();
        assert!(!temp.exists());
    }

    #[test]
    fn factory_honours_kind() {
        assert_eq!(create_writer(WriterKind::Y4m, DEFAULT_FFMPEG_BIN).extension(), "y4m");
        let ffmpeg = create_writer(WriterKind::Ffmpeg, "/opt/ffmpeg");
        assert_eq!(ffmpeg.name(), "ffmpeg");
        assert_eq!(ffmpeg.extension(), "mp4");
    }
}
