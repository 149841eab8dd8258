//! MP4 clip writer backed by an ffmpeg subprocess.
//!
//! Raw RGB24 frames are piped into `ffmpeg -f rawvideo` on stdin, which
//! encodes H.264 into the temporary clip path. Finalizing closes stdin and
//! waits for the encoder so a promoted clip is always complete.

use anyhow::{anyhow, bail, Context, Result};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use super::{promote, remove_temp, ClipWriter};
use crate::frame::Frame;

struct Encoder {
    path: PathBuf,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    width: u32,
    height: u32,
}

pub struct FfmpegClipWriter {
    ffmpeg_bin: String,
    encoder: Option<Encoder>,
}

impl FfmpegClipWriter {
    pub fn new(ffmpeg_bin: &str) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.to_string(),
            encoder: None,
        }
    }

    /// Arguments for encoding `width`x`height` rgb24 at `fps` into `path`.
    pub fn encode_args(path: &Path, fps: f64, width: u32, height: u32) -> Vec<String> {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 25.0 };
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pixel_format".into(),
            "rgb24".into(),
            "-video_size".into(),
            format!("{}x{}", width, height),
            "-framerate".into(),
            format!("{:.3}", fps),
            "-i".into(),
            "-".into(),
            "-an".into(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-vf".into(),
            "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
            "-movflags".into(),
            "+faststart".into(),
            "-f".into(),
            "mp4".into(),
            path.display().to_string(),
        ]
    }

    /// Close stdin and wait for the encoder to exit.
    fn close(&mut self, temp_path: &Path) -> Result<()> {
        let mut encoder = self
            .encoder
            .take()
            .ok_or_else(|| anyhow!("no clip is open"))?;
        if let Some(stdin) = encoder.stdin.take() {
            stdin
                .into_inner()
                .map_err(|e| anyhow!("flush frames to ffmpeg: {}", e.error()))?;
        }
        let mut stderr = String::new();
        if let Some(mut pipe) = encoder.child.stderr.take() {
            // Diagnostic only.
            let _ = pipe.read_to_string(&mut stderr);
        }
        let status = encoder.child.wait().context("wait for ffmpeg")?;
        if encoder.path != temp_path {
            bail!(
                "open clip is {}, not {}",
                encoder.path.display(),
                temp_path.display()
            );
        }
        if !status.success() {
            bail!(
                "ffmpeg failed encoding {} ({}): {}",
                temp_path.display(),
                status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

impl ClipWriter for FfmpegClipWriter {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn extension(&self) -> &'static str {
        "mp4"
    }

    fn open(&mut self, path: &Path, fps: f64, width: u32, height: u32) -> Result<()> {
        if let Some(encoder) = &self.encoder {
            bail!("clip {} is still open", encoder.path.display());
        }
        let mut child = Command::new(&self.ffmpeg_bin)
            .args(Self::encode_args(path, fps, width, height))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.ffmpeg_bin))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdin unavailable"))?;
        self.encoder = Some(Encoder {
            path: path.to_path_buf(),
            child,
            stdin: Some(BufWriter::new(stdin)),
            width,
            height,
        });
        Ok(())
    }

    fn append(&mut self, frame: &Frame) -> Result<()> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| anyhow!("append without an open clip"))?;
        if frame.width != encoder.width || frame.height != encoder.height {
            bail!(
                "frame is {}x{}, clip {} is {}x{}",
                frame.width,
                frame.height,
                encoder.path.display(),
                encoder.width,
                encoder.height
            );
        }
        let stdin = encoder
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg stdin already closed"))?;
        stdin
            .write_all(frame.pixels())
            .with_context(|| format!("pipe frame to ffmpeg for {}", encoder.path.display()))
    }

    fn finalize_keep(&mut self, temp_path: &Path, final_path: &Path) -> Result<()> {
        self.close(temp_path)?;
        promote(temp_path, final_path)
    }

    fn finalize_discard(&mut self, temp_path: &Path) -> Result<()> {
        // The encoder outcome does not matter for a clip being thrown away.
        if let Err(e) = self.close(temp_path) {
            log::debug!("ffmpeg exit while discarding {}: {}", temp_path.display(), e);
        }
        remove_temp(temp_path)
    }
}

impl Drop for FfmpegClipWriter {
    fn drop(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            drop(encoder.stdin.take());
            let _ = encoder.child.kill();
            let _ = encoder.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_args_describe_raw_input() {
        let args = FfmpegClipWriter::encode_args(Path::new("/out/temp_clip_1.mp4"), 29.97, 640, 360);
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pixel_format rgb24 -video_size 640x360"));
        assert!(joined.contains("-framerate 29.970"));
        assert_eq!(args.last().map(String::as_str), Some("/out/temp_clip_1.mp4"));
    }

    #[test]
    fn missing_binary_fails_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FfmpegClipWriter::new("/nonexistent/ffmpeg-binary");
        let err = writer
            .open(&dir.path().join("temp_clip_1.mp4"), 25.0, 16, 16)
            .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[test]
    fn finalize_without_open_clip_fails() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("temp_clip_1.mp4");
        let mut writer = FfmpegClipWriter::new("ffmpeg");
        assert!(writer
            .finalize_keep(&temp, &dir.path().join("clip_1.mp4"))
            .is_err());
        writer.finalize_discard(&temp).unwrap();
    }
}
