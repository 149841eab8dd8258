use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{promote, remove_temp, ClipWriter};
use crate::frame::Frame;
use crate::y4m::{rgb_to_yuv444, Chroma, Y4mHeader, FRAME_MAGIC};

struct OpenClip {
    path: PathBuf,
    out: BufWriter<File>,
    width: u32,
    height: u32,
    frames: u64,
}

/// Writes clips as YUV4MPEG2 4:4:4 streams.
#[derive(Default)]
pub struct Y4mClipWriter {
    open: Option<OpenClip>,
    scratch: Vec<u8>,
}

impl Y4mClipWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn close(&mut self, temp_path: &Path) -> Result<u64> {
        let clip = self
            .open
            .take()
            .ok_or_else(|| anyhow!("no clip is open"))?;
        if clip.path != temp_path {
            bail!(
                "open clip is {}, not {}",
                clip.path.display(),
                temp_path.display()
            );
        }
        let file = clip
            .out
            .into_inner()
            .map_err(|e| anyhow!("flush {}: {}", temp_path.display(), e.error()))?;
        file.sync_all()
            .with_context(|| format!("sync {}", temp_path.display()))?;
        Ok(clip.frames)
    }
}

impl ClipWriter for Y4mClipWriter {
    fn name(&self) -> &'static str {
        "y4m"
    }

    fn extension(&self) -> &'static str {
        "y4m"
    }

    fn open(&mut self, path: &Path, fps: f64, width: u32, height: u32) -> Result<()> {
        if let Some(clip) = &self.open {
            bail!("clip {} is still open", clip.path.display());
        }
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        let header = Y4mHeader::new(width, height, fps, Chroma::C444);
        out.write_all(header.encode().as_bytes())
            .with_context(|| format!("write header to {}", path.display()))?;
        self.open = Some(OpenClip {
            path: path.to_path_buf(),
            out,
            width,
            height,
            frames: 0,
        });
        Ok(())
    }

    fn append(&mut self, frame: &Frame) -> Result<()> {
        let clip = self
            .open
            .as_mut()
            .ok_or_else(|| anyhow!("append without an open clip"))?;
        if frame.width != clip.width || frame.height != clip.height {
            bail!(
                "frame is {}x{}, clip {} is {}x{}",
                frame.width,
                frame.height,
                clip.path.display(),
                clip.width,
                clip.height
            );
        }
        rgb_to_yuv444(frame.pixels(), &mut self.scratch);
        clip.out
            .write_all(FRAME_MAGIC)
            .and_then(|_| clip.out.write_all(b"\n"))
            .and_then(|_| clip.out.write_all(&self.scratch))
            .with_context(|| format!("write frame to {}", clip.path.display()))?;
        clip.frames += 1;
        Ok(())
    }

    fn finalize_keep(&mut self, temp_path: &Path, final_path: &Path) -> Result<()> {
        let frames = self.close(temp_path)?;
        promote(temp_path, final_path)?;
        log::debug!("y4m clip {} sealed with {} frames", final_path.display(), frames);
        Ok(())
    }

    fn finalize_discard(&mut self, temp_path: &Path) -> Result<()> {
        // Drop the handle even if the open clip is not the one named.
        let closed = self.close(temp_path);
        remove_temp(temp_path)?;
        closed.map(|_| ())
    }
}
