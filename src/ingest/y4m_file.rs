//! YUV4MPEG2 file frame source.
//!
//! Reads `.y4m` files frame by frame through a buffered reader; frames are
//! converted to RGB24 in memory and never retained. Timestamps are derived
//! from the frame index and the header frame rate.

use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};

use super::{FrameSource, SourceStats};
use crate::frame::{Frame, FrameGeometry};
use crate::y4m::{yuv_to_rgb, Y4mHeader, FRAME_MAGIC};

/// Longest header or FRAME line accepted.
const MAX_LINE_LEN: usize = 4096;

pub(crate) struct Y4mFileSource {
    path: String,
    reader: BufReader<File>,
    header: Y4mHeader,
    total_frames: Option<u64>,
    frames_decoded: u64,
    position_ms: f64,
    payload: Vec<u8>,
}

impl Y4mFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open y4m input '{}'", path))?;
        let file_len = file.metadata().map(|m| m.len()).ok();
        let mut reader = BufReader::new(file);

        let line = read_line(&mut reader)?
            .ok_or_else(|| anyhow!("y4m input '{}' is empty", path))?;
        let header_len = line.len() as u64 + 1;
        let header = Y4mHeader::parse(&line).with_context(|| format!("invalid y4m input '{}'", path))?;

        // Exact when frames carry no per-frame parameters, which is the norm.
        let frame_len = (FRAME_MAGIC.len() + 1 + header.frame_payload_len()) as u64;
        let total_frames = file_len.map(|len| len.saturating_sub(header_len) / frame_len);

        log::debug!(
            "y4m input {}: {}x{} @ {:.3} fps, {:?} frames",
            path,
            header.width,
            header.height,
            header.fps(),
            total_frames
        );

        Ok(Self {
            path: path.to_string(),
            reader,
            payload: vec![0u8; header.frame_payload_len()],
            header,
            total_frames,
            frames_decoded: 0,
            position_ms: 0.0,
        })
    }
}

impl FrameSource for Y4mFileSource {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            width: self.header.width,
            height: self.header.height,
            fps: self.header.fps(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(line) = read_line(&mut self.reader)? else {
            return Ok(None);
        };
        if !line.as_bytes().starts_with(FRAME_MAGIC) {
            bail!(
                "corrupt y4m stream in '{}' at frame {}: expected FRAME marker",
                self.path,
                self.frames_decoded
            );
        }
        match self.reader.read_exact(&mut self.payload) {
            Ok(()) => {}
            // A truncated trailing frame ends the stream.
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                log::warn!(
                    "y4m input {} truncated after {} frames",
                    self.path,
                    self.frames_decoded
                );
                return Ok(None);
            }
            Err(e) => return Err(e).context("read y4m frame payload"),
        }

        let rgb = yuv_to_rgb(&self.header, &self.payload)?;
        let timestamp_ms = self.header.timestamp_ms(self.frames_decoded);
        self.frames_decoded += 1;
        self.position_ms = timestamp_ms;
        Ok(Some(Frame::new(
            rgb,
            self.header.width,
            self.header.height,
            timestamp_ms,
        )?))
    }

    fn position_ms(&self) -> f64 {
        self.position_ms
    }

    fn frame_count(&self) -> Option<u64> {
        self.total_frames
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_decoded: self.frames_decoded,
            path: self.path.clone(),
        }
    }
}

/// Read one `\n`-terminated line. `None` at a clean end of file.
fn read_line(reader: &mut impl BufRead) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', &mut buf)
        .context("read y4m line")?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        if buf.len() >= MAX_LINE_LEN {
            bail!("y4m line exceeds {} bytes", MAX_LINE_LEN);
        }
        return Ok(None);
    }
    buf.pop();
    let line = String::from_utf8(buf).map_err(|_| anyhow!("y4m line is not valid utf-8"))?;
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    use crate::y4m::Chroma;

    fn write_y4m(path: &Path, header: &Y4mHeader, frames: &[u8]) {
        let mut file = File::create(path).unwrap();
        file.write_all(header.encode().as_bytes()).unwrap();
        for value in frames {
            file.write_all(b"FRAME\n").unwrap();
            file.write_all(&vec![*value; header.frame_payload_len()]).unwrap();
        }
    }

    #[test]
    fn reads_mono_frames_with_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.y4m");
        let header = Y4mHeader::new(4, 2, 20.0, Chroma::Mono);
        write_y4m(&path, &header, &[10, 200]);

        let mut source = Y4mFileSource::open(path.to_str().unwrap()).unwrap();
        assert_eq!(source.frame_count(), Some(2));
        assert_eq!(source.geometry().fps, 20.0);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.timestamp_ms, 0.0);
        assert!(first.pixels().iter().all(|v| *v == 10));
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.timestamp_ms, 50.0);
        assert!(second.pixels().iter().all(|v| *v == 200));
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.stats().frames_decoded, 2);
    }

    #[test]
    fn truncated_frame_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.y4m");
        let header = Y4mHeader::new(4, 4, 10.0, Chroma::C420);
        write_y4m(&path, &header, &[128]);
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"FRAME\n\x01\x02").unwrap();

        let mut source = Y4mFileSource::open(path.to_str().unwrap()).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn garbage_between_frames_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.y4m");
        let header = Y4mHeader::new(2, 2, 10.0, Chroma::C444);
        let mut file = File::create(&path).unwrap();
        file.write_all(header.encode().as_bytes()).unwrap();
        file.write_all(b"JUNK\n").unwrap();

        let mut source = Y4mFileSource::open(path.to_str().unwrap()).unwrap();
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Y4mFileSource::open("/nonexistent/clip.y4m").is_err());
    }

    #[test]
    fn oversized_header_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.y4m");
        std::fs::write(
            &path,
            b"YUV4MPEG2 W4294967295 H4294967295 F25:1 C444\nFRAME\n",
        )
        .unwrap();
        let err = Y4mFileSource::open(path.to_str().unwrap()).err().unwrap();
        assert!(format!("{:#}", err).contains("exceeds"));
    }
}
