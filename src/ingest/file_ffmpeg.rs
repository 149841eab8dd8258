//! Local file frame source using FFmpeg.
//!
//! Decodes the best video stream of a container file, scales every frame to
//! RGB24 and stamps it with its presentation time converted to milliseconds.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::{FrameSource, SourceStats};
use crate::frame::{Frame, FrameGeometry};

pub(crate) struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    time_base_ms: f64,
    fps: f64,
    total_frames: Option<u64>,
    frames_decoded: u64,
    position_ms: f64,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("'{}' has no video track", path))?;
        let stream_index = input_stream.index();
        let time_base_ms = f64::from(input_stream.time_base()) * 1000.0;
        let fps = f64::from(input_stream.avg_frame_rate());
        let total_frames = u64::try_from(input_stream.frames()).ok().filter(|n| *n > 0);
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!("FileSource: opened {} (ffmpeg)", path);

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            time_base_ms,
            fps: if fps.is_finite() && fps > 0.0 { fps } else { 25.0 },
            total_frames,
            frames_decoded: 0,
            position_ms: 0.0,
            eof_sent: false,
        })
    }

    /// Pull one decoded frame out of the decoder if it has one buffered.
    fn receive(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;

        let timestamp_ms = match decoded.timestamp().or_else(|| decoded.pts()) {
            Some(pts) => pts as f64 * self.time_base_ms,
            None => self.frames_decoded as f64 * 1000.0 / self.fps,
        };
        // Keep the stream clock non-decreasing even with odd pts.
        let timestamp_ms = timestamp_ms.max(self.position_ms);

        self.frames_decoded += 1;
        self.position_ms = timestamp_ms;
        Ok(Some(Frame::new(pixels, width, height, timestamp_ms)?))
    }
}

impl FrameSource for FfmpegFileSource {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            width: self.decoder.width(),
            height: self.decoder.height(),
            fps: self.fps,
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }
            if self.eof_sent {
                return Ok(None);
            }

            let mut sent = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                sent = true;
                break;
            }

            if !sent {
                self.decoder.send_eof().context("flush ffmpeg decoder")?;
                self.eof_sent = true;
            }
        }
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

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let pixels = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
