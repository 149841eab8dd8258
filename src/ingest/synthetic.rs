//! Synthetic frame source (`stub://` URLs).
//!
//! Renders a static gradient. During configured motion spans a bright square
//! jumps between two positions on every frame, so consecutive frames inside a
//! span differ by two full squares. Deterministic: the same config always
//! yields the same frames.

use anyhow::{anyhow, bail, Result};
use std::ops::Range;

use super::{FrameSource, SourceStats};
use crate::frame::{Frame, FrameGeometry, RGB_CHANNELS};

const SQUARE_SIDE: u32 = 40;

/// Scene description for a synthetic source.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: u64,
    /// Frame index ranges during which the square moves.
    pub motion_spans: Vec<Range<u64>>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://scene".to_string(),
            width: 160,
            height: 120,
            fps: 10.0,
            total_frames: 100,
            motion_spans: vec![20..40, 60..63],
        }
    }
}

impl SyntheticConfig {
    /// Parse `stub://<name>[?frames=N&fps=F&size=WxH&motion=a-b,c-d]`.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source url must start with stub://"))?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (rest, None),
        };
        let mut cfg = Self {
            name: format!("stub://{}", name),
            ..Self::default()
        };
        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            match key {
                "frames" => cfg.total_frames = parse_num(key, value)?,
                "fps" => cfg.fps = parse_num(key, value)?,
                "size" => {
                    let (w, h) = value
                        .split_once('x')
                        .ok_or_else(|| anyhow!("size must look like WxH"))?;
                    cfg.width = parse_num(key, w)?;
                    cfg.height = parse_num(key, h)?;
                }
                "motion" => cfg.motion_spans = parse_spans(value)?,
                other => bail!("unknown stub parameter '{}'", other),
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.width < 2 * SQUARE_SIDE + 10 || self.height < SQUARE_SIDE + 10 {
            bail!(
                "synthetic frames must be at least {}x{}",
                2 * SQUARE_SIDE + 10,
                SQUARE_SIDE + 10
            );
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            bail!("synthetic fps must be positive");
        }
        Ok(())
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid value '{}' for stub parameter {}", value, key))
}

fn parse_spans(value: &str) -> Result<Vec<Range<u64>>> {
    value
        .split(',')
        .filter(|span| !span.trim().is_empty())
        .map(|span| {
            let (start, end) = span
                .split_once('-')
                .ok_or_else(|| anyhow!("motion span '{}' must look like a-b", span))?;
            let start: u64 = parse_num("motion", start)?;
            let end: u64 = parse_num("motion", end)?;
            if end <= start {
                bail!("motion span '{}' is empty", span);
            }
            Ok(start..end)
        })
        .collect()
}

/// Deterministic synthetic frame source.
pub struct SyntheticSource {
    config: SyntheticConfig,
    next_index: u64,
    position_ms: f64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            next_index: 0,
            position_ms: 0.0,
        })
    }

    fn timestamp_ms(&self, index: u64) -> f64 {
        index as f64 * 1000.0 / self.config.fps
    }

    fn in_motion(&self, index: u64) -> bool {
        self.config.motion_spans.iter().any(|span| span.contains(&index))
    }

    fn render(&self, index: u64) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let mut pixels = vec![0u8; w * h * RGB_CHANNELS];
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) * RGB_CHANNELS;
                let shade = ((x + y) / 4 % 64) as u8;
                pixels[idx..idx + RGB_CHANNELS].copy_from_slice(&[shade, shade / 2, 64 - shade]);
            }
        }

        if self.in_motion(index) {
            let x0 = if index % 2 == 0 { 5 } else { w - SQUARE_SIDE as usize - 5 };
            let y0 = (h - SQUARE_SIDE as usize) / 2;
            for y in y0..y0 + SQUARE_SIDE as usize {
                for x in x0..x0 + SQUARE_SIDE as usize {
                    let idx = (y * w + x) * RGB_CHANNELS;
                    pixels[idx..idx + RGB_CHANNELS].copy_from_slice(&[250, 250, 250]);
                }
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.config.name.clone()
    }

    fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            width: self.config.width,
            height: self.config.height,
            fps: self.config.fps,
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next_index >= self.config.total_frames {
            return Ok(None);
        }
        let index = self.next_index;
        self.next_index += 1;
        let timestamp_ms = self.timestamp_ms(index);
        self.position_ms = timestamp_ms;
        let frame = Frame::new(
            self.render(index),
            self.config.width,
            self.config.height,
            timestamp_ms,
        )?;
        Ok(Some(frame))
    }

    fn position_ms(&self) -> f64 {
        self.position_ms
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.config.total_frames)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_decoded: self.next_index,
            path: self.config.name.clone(),
        }
    }
}
