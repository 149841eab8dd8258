//! YUV4MPEG2 stream header and colour conversion.
//!
//! Shared by the `.y4m` frame source and the `.y4m` clip writer. Samples are
//! treated as full-range BT.601.

use anyhow::{anyhow, bail, Result};

use crate::frame::{luma_of, RGB_CHANNELS};

pub const STREAM_MAGIC: &str = "YUV4MPEG2";
pub const FRAME_MAGIC: &[u8] = b"FRAME";

/// Largest frame accepted from a stream header (8K UHD).
pub const MAX_FRAME_PIXELS: u64 = 7680 * 4320;

/// Chroma subsampling of a y4m stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chroma {
    C420,
    C444,
    Mono,
}

impl Chroma {
    fn parse(tag: &str) -> Result<Self> {
        match tag {
            "420" | "420jpeg" | "420paldv" | "420mpeg2" => Ok(Chroma::C420),
            "444" => Ok(Chroma::C444),
            "mono" => Ok(Chroma::Mono),
            other => bail!("unsupported y4m colorspace C{}", other),
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Chroma::C420 => "420jpeg",
            Chroma::C444 => "444",
            Chroma::Mono => "mono",
        }
    }

    /// Size of each chroma plane.
    fn chroma_dims(self, width: usize, height: usize) -> (usize, usize) {
        match self {
            Chroma::C420 => (width.div_ceil(2), height.div_ceil(2)),
            Chroma::C444 => (width, height),
            Chroma::Mono => (0, 0),
        }
    }
}

/// Parsed stream header.
#[derive(Clone, Debug, PartialEq)]
pub struct Y4mHeader {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub chroma: Chroma,
}

impl Y4mHeader {
    pub fn new(width: u32, height: u32, fps: f64, chroma: Chroma) -> Self {
        let (fps_num, fps_den) = fps_to_ratio(fps);
        Self {
            width,
            height,
            fps_num,
            fps_den,
            chroma,
        }
    }

    /// Parse the header line without its trailing newline.
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_ascii_whitespace();
        if tokens.next() != Some(STREAM_MAGIC) {
            bail!("not a YUV4MPEG2 stream");
        }
        let mut width = None;
        let mut height = None;
        let mut fps = None;
        let mut chroma = Chroma::C420;
        for token in tokens {
            let mut chars = token.chars();
            let key = chars.next();
            let value = chars.as_str();
            match key {
                Some('W') => width = Some(parse_u32(value, "width")?),
                Some('H') => height = Some(parse_u32(value, "height")?),
                Some('F') => {
                    let (num, den) = value
                        .split_once(':')
                        .ok_or_else(|| anyhow!("malformed y4m frame rate '{}'", value))?;
                    fps = Some((parse_u32(num, "fps")?, parse_u32(den, "fps")?));
                }
                Some('C') => chroma = Chroma::parse(value)?,
                // Interlacing, aspect and extension tags do not affect decoding.
                _ => {}
            }
        }
        let width = width.ok_or_else(|| anyhow!("y4m header missing width"))?;
        let height = height.ok_or_else(|| anyhow!("y4m header missing height"))?;
        if width == 0 || height == 0 {
            bail!("y4m frame size must be non-zero");
        }
        let pixels = u64::from(width).checked_mul(u64::from(height));
        if pixels.map_or(true, |p| p > MAX_FRAME_PIXELS) {
            bail!(
                "y4m frame size {}x{} exceeds {} pixels",
                width,
                height,
                MAX_FRAME_PIXELS
            );
        }
        let (fps_num, fps_den) = fps.ok_or_else(|| anyhow!("y4m header missing frame rate"))?;
        if fps_num == 0 || fps_den == 0 {
            bail!("y4m frame rate must be non-zero");
        }
        Ok(Self {
            width,
            height,
            fps_num,
            fps_den,
            chroma,
        })
    }

    /// Header line including the trailing newline.
    pub fn encode(&self) -> String {
        format!(
            "{} W{} H{} F{}:{} Ip A1:1 C{}\n",
            STREAM_MAGIC,
            self.width,
            self.height,
            self.fps_num,
            self.fps_den,
            self.chroma.tag()
        )
    }

    pub fn fps(&self) -> f64 {
        self.fps_num as f64 / self.fps_den as f64
    }

    /// Bytes of planar payload per frame (excluding the FRAME line).
    pub fn frame_payload_len(&self) -> usize {
        let (w, h) = (self.width as usize, self.height as usize);
        let (cw, ch) = self.chroma.chroma_dims(w, h);
        w * h + 2 * cw * ch
    }

    /// Presentation time of the frame at `index`.
    pub fn timestamp_ms(&self, index: u64) -> f64 {
        index as f64 * 1000.0 * self.fps_den as f64 / self.fps_num as f64
    }
}

fn parse_u32(value: &str, what: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid y4m {} '{}'", what, value))
}

/// Express a frame rate as a reduced rational with millihertz precision.
pub fn fps_to_ratio(fps: f64) -> (u32, u32) {
    if !fps.is_finite() || fps <= 0.0 {
        return (25, 1);
    }
    let num = (fps * 1000.0).round().max(1.0) as u32;
    let den = 1000;
    let divisor = gcd(num, den);
    (num / divisor, den / divisor)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

// ----------------------------------------------------------------------------
// Colour conversion
// ----------------------------------------------------------------------------

/// Convert packed RGB24 into planar Y, U, V (4:4:4).
pub fn rgb_to_yuv444(rgb: &[u8], out: &mut Vec<u8>) {
    let pixels = rgb.len() / RGB_CHANNELS;
    out.clear();
    out.resize(pixels * 3, 0);
    let (y_plane, chroma) = out.split_at_mut(pixels);
    let (u_plane, v_plane) = chroma.split_at_mut(pixels);
    for (i, px) in rgb.chunks_exact(RGB_CHANNELS).enumerate() {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        y_plane[i] = luma_of(px[0], px[1], px[2]);
        u_plane[i] = clamp_u8(-0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0);
        v_plane[i] = clamp_u8(0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0);
    }
}

/// Convert one planar frame payload into packed RGB24.
pub fn yuv_to_rgb(header: &Y4mHeader, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() != header.frame_payload_len() {
        bail!(
            "y4m frame payload is {} bytes, expected {}",
            payload.len(),
            header.frame_payload_len()
        );
    }
    let (w, h) = (header.width as usize, header.height as usize);
    let (cw, ch) = header.chroma.chroma_dims(w, h);
    let (y_plane, chroma) = payload.split_at(w * h);
    let (u_plane, v_plane) = chroma.split_at(cw * ch);

    let mut rgb = Vec::with_capacity(w * h * RGB_CHANNELS);
    for row in 0..h {
        for col in 0..w {
            let y = y_plane[row * w + col] as f32;
            let (u, v) = match header.chroma {
                Chroma::Mono => (0.0, 0.0),
                Chroma::C444 => {
                    let idx = row * w + col;
                    (u_plane[idx] as f32 - 128.0, v_plane[idx] as f32 - 128.0)
                }
                Chroma::C420 => {
                    let idx = (row / 2) * cw + col / 2;
                    (u_plane[idx] as f32 - 128.0, v_plane[idx] as f32 - 128.0)
                }
            };
            rgb.push(clamp_u8(y + 1.402 * v));
            rgb.push(clamp_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(clamp_u8(y + 1.772 * u));
        }
    }
    Ok(rgb)
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
