//! Decoded video frames.
//!
//! - `Frame`: RGB24 pixels plus the presentation timestamp on the stream clock.
//! - `FrameGeometry`: dimensions and rate a writer needs to open a clip.
//!
//! Frames are owned transiently by the run driver. Only the previous frame is
//! retained, as the classifier's reference.

use anyhow::{anyhow, Result};

/// Bytes per RGB24 pixel.
pub const RGB_CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded frame. Pixels are packed RGB24, row-major, no padding.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp in milliseconds (stream clock, not wall clock).
    pub timestamp_ms: f64,
}

impl Frame {
    /// Wrap an RGB24 buffer. Fails if the buffer length does not match the
    /// dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ms: f64) -> Result<Self> {
        let expected = rgb_len(width, height);
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} rgb24",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms,
        })
    }

    /// A frame filled with one colour.
    pub fn solid(width: u32, height: u32, timestamp_ms: f64, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(rgb_len(width, height))
            .collect();
        Self {
            data,
            width,
            height,
            timestamp_ms,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// BT.601 luma plane, one byte per pixel.
    pub fn luma(&self) -> Vec<u8> {
        self.data
            .chunks_exact(RGB_CHANNELS)
            .map(|px| luma_of(px[0], px[1], px[2]))
            .collect()
    }

    /// Same dimensions as `other`.
    pub fn same_shape(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Byte length of a packed RGB24 image.
pub fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * RGB_CHANNELS
}

/// BT.601 luma, rounded.
pub fn luma_of(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

// ----------------------------------------------------------------------------
// FrameGeometry
// ----------------------------------------------------------------------------

/// Stream properties a clip writer is opened with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 2, 2, 0.0).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2, 0.0).is_ok());
    }

    #[test]
    fn solid_fills_every_pixel() {
        let frame = Frame::solid(3, 2, 40.0, [10, 20, 30]);
        assert_eq!(frame.pixels().len(), 18);
        assert!(frame.pixels().chunks_exact(3).all(|px| px == [10, 20, 30]));
        assert_eq!(frame.timestamp_ms, 40.0);
    }

    #[test]
    fn luma_weights_channels() {
        let white = Frame::solid(1, 1, 0.0, [255, 255, 255]);
        assert_eq!(white.luma(), vec![255]);
        let green = Frame::solid(1, 1, 0.0, [0, 255, 0]);
        assert_eq!(green.luma(), vec![150]);
    }
}
