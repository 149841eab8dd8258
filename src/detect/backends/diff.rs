use anyhow::{anyhow, Result};
use image::{imageops, GrayImage};

use crate::detect::backend::{ensure_comparable, MotionClassifier};
use crate::frame::{luma_of, Frame, RGB_CHANNELS};

/// Gaussian sigma matching a 5x5 kernel.
const BLUR_SIGMA: f32 = 1.1;
/// 3x3 dilation passes applied to the binary mask.
const DILATE_ITERATIONS: u32 = 3;

/// Frame-differencing motion classifier.
///
/// Pipeline: absolute difference -> luma -> blur -> binary threshold ->
/// dilation -> 8-connected regions. Motion is present when any region covers
/// more than `contour_area_threshold` pixels.
pub struct FrameDiffClassifier {
    threshold: u8,
    contour_area_threshold: f64,
}

impl FrameDiffClassifier {
    pub fn new(threshold: u8, contour_area_threshold: f64) -> Self {
        Self {
            threshold,
            contour_area_threshold,
        }
    }

    /// Binary motion mask (0 or 255 per pixel) after blur, threshold and dilation.
    pub fn motion_mask(&self, previous: &Frame, current: &Frame) -> Result<Vec<u8>> {
        ensure_comparable(previous, current)?;
        let (width, height) = (current.width, current.height);

        let diff: Vec<u8> = previous
            .pixels()
            .chunks_exact(RGB_CHANNELS)
            .zip(current.pixels().chunks_exact(RGB_CHANNELS))
            .map(|(a, b)| luma_of(a[0].abs_diff(b[0]), a[1].abs_diff(b[1]), a[2].abs_diff(b[2])))
            .collect();
        let gray = GrayImage::from_raw(width, height, diff)
            .ok_or_else(|| anyhow!("difference image does not match {}x{}", width, height))?;
        let blurred = imageops::blur(&gray, BLUR_SIGMA);

        let mut mask: Vec<u8> = blurred
            .into_raw()
            .into_iter()
            .map(|v| if v > self.threshold { 255 } else { 0 })
            .collect();
        for _ in 0..DILATE_ITERATIONS {
            mask = dilate(&mask, width as usize, height as usize);
        }
        Ok(mask)
    }

    /// Pixel area of the largest moving region.
    pub fn largest_region(&self, previous: &Frame, current: &Frame) -> Result<usize> {
        let mask = self.motion_mask(previous, current)?;
        Ok(largest_region_area(
            &mask,
            current.width as usize,
            current.height as usize,
            None,
        ))
    }
}

impl MotionClassifier for FrameDiffClassifier {
    fn name(&self) -> &'static str {
        "diff"
    }

    fn classify(&mut self, previous: &Frame, current: &Frame) -> Result<bool> {
        let mask = self.motion_mask(previous, current)?;
        let area = largest_region_area(
            &mask,
            current.width as usize,
            current.height as usize,
            Some(self.contour_area_threshold),
        );
        Ok(area as f64 > self.contour_area_threshold)
    }
}

/// 3x3 max filter over a binary mask.
fn dilate(mask: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; mask.len()];
    for y in 0..height {
        for x in 0..width {
            if mask[y * width + x] == 0 {
                continue;
            }
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    out[ny * width + nx] = 255;
                }
            }
        }
    }
    out
}

/// Area of the largest 8-connected region of set pixels.
///
/// With `stop_above`, returns as soon as a region exceeds that area.
fn largest_region_area(mask: &[u8], width: usize, height: usize, stop_above: Option<f64>) -> usize {
    let mut visited = vec![false; mask.len()];
    let mut stack = Vec::new();
    let mut largest = 0usize;

    for start in 0..mask.len() {
        if mask[start] == 0 || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let mut area = 0usize;

        while let Some(idx) = stack.pop() {
            area += 1;
            let (x, y) = (idx % width, idx / width);
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    let n = ny * width + nx;
                    if mask[n] != 0 && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }

        largest = largest.max(area);
        if stop_above.is_some_and(|limit| largest as f64 > limit) {
            break;
        }
    }
    largest
}
