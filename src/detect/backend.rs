use anyhow::{bail, Result};
use serde::Deserialize;

use crate::frame::Frame;

use super::backends::{ExactChangeClassifier, FrameDiffClassifier};

/// Default binary threshold applied to the blurred difference image.
pub const DEFAULT_PIXEL_THRESHOLD: u8 = 30;
/// Default minimum region area (pixels) that counts as motion.
pub const DEFAULT_CONTOUR_AREA_THRESHOLD: f64 = 1000.0;

/// Per-frame motion classifier.
///
/// Implementations compare two consecutive frames and keep no state between
/// calls, so the same pair always yields the same verdict.
pub trait MotionClassifier {
    /// Classifier identifier.
    fn name(&self) -> &'static str;

    /// Returns true when motion is present between `previous` and `current`.
    ///
    /// Frames of different shape are a classifier failure.
    fn classify(&mut self, previous: &Frame, current: &Frame) -> Result<bool>;
}

/// Which classifier a run uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// Blurred frame difference with a connected-region area filter.
    #[default]
    Diff,
    /// Any pixel change at all.
    Exact,
}

impl ClassifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassifierKind::Diff => "diff",
            ClassifierKind::Exact => "exact",
        }
    }
}

/// Classifier tuning shared by all backends.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierSettings {
    pub kind: ClassifierKind,
    /// Per-pixel intensity change that counts as moving.
    pub threshold: u8,
    /// Moving regions must be strictly larger than this many pixels.
    pub contour_area_threshold: f64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::Diff,
            threshold: DEFAULT_PIXEL_THRESHOLD,
            contour_area_threshold: DEFAULT_CONTOUR_AREA_THRESHOLD,
        }
    }
}

pub fn create_classifier(settings: &ClassifierSettings) -> Box<dyn MotionClassifier> {
    match settings.kind {
        ClassifierKind::Diff => Box::new(FrameDiffClassifier::new(
            settings.threshold,
            settings.contour_area_threshold,
        )),
        ClassifierKind::Exact => Box::new(ExactChangeClassifier::new()),
    }
}

/// Shared shape check for frame pairs.
pub(crate) fn ensure_comparable(previous: &Frame, current: &Frame) -> Result<()> {
    if !previous.same_shape(current) {
        bail!(
            "frame size changed mid-stream ({}x{} -> {}x{})",
            previous.width,
            previous.height,
            current.width,
            current.height
        );
    }
    if previous.pixels().len() != current.pixels().len() {
        bail!("frame buffers differ in length");
    }
    Ok(())
}
