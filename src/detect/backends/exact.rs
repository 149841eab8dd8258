use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::{ensure_comparable, MotionClassifier};
use crate::frame::Frame;

/// Reports motion whenever the two frames are not byte-identical.
///
/// Useful for synthetic or screen-capture input where any change matters.
#[derive(Default)]
pub struct ExactChangeClassifier;

impl ExactChangeClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl MotionClassifier for ExactChangeClassifier {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn classify(&mut self, previous: &Frame, current: &Frame) -> Result<bool> {
        ensure_comparable(previous, current)?;
        let previous_hash: [u8; 32] = Sha256::digest(previous.pixels()).into();
        let current_hash: [u8; 32] = Sha256::digest(current.pixels()).into();
        Ok(previous_hash != current_hash)
    }
}
