mod backend;
mod backends;

pub use backend::{create_classifier, ClassifierKind, ClassifierSettings, MotionClassifier};
pub use backends::{ExactChangeClassifier, FrameDiffClassifier};
