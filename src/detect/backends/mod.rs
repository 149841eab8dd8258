pub mod diff;
pub mod exact;

pub use diff::FrameDiffClassifier;
pub use exact::ExactChangeClassifier;
