//! Inference backends for mask providers
//!
//! - Tract segmentation backend (pure Rust, no external dependencies)
//! - Tract face detector and face mesh landmarker

#[cfg(feature = "tract")]
pub mod face;
#[cfg(feature = "tract")]
pub mod tract;

#[cfg(feature = "tract")]
pub use self::face::{face_outline_provider, TractFaceDetector, TractFaceLandmarker};
#[cfg(feature = "tract")]
pub use self::tract::TractSegmenter;
