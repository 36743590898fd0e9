//! Mask providers
//!
//! A mask provider turns an image into a single channel mask of the same size
//! (0 = background, 255 = foreground). Providers are chosen once at startup
//! and shared by every worker thread, so they must be `Send + Sync`; detectors
//! that are not thread-safe are serialized behind a mutex inside the provider.

pub mod face;
pub mod segmentation;

pub use face::{FaceBox, FaceCascade, FaceLandmarker, FaceOutlineMaskProvider, OutlinePoint};
pub use segmentation::{ForegroundSegmenter, SegmentationMaskProvider};

use crate::{
    config::PipelineConfig,
    error::{PipelineError, Result},
};
use image::{DynamicImage, GenericImageView, GrayImage};

/// Capability that computes a foreground mask for an image
pub trait MaskProvider: Send + Sync {
    /// Compute the mask for `image`, honoring `config.invert_mask`
    ///
    /// A detector that finds nothing returns an empty (or inverted empty)
    /// mask and logs a warning instead of failing.
    fn compute_mask(&self, config: &PipelineConfig, image: &DynamicImage) -> Result<GrayImage>;

    /// Short name for logs
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> MaskProvider for F
where
    F: Fn(&PipelineConfig, &DynamicImage) -> Result<GrayImage> + Send + Sync,
{
    fn compute_mask(&self, config: &PipelineConfig, image: &DynamicImage) -> Result<GrayImage> {
        self(config, image)
    }
}

/// Run `provider` and check the mask matches the image dimensions
pub fn compute_checked_mask(
    provider: &dyn MaskProvider,
    config: &PipelineConfig,
    image: &DynamicImage,
) -> Result<GrayImage> {
    let mask = provider.compute_mask(config, image)?;
    if mask.dimensions() != image.dimensions() {
        return Err(PipelineError::mask(format!(
            "{} provider returned a {}x{} mask for a {}x{} image",
            provider.name(),
            mask.width(),
            mask.height(),
            image.width(),
            image.height()
        )));
    }
    Ok(mask)
}

/// Invert every mask value in place
pub fn invert_mask(mask: &mut GrayImage) {
    for pixel in mask.pixels_mut() {
        pixel[0] = 255 - pixel[0];
    }
}

/// All-zero mask, inverted when requested
#[must_use]
pub fn empty_mask(width: u32, height: u32, invert: bool) -> GrayImage {
    GrayImage::from_pixel(width, height, image::Luma([if invert { 255 } else { 0 }]))
}
