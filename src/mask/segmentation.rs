//! Generic foreground segmentation masks
//!
//! Wraps a segmentation model that produces a probability map at its own
//! resolution. The map is stretched to the full 0..=1 range, optionally
//! inverted, quantized and resized back to the input size.

use super::MaskProvider;
use crate::{
    config::PipelineConfig,
    error::{PipelineError, Result},
};
use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, Luma};
use ndarray::Array2;

/// Segmentation model producing a foreground probability map
///
/// Implementations are shared by all workers and must tolerate concurrent calls.
pub trait ForegroundSegmenter: Send + Sync {
    /// Probability map indexed as `[row, column]`
    fn segment(&self, image: &DynamicImage) -> Result<Array2<f32>>;

    fn name(&self) -> &str {
        "segmenter"
    }
}

/// Mask provider backed by a [`ForegroundSegmenter`]
pub struct SegmentationMaskProvider {
    segmenter: Box<dyn ForegroundSegmenter>,
}

impl SegmentationMaskProvider {
    pub fn new(segmenter: Box<dyn ForegroundSegmenter>) -> Self {
        Self { segmenter }
    }
}

impl MaskProvider for SegmentationMaskProvider {
    fn compute_mask(&self, config: &PipelineConfig, image: &DynamicImage) -> Result<GrayImage> {
        let probabilities = self.segmenter.segment(image)?;
        let mask = probability_map_to_mask(&probabilities, config.invert_mask)?;

        if mask.dimensions() == (image.width(), image.height()) {
            return Ok(mask);
        }
        Ok(imageops::resize(
            &mask,
            image.width(),
            image.height(),
            FilterType::Lanczos3,
        ))
    }

    fn name(&self) -> &str {
        self.segmenter.name()
    }
}

/// Min-max normalize, optionally invert, and quantize a probability map
pub fn probability_map_to_mask(map: &Array2<f32>, invert: bool) -> Result<GrayImage> {
    let (rows, cols) = map.dim();
    if rows == 0 || cols == 0 {
        return Err(PipelineError::mask("segmenter returned an empty map"));
    }

    if map.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::mask("segmenter returned non-finite values"));
    }
    let (min, max) = map
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    Ok(GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        let raw = map[[y as usize, x as usize]];
        // A flat map carries no contrast to stretch
        let mut v = if range > 0.0 { (raw - min) / range } else { raw };
        if invert {
            v = 1.0 - v;
        }
        Luma([(v.clamp(0.0, 1.0) * 255.0).round() as u8])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use ndarray::array;

    struct FixedSegmenter(Array2<f32>);

    impl ForegroundSegmenter for FixedSegmenter {
        fn segment(&self, _image: &DynamicImage) -> Result<Array2<f32>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_map_is_stretched_to_full_range() {
        let mask = probability_map_to_mask(&array![[2.0, 6.0], [3.0, 2.0]], false).unwrap();
        assert_eq!(mask.dimensions(), (2, 2));
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 0)[0], 255);
        assert_eq!(mask.get_pixel(0, 1)[0], 64);
    }

    #[test]
    fn test_inverted_map() {
        let mask = probability_map_to_mask(&array![[0.0, 1.0]], true).unwrap();
        assert_eq!(mask.as_raw(), &vec![255, 0]);
    }

    #[test]
    fn test_flat_map_is_not_stretched() {
        let mask = probability_map_to_mask(&array![[0.0, 0.0], [0.0, 0.0]], false).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_invalid_maps_are_rejected() {
        assert!(probability_map_to_mask(&Array2::zeros((0, 4)), false).is_err());
        assert!(probability_map_to_mask(&array![[f32::NAN, 1.0]], false).is_err());
    }

    #[test]
    fn test_mask_is_resized_to_input() {
        let provider = SegmentationMaskProvider::new(Box::new(FixedSegmenter(array![
            [0.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 1.0, 0.0],
            [0.0, 1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 0.0]
        ])));
        let image = DynamicImage::ImageRgb8(RgbImage::new(32, 24));
        let mask = provider
            .compute_mask(&PipelineConfig::default(), &image)
            .unwrap();

        assert_eq!(mask.dimensions(), (32, 24));
        assert!(mask.get_pixel(16, 12)[0] > 200);
        assert!(mask.get_pixel(0, 0)[0] < 50);
        assert_eq!(provider.name(), "segmenter");
    }
}
