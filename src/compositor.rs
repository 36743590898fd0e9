//! Output compositing
//!
//! Turns an input image and its mask into one of the three output
//! representations and writes the result as PNG.

use crate::{
    background::ColorMode,
    config::OutputMode,
    error::{PipelineError, Result},
    services::ImageIOService,
};
use image::{DynamicImage, GenericImageView, GrayImage, ImageBuffer, LumaA, Pixel, Rgb, RgbImage};
use std::borrow::Cow;
use std::path::Path;

/// Builds output images from (input, mask, background) triples
#[derive(Debug, Clone, Copy)]
pub struct OutputCompositor {
    mode: OutputMode,
    background_color: [u8; 3],
}

impl OutputCompositor {
    #[must_use]
    pub fn new(mode: OutputMode, background_color: [u8; 3]) -> Self {
        Self {
            mode,
            background_color,
        }
    }

    #[must_use]
    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Produce the output image without writing it
    ///
    /// `background` is only consulted in composited mode; when absent a solid
    /// image of the configured color is used.
    pub fn compose(
        &self,
        input: &DynamicImage,
        mask: &GrayImage,
        background: Option<&DynamicImage>,
    ) -> Result<DynamicImage> {
        if input.dimensions() != mask.dimensions() {
            return Err(PipelineError::mask(format!(
                "mask is {}x{} but image is {}x{}",
                mask.width(),
                mask.height(),
                input.width(),
                input.height()
            )));
        }

        match self.mode {
            OutputMode::MaskOnly => Ok(DynamicImage::ImageLuma8(mask.clone())),
            OutputMode::ImageWithAlpha => Ok(with_alpha(input, mask)),
            OutputMode::CompositedBackground => self.composite(input, mask, background),
        }
    }

    /// Compose and write the output to `destination` as PNG
    ///
    /// Nothing is left at `destination` when this fails.
    pub fn write_output<P: AsRef<Path>>(
        &self,
        input: &DynamicImage,
        mask: &GrayImage,
        background: Option<&DynamicImage>,
        destination: P,
    ) -> Result<()> {
        let output = self.compose(input, mask, background)?;
        ImageIOService::save_png(&output, destination)
    }

    fn composite(
        &self,
        input: &DynamicImage,
        mask: &GrayImage,
        background: Option<&DynamicImage>,
    ) -> Result<DynamicImage> {
        let (width, height) = input.dimensions();

        if let Some(background) = background {
            if background.dimensions() != (width, height) {
                return Err(PipelineError::internal(format!(
                    "background is {}x{} but image is {}x{}",
                    background.width(),
                    background.height(),
                    width,
                    height
                )));
            }

            // Gray output only when both sides are gray
            if let (DynamicImage::ImageLuma8(fg), DynamicImage::ImageLuma8(bg)) =
                (input, background)
            {
                let blended = GrayImage::from_fn(width, height, |x, y| {
                    let m = mask.get_pixel(x, y)[0];
                    image::Luma([blend(fg.get_pixel(x, y)[0], bg.get_pixel(x, y)[0], m)])
                });
                return Ok(DynamicImage::ImageLuma8(blended));
            }
        }

        let foreground = as_rgb(input);
        let background = match background {
            Some(bg) => as_rgb(bg),
            None => Cow::Owned(RgbImage::from_pixel(
                width,
                height,
                Rgb(self.background_color),
            )),
        };

        let blended = RgbImage::from_fn(width, height, |x, y| {
            let m = mask.get_pixel(x, y)[0];
            let fg = foreground.get_pixel(x, y);
            let bg = background.get_pixel(x, y);
            fg.map2(bg, |f, b| blend(f, b, m))
        });

        Ok(DynamicImage::ImageRgb8(blended))
    }
}

/// Linear mix: `fg` where the mask is 255, `bg` where it is 0
#[inline]
#[must_use]
pub fn blend(fg: u8, bg: u8, mask: u8) -> u8 {
    let m = u32::from(mask);
    ((u32::from(fg) * m + u32::from(bg) * (255 - m) + 127) / 255) as u8
}

fn with_alpha(input: &DynamicImage, mask: &GrayImage) -> DynamicImage {
    match ColorMode::of(input) {
        ColorMode::Luma => {
            let gray = input.to_luma8();
            let out: ImageBuffer<LumaA<u8>, Vec<u8>> =
                ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
                    LumaA([gray.get_pixel(x, y)[0], mask.get_pixel(x, y)[0]])
                });
            DynamicImage::ImageLumaA8(out)
        },
        ColorMode::Rgb | ColorMode::Other => {
            let mut rgba = input.to_rgba8();
            for (pixel, alpha) in rgba.pixels_mut().zip(mask.pixels()) {
                pixel[3] = alpha[0];
            }
            DynamicImage::ImageRgba8(rgba)
        },
    }
}

fn as_rgb(image: &DynamicImage) -> Cow<'_, RgbImage> {
    match image {
        DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
        other => Cow::Owned(other.to_rgb8()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::TempDir;

    fn two_pixel_input() -> DynamicImage {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        DynamicImage::ImageRgb8(img)
    }

    fn two_pixel_mask() -> GrayImage {
        GrayImage::from_raw(2, 1, vec![255, 0]).unwrap()
    }

    #[test]
    fn test_blend_endpoints_and_midpoint() {
        assert_eq!(blend(200, 10, 255), 200);
        assert_eq!(blend(200, 10, 0), 10);
        assert_eq!(blend(255, 0, 128), 128);
        assert_eq!(blend(0, 255, 128), 127);
    }

    #[test]
    fn test_composite_with_background_color() {
        let compositor = OutputCompositor::new(OutputMode::CompositedBackground, [0, 0, 255]);
        let out = compositor
            .compose(&two_pixel_input(), &two_pixel_mask(), None)
            .unwrap()
            .to_rgb8();

        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_composite_with_background_image() {
        let compositor = OutputCompositor::new(OutputMode::CompositedBackground, [0, 0, 255]);
        let background = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 1, Rgb([9, 9, 9])));
        let out = compositor
            .compose(&two_pixel_input(), &two_pixel_mask(), Some(&background))
            .unwrap()
            .to_rgb8();

        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([9, 9, 9]));
    }

    #[test]
    fn test_gray_input_and_gray_background_stay_gray() {
        let compositor = OutputCompositor::new(OutputMode::CompositedBackground, [0, 0, 0]);
        let input = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 1, Luma([200])));
        let background = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 1, Luma([50])));
        let out = compositor
            .compose(&input, &two_pixel_mask(), Some(&background))
            .unwrap();

        let DynamicImage::ImageLuma8(gray) = out else {
            panic!("expected gray output");
        };
        assert_eq!(gray.as_raw(), &vec![200, 50]);
    }

    #[test]
    fn test_gray_input_with_color_fill_becomes_rgb() {
        let compositor = OutputCompositor::new(OutputMode::CompositedBackground, [0, 0, 255]);
        let input = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 1, Luma([200])));
        let out = compositor.compose(&input, &two_pixel_mask(), None).unwrap();

        let rgb = out.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([200, 200, 200]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_mask_only_mode() {
        let compositor = OutputCompositor::new(OutputMode::MaskOnly, [0, 0, 0]);
        let out = compositor
            .compose(&two_pixel_input(), &two_pixel_mask(), None)
            .unwrap();
        let DynamicImage::ImageLuma8(mask) = out else {
            panic!("expected single channel output");
        };
        assert_eq!(mask.as_raw(), &vec![255, 0]);
    }

    #[test]
    fn test_image_with_alpha_mode() {
        let compositor = OutputCompositor::new(OutputMode::ImageWithAlpha, [0, 0, 0]);
        let out = compositor
            .compose(&two_pixel_input(), &two_pixel_mask(), None)
            .unwrap();
        let DynamicImage::ImageRgba8(rgba) = out else {
            panic!("expected RGBA output");
        };
        assert_eq!(rgba.as_raw(), &vec![255, 0, 0, 255, 0, 255, 0, 0]);
    }

    #[test]
    fn test_mismatched_mask_is_rejected() {
        let compositor = OutputCompositor::new(OutputMode::MaskOnly, [0, 0, 0]);
        let mask = GrayImage::new(3, 3);
        let err = compositor
            .compose(&two_pixel_input(), &mask, None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Mask(_)));
    }

    #[test]
    fn test_write_failure_leaves_no_file() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("no_such_dir").join("out.png");
        let compositor = OutputCompositor::new(OutputMode::CompositedBackground, [0, 0, 0]);

        let result =
            compositor.write_output(&two_pixel_input(), &two_pixel_mask(), None, &destination);
        assert!(result.is_err());
        assert!(!destination.exists());
    }

    #[test]
    fn test_written_output_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("out.png");
        let compositor = OutputCompositor::new(OutputMode::CompositedBackground, [0, 0, 255]);

        compositor
            .write_output(&two_pixel_input(), &two_pixel_mask(), None, &destination)
            .unwrap();

        let written = image::open(&destination).unwrap().to_rgb8();
        assert_eq!(written.as_raw(), &vec![255, 0, 0, 0, 0, 255]);
    }
}
