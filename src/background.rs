//! Background image adaptation
//!
//! A background image is loaded once and never mutated. Each output size needs a
//! resized (and possibly recolored) copy of it; [`adapt_background`] derives that
//! copy, reusing the previous one when it already fits.

use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Pixel layout of images flowing through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// 8-bit single channel
    Luma,
    /// 8-bit three channel
    Rgb,
    /// Anything else (alpha, 16-bit, float)
    Other,
}

impl ColorMode {
    /// Color mode of an image
    #[must_use]
    pub fn of(image: &DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(_) => Self::Luma,
            DynamicImage::ImageRgb8(_) => Self::Rgb,
            _ => Self::Other,
        }
    }
}

/// Produce a background matching `target_size` and `target_mode`.
///
/// Returns `None` when there is no original background. `cached` is the result
/// of a previous call and is returned untouched if it already matches.
///
/// Resizing always starts from `original`, never from a previously resized copy.
/// A mode change restarts from `original` when the cached copy was itself
/// recolored, since that conversion may have dropped channel information.
/// The only conversion performed is to RGB, so a gray target is reached only
/// when the original is gray.
#[must_use]
pub fn adapt_background(
    original: Option<&DynamicImage>,
    cached: Option<DynamicImage>,
    target_size: (u32, u32),
    target_mode: ColorMode,
) -> Option<DynamicImage> {
    let original = original?;

    let base = match cached {
        Some(cached) if cached.dimensions() != target_size => None,
        Some(cached)
            if ColorMode::of(&cached) != target_mode
                && ColorMode::of(original) != ColorMode::of(&cached) =>
        {
            None
        },
        other => other,
    };

    let mut adapted = match base {
        Some(cached) => cached,
        None if original.dimensions() != target_size => {
            tracing::debug!(
                from_width = original.width(),
                from_height = original.height(),
                to_width = target_size.0,
                to_height = target_size.1,
                "Scaling background image"
            );
            original.resize_exact(target_size.0, target_size.1, FilterType::Lanczos3)
        },
        None => original.clone(),
    };

    if ColorMode::of(&adapted) != target_mode && ColorMode::of(&adapted) != ColorMode::Rgb {
        tracing::debug!("Converting background image to RGB");
        adapted = DynamicImage::ImageRgb8(adapted.to_rgb8());
    }

    Some(adapted)
}
