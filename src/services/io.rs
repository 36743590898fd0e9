//! Image I/O operations service
//!
//! This module separates file I/O operations from compositing logic,
//! making the drivers testable without touching the filesystem.

use crate::error::{PipelineError, Result};
use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Write};
use std::path::Path;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an input image, normalized to 8-bit gray or 8-bit RGB
    ///
    /// # Arguments
    /// * `path` - Path to the image file
    ///
    /// # Returns
    /// * `Ok(DynamicImage)` - `ImageLuma8` or `ImageRgb8`
    /// * `Err(PipelineError)` - Failed to load image
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bgcompose::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(PipelineError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        let image = match image::open(path_ref) {
            Ok(img) => img,
            Err(e) => {
                // Extension may lie about the content, retry with format sniffing
                tracing::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    PipelineError::file_io_error("read image data", path_ref, &io_err)
                })?;

                Self::load_from_bytes(&data)?
            },
        };

        Ok(Self::normalize(image, path_ref))
    }

    /// Load a background image; same normalization as input images
    pub fn load_background<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();
        let image = Self::load_image(path_ref)?;
        tracing::info!(
            path = %path_ref.display(),
            width = image.width(),
            height = image.height(),
            "Loaded background image"
        );
        Ok(image)
    }

    /// Decode an image from memory
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(PipelineError::from)
    }

    /// Encode an image as PNG in memory
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }

    /// Encode `image` as PNG and write it to `path` without ever exposing a partial file
    pub fn save_png<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
        let encoded = Self::encode_png(image)?;
        Self::write_atomically(&encoded, path)
    }

    /// Write `bytes` to a temporary file next to `path`, then rename it into place
    ///
    /// Every failure is reported as [`PipelineError::Output`] naming `path`.
    pub fn write_atomically<P: AsRef<Path>>(bytes: &[u8], path: P) -> Result<()> {
        let path_ref = path.as_ref();
        let parent = match path_ref.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let failed = |step: &str, e: &std::io::Error| {
            PipelineError::output(format!("failed to {} '{}': {}", step, path_ref.display(), e))
        };

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| failed("create temporary file for", &e))?;
        temp.write_all(bytes)
            .and_then(|()| temp.flush())
            .map_err(|e| failed("write", &e))?;
        temp.persist(path_ref)
            .map_err(|e| failed("rename into", &e.error))?;

        Ok(())
    }

    fn normalize(image: DynamicImage, path: &Path) -> DynamicImage {
        match image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
            other => {
                tracing::debug!(
                    "Converting {} from {:?} to RGB",
                    path.display(),
                    other.color()
                );
                DynamicImage::ImageRgb8(other.to_rgb8())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn test_load_nonexistent_file() {
        let result = ImageIOService::load_image("/nonexistent/path/image.png");
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_rgba_input_is_normalized_to_rgb() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rgba.png");
        RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 4]))
            .save(&path)
            .unwrap();

        let loaded = ImageIOService::load_image(&path).unwrap();
        assert!(matches!(loaded, DynamicImage::ImageRgb8(_)));
        assert_eq!(loaded.to_rgb8().get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_misnamed_file_falls_back_to_content_detection() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("actually_png.jpg");
        let png = ImageIOService::encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            2,
            2,
            Rgb([7, 8, 9]),
        )))
        .unwrap();
        std::fs::write(&path, png).unwrap();

        let loaded = ImageIOService::load_image(&path).unwrap();
        assert_eq!(loaded.to_rgb8().get_pixel(1, 1), &Rgb([7, 8, 9]));
    }

    #[test]
    fn test_garbage_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(ImageIOService::load_image(&path).is_err());
    }

    #[test]
    fn test_save_png_writes_png_regardless_of_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("frame.jpg");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([5, 6, 7])));

        ImageIOService::save_png(&image, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &[0x89, 0x50, 0x4E, 0x47]);
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temporary file must not be left behind");
    }

    #[test]
    fn test_save_into_missing_directory_fails_without_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("out.png");
        let image = DynamicImage::ImageRgb8(RgbImage::new(2, 2));

        let err = ImageIOService::save_png(&image, &path).unwrap_err();
        assert!(matches!(err, PipelineError::Output(_)));
        assert_eq!(err.category(), "output");
        assert!(err.to_string().contains("out.png"));
        assert!(!path.exists());
    }
}
