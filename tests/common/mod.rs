//! Shared helpers for integration tests

#![allow(dead_code)]

use bgcompose::{MaskProvider, OutputMode, PipelineConfig, ProcessingContext, Result};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use std::path::Path;
use std::sync::Arc;

/// Mask that keeps the left half of every image
pub fn left_half_provider() -> Arc<dyn MaskProvider> {
    Arc::new(|config: &PipelineConfig, image: &DynamicImage| -> Result<GrayImage> {
        let half = image.width() / 2;
        Ok(GrayImage::from_fn(image.width(), image.height(), |x, _| {
            let keep = (x < half) != config.invert_mask;
            Luma([if keep { 255 } else { 0 }])
        }))
    })
}

pub fn context(mode: OutputMode, threads: usize) -> ProcessingContext {
    let config = PipelineConfig::builder()
        .output_mode(mode)
        .thread_count(threads)
        .background_color([0, 0, 255])
        .build()
        .expect("valid config");
    ProcessingContext::new(config, left_half_provider()).expect("context")
}

pub fn write_rgb(path: &Path, width: u32, height: u32, color: [u8; 3]) {
    RgbImage::from_pixel(width, height, Rgb(color))
        .save(path)
        .expect("write fixture");
}
