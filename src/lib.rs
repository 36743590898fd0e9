#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bgcompose
//!
//! Multi-threaded foreground mask compositing for image directories and raw RGB
//! frame streams.
//!
//! Every image goes through the same three steps: a [`MaskProvider`] computes a
//! single channel foreground mask, the background is adapted to the image's
//! size and color mode, and the [`OutputCompositor`] writes a PNG in one of
//! three output modes (composited over a new background, image with alpha, or
//! mask only).
//!
//! ## Features
//!
//! - **Directory mode**: static partitioning of a sorted file list across worker threads
//! - **Stream mode**: bounded producer/consumer queue over headerless RGB24 frames
//! - **Pluggable masks**: segmentation models or face outlines, both on Tract (pure Rust)
//! - **Background reuse**: adapted backgrounds are cached per worker
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgcompose::{run_directory, OutputMode, PipelineConfig, ProcessingContext, Result};
//! use image::{DynamicImage, GrayImage, Luma};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<()> {
//! let config = PipelineConfig::builder()
//!     .output_mode(OutputMode::CompositedBackground)
//!     .background_color([0, 0, 255])
//!     .thread_count(4)
//!     .build()?;
//!
//! // Any closure with the right signature is a mask provider
//! let provider = Arc::new(|_: &PipelineConfig, image: &DynamicImage| -> Result<GrayImage> {
//!     Ok(GrayImage::from_pixel(image.width(), image.height(), Luma([255])))
//! });
//!
//! let ctx = ProcessingContext::new(config, provider)?;
//! let summary = run_directory(&ctx, "input", "output")?;
//! println!("{} of {} succeeded", summary.succeeded, summary.total);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): Pure Rust ONNX segmentation backend
//! - `cli` (default): Command-line interface and progress bars
//! - `tracing-json`: JSON log output
//! - `tracing-files`: Log to a file
//! - `webp-support`: WebP input decoding

pub mod background;
pub mod backends;
pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod context;
pub mod error;
pub mod mask;
pub mod services;
pub mod stream;
pub mod tracing_config;

// Public API exports
pub use background::{adapt_background, ColorMode};
#[cfg(feature = "tract")]
pub use backends::{face_outline_provider, TractFaceDetector, TractFaceLandmarker, TractSegmenter};
pub use batch::{partition, process_file, run_directory};
pub use compositor::OutputCompositor;
pub use config::{MaskModel, OutputMode, PipelineConfig, PipelineConfigBuilder};
pub use context::{ProcessingContext, RunSummary, SuccessCounter};
pub use error::{PipelineError, Result};
pub use mask::{
    FaceCascade, FaceLandmarker, FaceOutlineMaskProvider, ForegroundSegmenter, MaskProvider,
    SegmentationMaskProvider,
};
pub use services::{ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, ProgressReporter};
pub use stream::{run_stream, FrameRead, FrameReader, OutputPattern, ReadPolicy, StreamPipeline};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{
    events, init_library_tracing, spans, TracingConfig, TracingFormat, TracingOutput,
};

/// Mask and composite one in-memory image without touching the filesystem
///
/// The background is adapted from the context's original background image.
pub fn composite_image(
    ctx: &ProcessingContext,
    image: &image::DynamicImage,
) -> Result<image::DynamicImage> {
    let mask = mask::compute_checked_mask(ctx.mask_provider(), ctx.config(), image)?;
    let background = ctx.adapt_background_for(image, None);
    ctx.compositor().compose(image, &mask, background.as_ref())
}
