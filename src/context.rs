//! Shared processing state
//!
//! [`ProcessingContext`] is built once before any worker starts and is only read
//! afterwards, so one context can serve several runs. The only value workers
//! mutate is the [`SuccessCounter`], which each driver creates per run.

use crate::{
    background::{adapt_background, ColorMode},
    compositor::OutputCompositor,
    config::{OutputMode, PipelineConfig},
    error::{PipelineError, Result},
    mask::{compute_checked_mask, MaskProvider},
    services::{ImageIOService, NoOpProgressReporter, ProgressReporter},
};
use image::DynamicImage;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Per-run success tally, incremented under its own mutex
#[derive(Debug, Default)]
pub struct SuccessCounter {
    count: Mutex<usize>,
}

impl SuccessCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker's private tally; the critical section does nothing else
    pub fn add(&self, successes: usize) -> Result<()> {
        let mut count = self
            .count
            .lock()
            .map_err(|_| PipelineError::internal("success counter mutex poisoned"))?;
        *count += successes;
        Ok(())
    }

    pub fn get(&self) -> Result<usize> {
        self.count
            .lock()
            .map(|count| *count)
            .map_err(|_| PipelineError::internal("success counter mutex poisoned"))
    }
}

/// Outcome of a directory or stream run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Items attempted
    pub total: usize,
    /// Items written successfully
    pub succeeded: usize,
}

impl RunSummary {
    #[must_use]
    pub fn failed(&self) -> usize {
        self.total.saturating_sub(self.succeeded)
    }
}

/// Read-mostly state visible to every worker thread
pub struct ProcessingContext {
    config: PipelineConfig,
    mask_provider: Arc<dyn MaskProvider>,
    background: Option<DynamicImage>,
    compositor: OutputCompositor,
    reporter: Arc<dyn ProgressReporter>,
}

impl ProcessingContext {
    /// Build a context, loading the configured background image if any
    ///
    /// A background image is only used in composited mode; otherwise it is
    /// ignored with a warning. Failing to load it is fatal.
    pub fn new(config: PipelineConfig, mask_provider: Arc<dyn MaskProvider>) -> Result<Self> {
        config.validate()?;

        let background = match (&config.background_image, config.output_mode) {
            (None, _) => None,
            (Some(path), OutputMode::CompositedBackground) => {
                Some(ImageIOService::load_background(path)?)
            },
            (Some(path), mode) => {
                tracing::warn!(
                    path = %path.display(),
                    mode = %mode,
                    "Background image ignored: output mode is not composited"
                );
                None
            },
        };

        Ok(Self::with_background(config, mask_provider, background))
    }

    /// Build a context around an already loaded background
    pub fn with_background(
        config: PipelineConfig,
        mask_provider: Arc<dyn MaskProvider>,
        background: Option<DynamicImage>,
    ) -> Self {
        let compositor = OutputCompositor::new(config.output_mode, config.background_color);
        Self {
            config,
            mask_provider,
            background,
            compositor,
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    /// Replace the progress reporter
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn background(&self) -> Option<&DynamicImage> {
        self.background.as_ref()
    }

    #[must_use]
    pub fn compositor(&self) -> &OutputCompositor {
        &self.compositor
    }

    #[must_use]
    pub fn reporter(&self) -> &dyn ProgressReporter {
        self.reporter.as_ref()
    }

    #[must_use]
    pub fn mask_provider(&self) -> &dyn MaskProvider {
        self.mask_provider.as_ref()
    }

    /// Background adapted to `image`, reusing `cached` when it still fits
    #[must_use]
    pub fn adapt_background_for(
        &self,
        image: &DynamicImage,
        cached: Option<DynamicImage>,
    ) -> Option<DynamicImage> {
        self.adapt_background_to((image.width(), image.height()), ColorMode::of(image), cached)
    }

    /// Background adapted to an explicit size and color mode
    ///
    /// Always `None` outside composited mode or without a background image.
    #[must_use]
    pub fn adapt_background_to(
        &self,
        size: (u32, u32),
        mode: ColorMode,
        cached: Option<DynamicImage>,
    ) -> Option<DynamicImage> {
        if self.config.output_mode != OutputMode::CompositedBackground {
            return None;
        }
        adapt_background(self.background.as_ref(), cached, size, mode)
    }

    /// Mask, composite and write one image
    pub fn process_image(
        &self,
        image: &DynamicImage,
        background: Option<&DynamicImage>,
        destination: &Path,
    ) -> Result<()> {
        let mask = compute_checked_mask(self.mask_provider.as_ref(), &self.config, image)?;
        self.compositor
            .write_output(image, &mask, background, destination)
    }
}
