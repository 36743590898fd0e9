//! Progress reporting service
//!
//! This module separates progress reporting concerns from the drivers,
//! allowing different frontends to implement their own progress handling.
//! Reporters are shared by all worker threads.

use crate::context::RunSummary;

/// Trait for reporting progress during directory and stream runs
pub trait ProgressReporter: Send + Sync {
    /// A run is starting; `total` is known in directory mode only
    fn run_started(&self, total: Option<usize>) {
        drop(total);
    }

    /// One item finished, successfully or not
    ///
    /// # Arguments
    /// * `item` - Input file name or frame index
    /// * `succeeded` - Whether output was written
    fn item_finished(&self, item: &str, succeeded: bool);

    /// All workers have joined
    fn run_finished(&self, summary: &RunSummary);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn item_finished(&self, _item: &str, _succeeded: bool) {
        // Intentionally empty - discards progress updates
    }

    fn run_finished(&self, _summary: &RunSummary) {
        // Intentionally empty - discards completion notification
    }
}

/// Console progress reporter that logs progress through tracing
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to log every finished item
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn run_started(&self, total: Option<usize>) {
        match total {
            Some(total) => tracing::info!("Processing {} item(s)", total),
            None => tracing::info!("Processing stream until input ends"),
        }
    }

    fn item_finished(&self, item: &str, succeeded: bool) {
        if self.verbose {
            if succeeded {
                tracing::info!("✅ {}", item);
            } else {
                tracing::info!("❌ {}", item);
            }
        }
    }

    fn run_finished(&self, summary: &RunSummary) {
        tracing::info!(
            "Completed: {} of {} item(s) succeeded",
            summary.succeeded,
            summary.total
        );
    }
}
