//! Tracing configuration module for structured logging and observability
//!
//! Applications configure the subscriber here; library code only emits events.
//! Worker threads share one console sink, so every formatter writes through a
//! `Mutex`-wrapped writer and whole lines never interleave.

use std::io;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact console output for CI environments
    Compact,
    /// JSON structured logging for production environments
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Configuration for tracing output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Output to stderr (default)
    Console,
    /// Output to a file
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    /// Output format
    pub format: TracingFormat,
    /// Output destination
    pub output: TracingOutput,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    /// Create a new tracing configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set output format
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set output destination
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Set custom environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Set session ID for run correlation
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",  // Default: per-item progress and summaries
            1 => "debug", // -v: worker lifecycle and background adaptation
            _ => "trace", // -vv+: everything
        }
    }

    /// Initialize tracing subscriber based on configuration
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = if let Some(env_filter) = &self.env_filter {
            EnvFilter::try_new(env_filter)?
        } else {
            EnvFilter::try_new(self.verbosity_to_filter())?
        };

        let registry = Registry::default().with(filter);

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_writer(Mutex::new(io::stderr()))
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_names(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_level(true)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            (TracingFormat::Compact, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_writer(Mutex::new(io::stderr()))
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_names(true)
                    .with_file(false)
                    .with_line_number(false)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_writer(Mutex::new(io::stderr()))
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true);

                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::File(path)) => {
                let file_appender = tracing_appender::rolling::never(
                    path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                    path.file_name()
                        .unwrap_or_else(|| std::ffi::OsStr::new("bgcompose.log")),
                );

                match format {
                    TracingFormat::Console | TracingFormat::Compact => {
                        let fmt_layer = fmt::layer()
                            .with_ansi(false)
                            .with_thread_names(true)
                            .with_writer(Mutex::new(file_appender))
                            .compact();
                        registry.with(fmt_layer).try_init()?;
                    },
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => {
                        let fmt_layer = fmt::layer()
                            .json()
                            .with_writer(Mutex::new(file_appender))
                            .with_current_span(true)
                            .with_span_list(true);
                        registry.with(fmt_layer).try_init()?;
                    },
                }
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "🚀 Compositing session started");
        }

        Ok(())
    }
}

/// Convenience function to initialize tracing with CLI-friendly defaults
///
/// Returns the generated session ID.
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<String> {
    let session_id = uuid::Uuid::new_v4().to_string();

    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(TracingFormat::Console)
        .with_session_id(session_id.clone())
        .init()?;
    Ok(session_id)
}

/// Initialize tracing for library usage (minimal configuration)
pub fn init_library_tracing() {
    // Only set up if no global subscriber is already set
    if tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(Mutex::new(io::stderr()))
            .finish(),
    )
    .is_ok()
    {
        tracing::debug!("📚 Library tracing initialized");
    }
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span for the entire CLI operation
    pub fn session(session_id: &str, mode: &str, model: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            mode = %mode,
            model = %model
        )
    }

    /// Span for a directory batch run
    pub fn directory_batch(input_dir: &std::path::Path, file_count: usize, threads: usize) -> Span {
        tracing::span!(
            Level::INFO,
            "directory_batch",
            input_dir = %input_dir.display(),
            file_count = %file_count,
            threads = %threads
        )
    }

    /// Span for a raw frame stream run
    pub fn stream(width: u32, height: u32, threads: usize) -> Span {
        tracing::span!(
            Level::INFO,
            "stream",
            width = %width,
            height = %height,
            threads = %threads
        )
    }

    /// Span for one worker thread
    pub fn worker(worker_id: usize) -> Span {
        tracing::span!(Level::DEBUG, "worker", worker_id = %worker_id)
    }

    /// Span for one processed item
    pub fn item(name: &str) -> Span {
        tracing::span!(Level::DEBUG, "item", name = %name)
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use crate::error::PipelineError;
    use tracing::{info, warn};

    /// One line per recoverable item failure
    pub fn item_failed(item: &str, error: &PipelineError) {
        warn!(
            item = %item,
            category = %error.category(),
            "❌ {}: {}",
            item,
            error
        );
    }

    /// Worker's private tally, logged once as it exits
    pub fn worker_summary(worker_id: usize, succeeded: usize) {
        info!(
            worker_id = %worker_id,
            succeeded = %succeeded,
            "Worker {} finished, items successfully processed: {}",
            worker_id,
            succeeded
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().with_verbosity(0).verbosity_to_filter(), "info");
        assert_eq!(TracingConfig::new().with_verbosity(1).verbosity_to_filter(), "debug");
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(10).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_format(TracingFormat::Compact)
            .with_env_filter("bgcompose=debug")
            .with_session_id("test-session");

        assert_eq!(config.verbosity, 2);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.env_filter.as_deref(), Some("bgcompose=debug"));
        assert_eq!(config.session_id.as_ref().unwrap(), "test-session");
    }

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.verbosity, 0);
        assert_eq!(config.format, TracingFormat::Console);
        assert_eq!(config.output, TracingOutput::Console);
        assert!(config.env_filter.is_none());
        assert!(config.session_id.is_none());
    }

    #[test]
    fn test_invalid_env_filter_is_reported() {
        let result = TracingConfig::new().with_env_filter("[[[").init();
        assert!(result.is_err());
    }
}
