//! Error types for mask compositing operations

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error types for directory, file and stream processing
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding, encoding or conversion errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Mask provider failed or returned an unusable mask
    #[error("Mask error: {0}")]
    Mask(String),

    /// Detector model loading or inference errors
    #[error("Model error: {0}")]
    Model(String),

    /// Output could not be produced or written
    #[error("Output error: {0}")]
    Output(String),

    /// Raw frame stream errors
    #[error("Stream error: {0}")]
    Stream(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new mask error
    pub fn mask<S: Into<String>>(msg: S) -> Self {
        Self::Mask(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new output error
    pub fn output<S: Into<String>>(msg: S) -> Self {
        Self::Output(msg.into())
    }

    /// Create a new stream error
    pub fn stream<S: Into<String>>(msg: S) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with the accepted range
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Convert a caught panic payload into an internal error
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self::Internal(format!("panic while processing item: {message}"))
    }

    /// Short category name used in per-item failure log lines
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Image(_) => "image",
            Self::InvalidConfig(_) => "config",
            Self::Mask(_) => "mask",
            Self::Model(_) => "model",
            Self::Output(_) => "output",
            Self::Stream(_) => "stream",
            Self::Internal(_) => "internal",
        }
    }
}
