//! Configuration types for mask compositing runs

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default neutral gray used when no background image is given
pub const DEFAULT_BACKGROUND_COLOR: [u8; 3] = [128, 128, 128];

/// Default scale applied to face outlines about their centroid
pub const DEFAULT_FACE_SCALE: f32 = 1.05;

/// Default box blur radius applied to face masks
pub const DEFAULT_BLUR_RADIUS: u32 = 5;

/// What gets written for each processed image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Blend the input over a solid color or background image (mask usage `0`)
    #[default]
    CompositedBackground,
    /// Input image with the mask stored in an added alpha channel (mask usage `1`)
    ImageWithAlpha,
    /// Grayscale mask only (mask usage `2`)
    MaskOnly,
}

impl OutputMode {
    /// Legacy single-digit "mask usage" code for this mode
    #[must_use]
    pub fn mask_usage_code(self) -> char {
        match self {
            Self::CompositedBackground => '0',
            Self::ImageWithAlpha => '1',
            Self::MaskOnly => '2',
        }
    }
}

impl FromStr for OutputMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "0" | "composite" | "composited-background" | "background" => {
                Ok(Self::CompositedBackground)
            },
            "1" | "alpha" | "image-with-alpha" | "rgba" => Ok(Self::ImageWithAlpha),
            "2" | "mask" | "mask-only" => Ok(Self::MaskOnly),
            other => Err(PipelineError::invalid_config(format!(
                "Unknown output mode '{}'. Expected 0 (composite), 1 (alpha) or 2 (mask)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CompositedBackground => write!(f, "composited-background"),
            Self::ImageWithAlpha => write!(f, "image-with-alpha"),
            Self::MaskOnly => write!(f, "mask-only"),
        }
    }
}

/// Detector family used to produce masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MaskModel {
    /// Full size U²-Net generic foreground segmenter
    #[default]
    U2net,
    /// Small U²-Net variant
    U2netp,
    /// U²-Net trained for human segmentation
    U2netHumanSeg,
    /// Face outline from a landmark detector
    Face,
}

impl MaskModel {
    /// File name of the ONNX export expected inside the model directory
    #[must_use]
    pub fn model_file_name(self) -> Option<&'static str> {
        match self {
            Self::U2net => Some("u2net.onnx"),
            Self::U2netp => Some("u2netp.onnx"),
            Self::U2netHumanSeg => Some("u2net_human_seg.onnx"),
            Self::Face => None,
        }
    }

    /// Whether this model is a generic foreground segmenter
    #[must_use]
    pub fn is_segmentation(self) -> bool {
        !matches!(self, Self::Face)
    }
}

impl FromStr for MaskModel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "u2net" => Ok(Self::U2net),
            "u2netp" => Ok(Self::U2netp),
            "u2neths" | "u2net-human-seg" | "u2net_human_seg" => Ok(Self::U2netHumanSeg),
            "face" => Ok(Self::Face),
            other => Err(PipelineError::invalid_config(format!(
                "Unknown mask model '{}'. Expected u2net, u2netp, u2net-human-seg or face",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MaskModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U2net => write!(f, "u2net"),
            Self::U2netp => write!(f, "u2netp"),
            Self::U2netHumanSeg => write!(f, "u2net-human-seg"),
            Self::Face => write!(f, "face"),
        }
    }
}

/// Immutable run configuration handed to every worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output representation
    pub output_mode: OutputMode,

    /// RGB fill used when compositing without a background image
    pub background_color: [u8; 3],

    /// Optional background image path (composited mode only)
    pub background_image: Option<PathBuf>,

    /// Invert masks produced by the mask provider
    pub invert_mask: bool,

    /// Number of worker threads (at least 1)
    pub thread_count: usize,

    /// Detector family
    pub mask_model: MaskModel,

    /// Face outline scale about its centroid
    pub face_scale: f32,

    /// Box blur radius for face masks
    pub blur_radius: u32,

    /// Optional glob applied to file names in directory mode
    pub file_pattern: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_mode: OutputMode::default(),
            background_color: DEFAULT_BACKGROUND_COLOR,
            background_image: None,
            invert_mask: false,
            thread_count: 1,
            mask_model: MaskModel::default(),
            face_scale: DEFAULT_FACE_SCALE,
            blur_radius: DEFAULT_BLUR_RADIUS,
            file_pattern: None,
        }
    }
}

impl PipelineConfig {
    /// Create a configuration builder
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            PipelineError::invalid_config(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(PipelineError::config_value_error(
                "thread count",
                self.thread_count,
                ">= 1",
            ));
        }

        if !self.face_scale.is_finite() || !(0.1..=10.0).contains(&self.face_scale) {
            return Err(PipelineError::config_value_error(
                "face scale",
                self.face_scale,
                "0.1-10",
            ));
        }

        if let Some(pattern) = &self.file_pattern {
            glob::Pattern::new(pattern).map_err(|e| {
                PipelineError::invalid_config(format!("Invalid file pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }
}

/// Builder for [`PipelineConfig`]
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Create a new builder with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    #[must_use]
    pub fn background_color(mut self, rgb: [u8; 3]) -> Self {
        self.config.background_color = rgb;
        self
    }

    #[must_use]
    pub fn background_image<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.background_image = Some(path.into());
        self
    }

    #[must_use]
    pub fn invert_mask(mut self, invert: bool) -> Self {
        self.config.invert_mask = invert;
        self
    }

    #[must_use]
    pub fn thread_count(mut self, threads: usize) -> Self {
        self.config.thread_count = threads;
        self
    }

    #[must_use]
    pub fn mask_model(mut self, model: MaskModel) -> Self {
        self.config.mask_model = model;
        self
    }

    #[must_use]
    pub fn face_scale(mut self, scale: f32) -> Self {
        self.config.face_scale = scale;
        self
    }

    #[must_use]
    pub fn blur_radius(mut self, radius: u32) -> Self {
        self.config.blur_radius = radius;
        self
    }

    #[must_use]
    pub fn file_pattern<S: Into<String>>(mut self, pattern: S) -> Self {
        self.config.file_pattern = Some(pattern.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.output_mode, OutputMode::CompositedBackground);
        assert_eq!(config.background_color, [128, 128, 128]);
        assert_eq!(config.thread_count, 1);
        assert!(!config.invert_mask);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mask_usage_codes() {
        assert_eq!("0".parse::<OutputMode>().unwrap(), OutputMode::CompositedBackground);
        assert_eq!("1".parse::<OutputMode>().unwrap(), OutputMode::ImageWithAlpha);
        assert_eq!("2".parse::<OutputMode>().unwrap(), OutputMode::MaskOnly);
        assert!("3".parse::<OutputMode>().is_err());

        for mode in [
            OutputMode::CompositedBackground,
            OutputMode::ImageWithAlpha,
            OutputMode::MaskOnly,
        ] {
            let code = mode.mask_usage_code().to_string();
            assert_eq!(code.parse::<OutputMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_mask_model_parsing() {
        assert_eq!("u2neths".parse::<MaskModel>().unwrap(), MaskModel::U2netHumanSeg);
        assert_eq!("FACE".parse::<MaskModel>().unwrap(), MaskModel::Face);
        assert!("yolo".parse::<MaskModel>().is_err());
        assert_eq!(MaskModel::U2netp.model_file_name(), Some("u2netp.onnx"));
        assert!(MaskModel::Face.model_file_name().is_none());
        assert!(!MaskModel::Face.is_segmentation());
    }

    #[test]
    fn test_builder_validation() {
        assert!(PipelineConfig::builder().thread_count(0).build().is_err());
        assert!(PipelineConfig::builder().face_scale(0.05).build().is_err());
        assert!(PipelineConfig::builder().face_scale(f32::NAN).build().is_err());
        assert!(PipelineConfig::builder().file_pattern("[").build().is_err());

        let config = PipelineConfig::builder()
            .output_mode(OutputMode::MaskOnly)
            .thread_count(4)
            .invert_mask(true)
            .file_pattern("*.jpg")
            .build()
            .unwrap();
        assert_eq!(config.thread_count, 4);
        assert!(config.invert_mask);
        assert_eq!(config.file_pattern.as_deref(), Some("*.jpg"));
    }

    #[test]
    fn test_json_config_partial_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"output_mode": "mask-only", "thread_count": 3}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.output_mode, OutputMode::MaskOnly);
        assert_eq!(config.thread_count, 3);
        assert_eq!(config.background_color, DEFAULT_BACKGROUND_COLOR);

        std::fs::write(&path, r#"{"thread_count": 0}"#).unwrap();
        assert!(PipelineConfig::from_json_file(&path).is_err());
    }
}
