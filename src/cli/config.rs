//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{MaskModel, PipelineConfig},
    mask::{MaskProvider, SegmentationMaskProvider},
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Convert CLI arguments to a [`PipelineConfig`] and a mask provider
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the pipeline configuration, layering CLI options over `--config`
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        Self::validate_cli(cli)?;

        let mut config = match &cli.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(model) = cli.model {
            config.mask_model = model;
        }
        if let Some(mode) = cli.mask_usage {
            config.output_mode = mode;
        }
        if cli.invert_mask {
            config.invert_mask = true;
        }
        if let Some(threads) = cli.threads {
            config.thread_count = threads;
        }
        if let Some(scale) = cli.face_scale {
            config.face_scale = scale;
        }
        if let Some(color) = &cli.background_color {
            config.background_color = Self::parse_color(color)?;
        }
        if let Some(path) = &cli.background_image {
            config.background_image = Some(path.clone());
        }
        if let Some(pattern) = &cli.pattern {
            config.file_pattern = Some(pattern.clone());
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate CLI arguments that clap cannot check on its own
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.threads == Some(0) {
            anyhow::bail!("--threads must be at least 1");
        }

        if let Some(path) = &cli.background_image {
            if !path.is_file() {
                anyhow::bail!("Background image does not exist: {}", path.display());
            }
        }

        Ok(())
    }

    /// Resolve the mask provider for the configured model
    pub(crate) fn mask_provider(
        cli: &Cli,
        config: &PipelineConfig,
    ) -> Result<Arc<dyn MaskProvider>> {
        match config.mask_model {
            MaskModel::Face => Self::face_provider(cli),
            model => Self::segmentation_provider(cli, model),
        }
    }

    #[cfg(feature = "tract")]
    fn face_provider(cli: &Cli) -> Result<Arc<dyn MaskProvider>> {
        let provider = crate::backends::face_outline_provider(&cli.model_dir)
            .context("Failed to load the face models")?;
        Ok(Arc::new(provider))
    }

    #[cfg(not(feature = "tract"))]
    fn face_provider(_cli: &Cli) -> Result<Arc<dyn MaskProvider>> {
        anyhow::bail!("The face model requires the 'tract' feature")
    }

    #[cfg(feature = "tract")]
    fn segmentation_provider(cli: &Cli, model: MaskModel) -> Result<Arc<dyn MaskProvider>> {
        let segmenter = crate::backends::TractSegmenter::from_model_dir(&cli.model_dir, model)
            .with_context(|| format!("Failed to load the {model} model"))?;
        Ok(Arc::new(SegmentationMaskProvider::new(Box::new(segmenter))))
    }

    #[cfg(not(feature = "tract"))]
    fn segmentation_provider(_cli: &Cli, model: MaskModel) -> Result<Arc<dyn MaskProvider>> {
        anyhow::bail!("The {model} model requires the 'tract' feature")
    }

    fn parse_color(values: &[u8]) -> Result<[u8; 3]> {
        <[u8; 3]>::try_from(values)
            .map_err(|_| anyhow::anyhow!("--background-color takes exactly three values"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputMode;
    use clap::Parser;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bgcompose").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = CliConfigBuilder::from_cli(&parse(&["file", "a.jpg", "b.png"])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = parse(&[
            "--mask-usage",
            "2",
            "--invert-mask",
            "--threads",
            "3",
            "--face-scale",
            "1.5",
            "--background-color",
            "1",
            "2",
            "3",
            "--pattern",
            "*.png",
            "dir",
            "in",
            "out",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.output_mode, OutputMode::MaskOnly);
        assert!(config.invert_mask);
        assert_eq!(config.thread_count, 3);
        assert!((config.face_scale - 1.5).abs() < f32::EPSILON);
        assert_eq!(config.background_color, [1, 2, 3]);
        assert_eq!(config.file_pattern.as_deref(), Some("*.png"));
    }

    #[test]
    fn test_config_file_is_overridden_by_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"thread_count": 8, "invert_mask": true}}"#).unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = parse(&["--config", &path, "--threads", "2", "dir", "in", "out"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.thread_count, 2);
        assert!(config.invert_mask);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(CliConfigBuilder::from_cli(&parse(&["--threads", "0", "dir", "a", "b"])).is_err());
        assert!(
            CliConfigBuilder::from_cli(&parse(&["--face-scale", "20", "dir", "a", "b"])).is_err()
        );
        assert!(CliConfigBuilder::from_cli(&parse(&[
            "--background-image",
            "/definitely/not/here.png",
            "dir",
            "a",
            "b"
        ]))
        .is_err());
    }

    #[test]
    fn test_missing_face_model_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().to_str().unwrap().to_string();
        let cli = parse(&["--model", "face", "--model-dir", &model_dir, "file", "a.jpg", "b.png"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        let err = CliConfigBuilder::mask_provider(&cli, &config).err().unwrap();
        assert!(format!("{err:#}").contains("face"));
    }

    #[test]
    fn test_missing_model_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().to_str().unwrap().to_string();
        let cli = parse(&["--model-dir", &model_dir, "file", "a.jpg", "b.png"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert!(CliConfigBuilder::mask_provider(&cli, &config).is_err());
    }
}
