//! Mask compositing CLI tool
//!
//! Command-line interface with three modes: one file, one directory, or a raw
//! RGB frame stream on stdin.

use super::config::CliConfigBuilder;
use crate::{
    batch::{process_file, run_directory},
    context::{ProcessingContext, RunSummary},
    services::{ConsoleProgressReporter, ProgressReporter},
    stream::{run_stream, OutputPattern},
    tracing_config::{init_cli_tracing, spans},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const EPILOG: &str = "Mask usage (--mask-usage):
  0  Blend the input with the background color or image using the detected mask (default)
  1  Save the input with the mask in its alpha channel
  2  Save the mask only, as a grayscale PNG";

/// Foreground mask compositing tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, after_help = EPILOG)]
#[command(name = "bgcompose")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Mask model: u2net, u2netp, u2net-human-seg or face
    #[arg(short, long, global = true)]
    pub model: Option<crate::config::MaskModel>,

    /// Directory holding the ONNX model files
    #[arg(long, global = true, value_name = "DIR", default_value = "pretrained_models")]
    pub model_dir: PathBuf,

    /// Mask usage: 0 composite, 1 alpha channel, 2 mask only
    #[arg(long = "mask-usage", global = true, value_name = "0|1|2")]
    pub mask_usage: Option<crate::config::OutputMode>,

    /// Invert the detected foreground mask
    #[arg(long, global = true)]
    pub invert_mask: bool,

    /// Number of worker threads
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Scale factor for face outlines (0.1-10)
    #[arg(long, global = true)]
    pub face_scale: Option<f32>,

    /// Background RGB color values [default: 128 128 128]
    #[arg(long, global = true, num_args = 3, value_names = ["R", "G", "B"])]
    pub background_color: Option<Vec<u8>>,

    /// Background image file
    #[arg(long, global = true, value_name = "PATH")]
    pub background_image: Option<PathBuf>,

    /// Only process directory entries matching this glob (e.g., "*.jpg")
    #[arg(long, global = true)]
    pub pattern: Option<String>,

    /// JSON configuration file; command-line options override it
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Show a progress bar
    #[arg(long, global = true)]
    pub progress: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Process one image file
    File {
        input_file: PathBuf,
        output_file: PathBuf,
    },
    /// Process image files in the input directory
    Dir {
        input_dir: PathBuf,
        output_dir: PathBuf,
    },
    /// Read raw RGB24 frames piped in on stdin
    Stdin {
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        image_width: u32,
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        image_height: u32,
        /// Output path with one integer placeholder, e.g. out/%05d.png
        output_specifier: String,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Dir { .. } => "dir",
            Self::Stdin { .. } => "stdin",
        }
    }
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;
    run(&cli, &session_id)
}

/// Execute a parsed command line
pub fn run(cli: &Cli, session_id: &str) -> Result<()> {
    let config = CliConfigBuilder::from_cli(cli).context("Invalid configuration")?;

    // Stream specifiers are checked before any model is loaded
    let pattern = match &cli.command {
        Command::Stdin {
            output_specifier, ..
        } => Some(OutputPattern::parse(output_specifier)?),
        _ => None,
    };

    let span = spans::session(
        session_id,
        cli.command.name(),
        &config.mask_model.to_string(),
    );
    let _enter = span.enter();

    let provider = CliConfigBuilder::mask_provider(cli, &config)?;
    let reporter: Arc<dyn ProgressReporter> = if cli.progress {
        Arc::new(IndicatifProgressReporter::new())
    } else {
        Arc::new(ConsoleProgressReporter::new(cli.verbose > 0))
    };
    let ctx = ProcessingContext::new(config, provider)
        .context("Failed to initialize processing")?
        .with_reporter(reporter);

    match (&cli.command, pattern) {
        (
            Command::File {
                input_file,
                output_file,
            },
            _,
        ) => {
            info!(
                "File input, {} => {} ...",
                input_file.display(),
                output_file.display()
            );
            process_file(&ctx, input_file, output_file)
                .with_context(|| format!("Failed to process {}", input_file.display()))?;
        },
        (
            Command::Dir {
                input_dir,
                output_dir,
            },
            _,
        ) => {
            info!(
                "Directory input, {} => {} ...",
                input_dir.display(),
                output_dir.display()
            );
            run_directory(&ctx, input_dir, output_dir)?;
        },
        (
            Command::Stdin {
                image_width,
                image_height,
                output_specifier,
            },
            Some(pattern),
        ) => {
            info!(
                "Read RGB bytes from stdin, {}x{} images => {}",
                image_width, image_height, output_specifier
            );
            run_stream(&ctx, *image_width, *image_height, pattern, io::stdin().lock())?;
        },
        (Command::Stdin { .. }, None) => {
            anyhow::bail!("stdin mode requires an output specifier");
        },
    }

    Ok(())
}

/// Progress bar reporter for interactive terminals
pub struct IndicatifProgressReporter {
    bar: ProgressBar,
}

impl IndicatifProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for IndicatifProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn run_started(&self, total: Option<usize>) {
        let template = match total {
            Some(total) => {
                self.bar.set_length(total as u64);
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}"
            },
            None => "{spinner:.green} [{elapsed_precise}] {pos} frames {msg}",
        };
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            self.bar.set_style(style.progress_chars("#>-"));
        }
        self.bar
            .set_draw_target(indicatif::ProgressDrawTarget::stderr());
    }

    fn item_finished(&self, item: &str, succeeded: bool) {
        let mark = if succeeded { "✅" } else { "❌" };
        self.bar.set_message(format!("{mark} {item}"));
        self.bar.inc(1);
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.bar.finish_with_message(format!(
            "{} of {} succeeded",
            summary.succeeded, summary.total
        ));
    }
}
