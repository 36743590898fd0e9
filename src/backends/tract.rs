//! Tract segmentation backend
//!
//! Runs U²-Net style salient object models exported to ONNX with Tract, a pure
//! Rust inference library. The optimized plan is immutable after loading and is
//! shared by every worker without a lock.

use crate::config::MaskModel;
use crate::error::{PipelineError, Result};
use crate::mask::ForegroundSegmenter;
use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView};
use instant::Instant;
use ndarray::{Array2, Array4};
use std::path::Path;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
pub(crate) type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Square input resolution of the U²-Net family
pub const U2NET_INPUT_SIZE: u32 = 320;

const NORMALIZATION_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const NORMALIZATION_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Foreground segmenter backed by a Tract plan
pub struct TractSegmenter {
    model: TractModel,
    kind: MaskModel,
}

impl TractSegmenter {
    /// Load and optimize an ONNX model from disk
    ///
    /// # Arguments
    /// * `model_path` - ONNX file, e.g. `u2net.onnx`
    /// * `kind` - Which segmentation model the file holds (for logs)
    pub fn from_path<P: AsRef<Path>>(model_path: P, kind: MaskModel) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !kind.is_segmentation() {
            return Err(PipelineError::model(format!(
                "{kind} is not a segmentation model"
            )));
        }

        let side = U2NET_INPUT_SIZE as usize;
        let model = load_plan(model_path, [1, 3, side, side])?;
        Ok(Self { model, kind })
    }

    /// Load `kind`'s conventional file name from `model_dir`
    pub fn from_model_dir<P: AsRef<Path>>(model_dir: P, kind: MaskModel) -> Result<Self> {
        let file_name = kind.model_file_name().ok_or_else(|| {
            PipelineError::model(format!("{kind} has no segmentation model file"))
        })?;
        Self::from_path(model_dir.as_ref().join(file_name), kind)
    }

    #[must_use]
    pub fn kind(&self) -> MaskModel {
        self.kind
    }
}

impl ForegroundSegmenter for TractSegmenter {
    fn segment(&self, image: &DynamicImage) -> Result<Array2<f32>> {
        let input = preprocess(image);

        let inference_start = Instant::now();
        let outputs = self
            .model
            .run(tvec![Tensor::from(input).into()])
            .map_err(|e| PipelineError::model(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::model("No output tensor found"))?
            .into_arc_tensor();
        let view = output.to_array_view::<f32>().map_err(|e| {
            PipelineError::model(format!("Failed to convert output tensor: {e}"))
        })?;

        let shape = view.shape();
        let (rows, cols) = match shape {
            [.., rows, cols] if shape.iter().rev().skip(2).all(|&d| d == 1) => (*rows, *cols),
            _ => {
                return Err(PipelineError::model(format!(
                    "Unexpected output shape {shape:?}"
                )));
            },
        };
        let map = Array2::from_shape_vec((rows, cols), view.iter().copied().collect())
            .map_err(|e| PipelineError::model(format!("Failed to reshape output: {e}")))?;

        tracing::debug!(
            "🔮 {} inference in {:.2}ms",
            self.kind,
            inference_start.elapsed().as_millis()
        );
        Ok(map)
    }

    fn name(&self) -> &str {
        match self.kind {
            MaskModel::U2net => "u2net",
            MaskModel::U2netp => "u2netp",
            MaskModel::U2netHumanSeg => "u2net_human_seg",
            MaskModel::Face => "face",
        }
    }
}

/// Load an ONNX file and optimize it for a fixed input shape
pub(crate) fn load_plan(model_path: &Path, input_shape: [usize; 4]) -> Result<TractModel> {
    if !model_path.is_file() {
        return Err(PipelineError::model(format!(
            "model file doesn't exist: {}",
            model_path.display()
        )));
    }

    let load_start = Instant::now();
    let size_mb = std::fs::metadata(model_path)
        .map(|m| m.len() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0);
    tracing::info!(
        "🧠 Loading {} ({:.1} MB) with Tract",
        model_path.display(),
        size_mb
    );

    let model = tract_onnx::onnx()
        .model_for_path(model_path)
        .map_err(|e| PipelineError::model(format!("Failed to load ONNX model: {e}")))?
        .with_input_fact(0, f32::fact(input_shape).into())
        .map_err(|e| PipelineError::model(format!("Failed to set input shape: {e}")))?
        .into_optimized()
        .map_err(|e| PipelineError::model(format!("Failed to optimize model: {e}")))?
        .into_runnable()
        .map_err(|e| PipelineError::model(format!("Failed to create runnable model: {e}")))?;

    tracing::info!(
        "✅ {} ready in {}ms",
        model_path.display(),
        load_start.elapsed().as_millis()
    );
    Ok(model)
}

/// Run `model` on one input and flatten every output to `f32` values
pub(crate) fn run_flat(model: &TractModel, input: Array4<f32>) -> Result<Vec<Vec<f32>>> {
    let outputs = model
        .run(tvec![Tensor::from(input).into()])
        .map_err(|e| PipelineError::model(format!("Tract inference failed: {e}")))?;
    outputs
        .iter()
        .map(|output| {
            output
                .to_array_view::<f32>()
                .map(|view| view.iter().copied().collect())
                .map_err(|e| PipelineError::model(format!("Failed to convert output tensor: {e}")))
        })
        .collect()
}

/// Resize to the model resolution, scale by the image maximum and normalize
///
/// Gray inputs use the first channel's statistics and are tiled to three
/// channels.
pub fn preprocess(image: &DynamicImage) -> Array4<f32> {
    let side = U2NET_INPUT_SIZE;
    let gray = matches!(image, DynamicImage::ImageLuma8(_));
    let resized = imageops::resize(&image.to_rgb8(), side, side, FilterType::Lanczos3);

    let max = resized.as_raw().iter().copied().max().unwrap_or(0);
    let scale = if max > 0 { f32::from(max) } else { 1.0 };

    let mut tensor = Array4::<f32>::zeros((1, 3, side as usize, side as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            let stat = if gray { 0 } else { channel };
            let value = f32::from(pixel[channel]) / scale;
            tensor[[0, channel, y as usize, x as usize]] =
                (value - NORMALIZATION_MEAN[stat]) / NORMALIZATION_STD[stat];
        }
    }
    tracing::trace!(
        "Preprocessed {}x{} input to {:?}",
        image.width(),
        image.height(),
        tensor.shape()
    );
    tensor
}
