//! Tract face detection backends
//!
//! Two ONNX models back the face outline mask:
//!
//! - [`TractFaceDetector`]: an Ultra-Light face detector (RFB-320 export)
//!   producing already-decoded corner boxes and two-class scores. It is the
//!   cascade pre-filter of [`FaceOutlineMaskProvider`].
//! - [`TractFaceLandmarker`]: a face mesh landmark model (468 points, 192×192
//!   NCHW input in `[0, 1]`) whose face-oval subset becomes the outline.

use super::tract::{load_plan, run_flat, TractModel};
use crate::error::{PipelineError, Result};
use crate::mask::{FaceBox, FaceCascade, FaceLandmarker, FaceOutlineMaskProvider, OutlinePoint};
use image::{imageops, imageops::FilterType, GrayImage, RgbImage};
use ndarray::Array4;
use std::path::Path;

/// Landmark model file expected inside the model directory
pub const FACE_LANDMARK_MODEL_FILE: &str = "face_landmark.onnx";
/// Face detector model file expected inside the model directory
pub const FACE_DETECTOR_MODEL_FILE: &str = "face_detector_rfb_320.onnx";

const DETECTOR_WIDTH: u32 = 320;
const DETECTOR_HEIGHT: u32 = 240;
const DETECTOR_MEAN: f32 = 127.0;
const DETECTOR_SCALE: f32 = 128.0;
const DETECTOR_SCORE_THRESHOLD: f32 = 0.7;
const DETECTOR_IOU_THRESHOLD: f32 = 0.3;

const LANDMARK_INPUT_SIZE: u32 = 192;
const LANDMARK_COUNT: usize = 468;
const FACE_PRESENCE_THRESHOLD: f32 = 0.5;

/// Face mesh indices tracing the outer face oval
pub const FACE_OVAL: [usize; 36] = [
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109,
];

/// Build the face outline provider from `model_dir`
///
/// The landmark model is required. The detector is optional: without it the
/// landmarks run on the full frame.
pub fn face_outline_provider<P: AsRef<Path>>(model_dir: P) -> Result<FaceOutlineMaskProvider> {
    let model_dir = model_dir.as_ref();
    let landmarker = TractFaceLandmarker::from_path(model_dir.join(FACE_LANDMARK_MODEL_FILE))?;

    let detector_path = model_dir.join(FACE_DETECTOR_MODEL_FILE);
    if detector_path.is_file() {
        let detector = TractFaceDetector::from_path(detector_path)?;
        Ok(FaceOutlineMaskProvider::with_cascade(
            Box::new(detector),
            Box::new(landmarker),
        ))
    } else {
        tracing::warn!(
            "{} not found; face landmarks will run on the full frame",
            detector_path.display()
        );
        Ok(FaceOutlineMaskProvider::new(Box::new(landmarker)))
    }
}

/// Face box detector backed by a Tract plan
pub struct TractFaceDetector {
    model: TractModel,
    score_threshold: f32,
}

impl TractFaceDetector {
    pub fn from_path<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model = load_plan(
            model_path.as_ref(),
            [1, 3, DETECTOR_HEIGHT as usize, DETECTOR_WIDTH as usize],
        )?;
        Ok(Self {
            model,
            score_threshold: DETECTOR_SCORE_THRESHOLD,
        })
    }

    #[must_use]
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }
}

impl FaceCascade for TractFaceDetector {
    fn detect_faces(&mut self, image: &GrayImage) -> Result<Vec<FaceBox>> {
        let outputs = run_flat(&self.model, detector_input(image))?;
        let [scores, boxes] = outputs.as_slice() else {
            return Err(PipelineError::model(format!(
                "face detector returned {} outputs, expected scores and boxes",
                outputs.len()
            )));
        };
        decode_detections(
            scores,
            boxes,
            image.dimensions(),
            self.score_threshold,
            DETECTOR_IOU_THRESHOLD,
        )
    }
}

/// Face mesh landmark model backed by a Tract plan
pub struct TractFaceLandmarker {
    model: TractModel,
}

impl TractFaceLandmarker {
    pub fn from_path<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let side = LANDMARK_INPUT_SIZE as usize;
        let model = load_plan(model_path.as_ref(), [1, 3, side, side])?;
        Ok(Self { model })
    }
}

impl FaceLandmarker for TractFaceLandmarker {
    fn face_outlines(&mut self, image: &RgbImage) -> Result<Vec<Vec<OutlinePoint>>> {
        let outputs = run_flat(&self.model, landmark_input(image))?;
        let landmarks = outputs
            .first()
            .ok_or_else(|| PipelineError::model("No landmark output tensor found"))?;
        // Second output, when exported, is the face presence logit
        let presence = outputs.get(1).and_then(|flag| flag.first()).copied();
        Ok(oval_outline(landmarks, presence)?.into_iter().collect())
    }
}

/// Scores `[N, 2]` and normalized corner boxes `[N, 4]` to pixel face boxes
fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    (width, height): (u32, u32),
    score_threshold: f32,
    iou_threshold: f32,
) -> Result<Vec<FaceBox>> {
    if scores.len() % 2 != 0 || scores.len() / 2 != boxes.len() / 4 || boxes.len() % 4 != 0 {
        return Err(PipelineError::model(format!(
            "face detector outputs disagree: {} scores, {} box values",
            scores.len(),
            boxes.len()
        )));
    }

    let (w, h) = (width as f32, height as f32);
    let candidates: Vec<(f32, [f32; 4])> = scores
        .chunks_exact(2)
        .zip(boxes.chunks_exact(4))
        .filter(|(score, _)| score[1] > score_threshold)
        .map(|(score, corners)| {
            (
                score[1],
                [
                    corners[0].clamp(0.0, 1.0) * w,
                    corners[1].clamp(0.0, 1.0) * h,
                    corners[2].clamp(0.0, 1.0) * w,
                    corners[3].clamp(0.0, 1.0) * h,
                ],
            )
        })
        .collect();

    Ok(non_max_suppression(candidates, iou_threshold)
        .into_iter()
        .filter_map(|(_, [x1, y1, x2, y2])| {
            let face = FaceBox {
                x: x1.round() as u32,
                y: y1.round() as u32,
                width: (x2 - x1).round().max(0.0) as u32,
                height: (y2 - y1).round().max(0.0) as u32,
            };
            (face.width > 0 && face.height > 0).then_some(face)
        })
        .collect())
}

/// Greedy NMS: highest score first, drop boxes overlapping a kept one
fn non_max_suppression(
    mut candidates: Vec<(f32, [f32; 4])>,
    iou_threshold: f32,
) -> Vec<(f32, [f32; 4])> {
    candidates.sort_unstable_by(|a, b| b.0.total_cmp(&a.0));

    let mut kept: Vec<(f32, [f32; 4])> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(&k.1, &candidate.1) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Face-oval points normalized to the landmark input, or `None` without a face
fn oval_outline(landmarks: &[f32], presence_logit: Option<f32>) -> Result<Option<Vec<OutlinePoint>>> {
    if landmarks.len() < LANDMARK_COUNT * 3 {
        return Err(PipelineError::model(format!(
            "landmark output has {} values, expected at least {}",
            landmarks.len(),
            LANDMARK_COUNT * 3
        )));
    }
    if let Some(logit) = presence_logit {
        let presence = 1.0 / (1.0 + (-logit).exp());
        if presence < FACE_PRESENCE_THRESHOLD {
            tracing::debug!(presence, "Landmark model reports no face");
            return Ok(None);
        }
    }

    let side = LANDMARK_INPUT_SIZE as f32;
    Ok(Some(
        FACE_OVAL
            .iter()
            .map(|&i| OutlinePoint {
                x: landmarks[i * 3] / side,
                y: landmarks[i * 3 + 1] / side,
            })
            .collect(),
    ))
}

fn detector_input(image: &GrayImage) -> Array4<f32> {
    let resized = imageops::resize(image, DETECTOR_WIDTH, DETECTOR_HEIGHT, FilterType::Triangle);
    let mut tensor =
        Array4::<f32>::zeros((1, 3, DETECTOR_HEIGHT as usize, DETECTOR_WIDTH as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let value = (f32::from(pixel[0]) - DETECTOR_MEAN) / DETECTOR_SCALE;
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = value;
        }
    }
    tensor
}

fn landmark_input(image: &RgbImage) -> Array4<f32> {
    let side = LANDMARK_INPUT_SIZE;
    let resized = imageops::resize(image, side, side, FilterType::Triangle);
    let mut tensor = Array4::<f32>::zeros((1, 3, side as usize, side as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = f32::from(pixel[channel]) / 255.0;
        }
    }
    tensor
}
