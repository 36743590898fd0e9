//! Face outline masks
//!
//! Faces are located by an optional cascade pre-filter, then a landmark detector
//! runs on each (margin-expanded) face crop and reports the face-oval outline.
//! The outline is scaled about its centroid, replaced by its convex hull, filled
//! and box-blurred. Without a cascade the landmark detector runs on the whole
//! frame, which is the older and less precise strategy.
//!
//! Neither detector is assumed to be thread-safe. Each sits behind its own
//! mutex, which makes face masking a serialization point across workers; run
//! one provider per thread if that ceiling matters.

use super::{empty_mask, invert_mask, MaskProvider};
use crate::{
    config::PipelineConfig,
    error::{PipelineError, Result},
};
use image::{imageops, DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::{
    drawing::draw_polygon_mut, filter::box_filter, geometry::convex_hull, point::Point,
};
use std::sync::{Mutex, MutexGuard};

/// Fraction of the face box added on every side before running landmarks
pub const DEFAULT_CROP_MARGIN: f32 = 0.25;

/// Axis-aligned face box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Landmark position normalized to the analyzed image (0.0..=1.0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlinePoint {
    pub x: f32,
    pub y: f32,
}

/// Coarse face detector used to pre-filter regions (e.g. a Haar cascade)
pub trait FaceCascade: Send {
    fn detect_faces(&mut self, image: &GrayImage) -> Result<Vec<FaceBox>>;
}

/// Landmark detector reporting one face-oval outline per face
pub trait FaceLandmarker: Send {
    fn face_outlines(&mut self, image: &RgbImage) -> Result<Vec<Vec<OutlinePoint>>>;
}

/// Mask provider filling detected face outlines
pub struct FaceOutlineMaskProvider {
    cascade: Option<Mutex<Box<dyn FaceCascade>>>,
    landmarker: Mutex<Box<dyn FaceLandmarker>>,
    crop_margin: f32,
}

impl FaceOutlineMaskProvider {
    /// Landmarks on the full frame, no cascade pre-filter
    pub fn new(landmarker: Box<dyn FaceLandmarker>) -> Self {
        Self {
            cascade: None,
            landmarker: Mutex::new(landmarker),
            crop_margin: DEFAULT_CROP_MARGIN,
        }
    }

    /// Cascade pre-filter, then landmarks on each face crop
    pub fn with_cascade(
        cascade: Box<dyn FaceCascade>,
        landmarker: Box<dyn FaceLandmarker>,
    ) -> Self {
        Self {
            cascade: Some(Mutex::new(cascade)),
            landmarker: Mutex::new(landmarker),
            crop_margin: DEFAULT_CROP_MARGIN,
        }
    }

    #[must_use]
    pub fn crop_margin(mut self, margin: f32) -> Self {
        self.crop_margin = margin.max(0.0);
        self
    }

    /// Face outlines in full-image pixel coordinates
    fn locate_outlines(&self, image: &DynamicImage) -> Result<Vec<Vec<(f32, f32)>>> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let Some(cascade) = &self.cascade else {
            let outlines = lock(&self.landmarker, "face landmarker")?.face_outlines(&rgb)?;
            return Ok(outlines
                .into_iter()
                .map(|outline| to_pixels(&outline, 0.0, 0.0, width as f32, height as f32))
                .collect());
        };

        let faces = lock(cascade, "face cascade")?.detect_faces(&image.to_luma8())?;
        tracing::debug!(faces = faces.len(), "Cascade pre-filter finished");

        let mut located = Vec::new();
        for face in faces {
            let (x0, y0, crop_w, crop_h) = expand_box(face, self.crop_margin, width, height);
            if crop_w == 0 || crop_h == 0 {
                continue;
            }
            let crop = imageops::crop_imm(&rgb, x0, y0, crop_w, crop_h).to_image();
            let outlines = lock(&self.landmarker, "face landmarker")?.face_outlines(&crop)?;
            located.extend(outlines.into_iter().map(|outline| {
                to_pixels(&outline, x0 as f32, y0 as f32, crop_w as f32, crop_h as f32)
            }));
        }
        Ok(located)
    }
}

impl MaskProvider for FaceOutlineMaskProvider {
    fn compute_mask(&self, config: &PipelineConfig, image: &DynamicImage) -> Result<GrayImage> {
        let (width, height) = (image.width(), image.height());
        let outlines = self.locate_outlines(image)?;

        if outlines.is_empty() {
            tracing::warn!("No face detected");
            return Ok(empty_mask(width, height, config.invert_mask));
        }

        let mut mask = GrayImage::new(width, height);
        for outline in outlines {
            let scaled = scale_about_centroid(&outline, config.face_scale);
            let hull = convex_hull(scaled.as_slice());
            if hull.len() >= 3 {
                draw_polygon_mut(&mut mask, &hull, Luma([255]));
            }
        }

        if config.blur_radius > 0 {
            mask = box_filter(&mask, config.blur_radius, config.blur_radius);
        }
        if config.invert_mask {
            invert_mask(&mut mask);
        }
        Ok(mask)
    }

    fn name(&self) -> &str {
        "face"
    }
}

fn lock<'a, T: ?Sized>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| PipelineError::internal(format!("{} mutex poisoned", what)))
}

fn to_pixels(
    outline: &[OutlinePoint],
    offset_x: f32,
    offset_y: f32,
    width: f32,
    height: f32,
) -> Vec<(f32, f32)> {
    outline
        .iter()
        .map(|p| (offset_x + p.x * width, offset_y + p.y * height))
        .collect()
}

/// Grow `face` by `margin` of its size on each side, clamped to the image
fn expand_box(face: FaceBox, margin: f32, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let dx = (face.width as f32 * margin).round() as u32;
    let dy = (face.height as f32 * margin).round() as u32;
    let x0 = face.x.saturating_sub(dx).min(width);
    let y0 = face.y.saturating_sub(dy).min(height);
    let x1 = face.x.saturating_add(face.width).saturating_add(dx).min(width);
    let y1 = face.y.saturating_add(face.height).saturating_add(dy).min(height);
    (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
}

fn scale_about_centroid(points: &[(f32, f32)], scale: f32) -> Vec<Point<i32>> {
    if points.is_empty() {
        return Vec::new();
    }
    let n = points.len() as f32;
    let cx = points.iter().map(|p| p.0).sum::<f32>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f32>() / n;
    points
        .iter()
        .map(|&(x, y)| {
            Point::new(
                (cx + (x - cx) * scale).round() as i32,
                (cy + (y - cy) * scale).round() as i32,
            )
        })
        .collect()
}
