//! Haar cascade face locator backed by OpenCV's `CascadeClassifier`.
//!
//! Loads the stock OpenCV cascade XML (e.g. `haarcascade_frontalface_default.xml`)
//! and runs `detectMultiScale` on a grayscale copy of the frame.

use crate::detector::DetectorError;
use crate::locator::{DetectionMethod, FaceLocator};
use crate::types::BoundingBox;
use image::{GrayImage, RgbImage};
use opencv::core::{Mat, Rect, Scalar, Size, Vector, CV_8UC1};
use opencv::objdetect::{CascadeClassifier, CASCADE_SCALE_IMAGE};
use opencv::prelude::*;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cascade file not found: {0}")]
    NotFound(String),
    #[error("no classifier could be read from {0}")]
    Empty(String),
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// `detectMultiScale` tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeParams {
    /// Window growth per scale step (must be > 1).
    pub scale_factor: f32,
    /// Neighbouring hits a candidate needs to be kept.
    pub min_neighbors: u32,
    /// Smallest face edge, in pixels.
    pub min_size: u32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.3,
            min_neighbors: 10,
            min_size: 75,
        }
    }
}

/// Cascade-based [`FaceLocator`].
pub struct CascadeLocator {
    classifier: CascadeClassifier,
    params: CascadeParams,
}

impl CascadeLocator {
    pub fn load(path: &str, params: CascadeParams) -> Result<Self, CascadeError> {
        if !Path::new(path).exists() {
            return Err(CascadeError::NotFound(path.to_string()));
        }

        let classifier = CascadeClassifier::new(path)?;
        if classifier.empty()? {
            return Err(CascadeError::Empty(path.to_string()));
        }

        tracing::info!(path, ?params, "loaded Haar cascade");
        Ok(Self { classifier, params })
    }

    fn detect(&mut self, gray: &GrayImage) -> Result<Vector<Rect>, opencv::Error> {
        let mat = gray_to_mat(gray)?;
        let min = self.params.min_size as i32;
        let mut rects = Vector::<Rect>::new();
        self.classifier.detect_multi_scale(
            &mat,
            &mut rects,
            self.params.scale_factor as f64,
            self.params.min_neighbors as i32,
            CASCADE_SCALE_IMAGE,
            Size::new(min, min),
            Size::new(0, 0),
        )?;
        Ok(rects)
    }
}

impl FaceLocator for CascadeLocator {
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (width, height) = frame.dimensions();
        let gray = image::imageops::grayscale(frame);

        let rects = self
            .detect(&gray)
            .map_err(|e| DetectorError::InferenceFailed(format!("cascade: {e}")))?;
        tracing::debug!(faces = rects.len(), "cascade scan complete");

        Ok(to_boxes(rects, width, height))
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Cascade
    }
}

/// Copy a grayscale frame into a single-channel `Mat`.
fn gray_to_mat(gray: &GrayImage) -> Result<Mat, opencv::Error> {
    let mut mat = Mat::new_rows_cols_with_default(
        gray.height() as i32,
        gray.width() as i32,
        CV_8UC1,
        Scalar::all(0.0),
    )?;
    mat.data_bytes_mut()?.copy_from_slice(gray.as_raw());
    Ok(mat)
}

/// OpenCV reports `(x, y, w, h)`; reorder into clipped `(top, right, bottom, left)`.
fn to_boxes(rects: impl IntoIterator<Item = Rect>, width: u32, height: u32) -> Vec<BoundingBox> {
    rects
        .into_iter()
        .filter_map(|r| {
            BoundingBox::from_xywh(
                r.x as i64,
                r.y as i64,
                r.width as i64,
                r.height as i64,
                width,
                height,
            )
        })
        .collect()
}
