//! SCRFD face detector via ONNX Runtime.
//!
//! Learned detection strategy: letterboxes the RGB frame to 640x640, runs the
//! three-stride anchor-free SCRFD head, and suppresses overlaps with NMS.
//! Boxes come back in canonical order with five-point landmarks attached.

use crate::locator::{DetectionMethod, FaceLocator};
use crate::types::BoundingBox;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download from insightface and place in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// SCRFD model size. Both share the same output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrfdVariant {
    /// `det_500m`: small and quick, good enough at kiosk distances.
    Fast,
    /// `det_10g`: larger model, better on small or angled faces.
    Accurate,
}

impl ScrfdVariant {
    pub fn file_name(&self) -> &'static str {
        match self {
            ScrfdVariant::Fast => "det_500m.onnx",
            ScrfdVariant::Accurate => "det_10g.onnx",
        }
    }

    pub fn model_path(&self, model_dir: &Path) -> PathBuf {
        model_dir.join(self.file_name())
    }
}

/// Letterbox placement, used to map detections back to frame coordinates.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let size = SCRFD_INPUT_SIZE as f32;
        let scale = (size / width as f32).min(size / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            // Whole pixels, matching where preprocess places the image.
            pad_x: ((size - new_w) / 2.0).floor(),
            pad_y: ((size - new_h) / 2.0).floor(),
        }
    }

    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Detection in frame coordinates before clipping.
#[derive(Debug, Clone)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    landmarks: Option<[(f32, f32); 5]>,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// Learned [`FaceLocator`] backed by an SCRFD session.
pub struct FaceDetector {
    session: Session,
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load an SCRFD ONNX model.
    pub fn load(model_path: &str, variant: ScrfdVariant) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = model_path,
            ?variant,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            stride_indices,
        })
    }

    /// Resize into the letterboxed NCHW tensor SCRFD expects.
    ///
    /// Padding uses the mean so it normalizes to zero.
    fn preprocess(frame: &RgbImage) -> (Array4<f32>, Letterbox) {
        let (width, height) = frame.dimensions();
        let letterbox = Letterbox::fit(width, height);
        let new_w = ((width as f32 * letterbox.scale).round() as u32).max(1);
        let new_h = ((height as f32 * letterbox.scale).round() as u32).max(1);
        let resized = image::imageops::resize(frame, new_w, new_h, FilterType::Triangle);

        let size = SCRFD_INPUT_SIZE;
        let pad_x = letterbox.pad_x as usize;
        let pad_y = letterbox.pad_y as usize;
        // Zero is the normalized value of a SCRFD_MEAN pad pixel.
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in resized.enumerate_pixels() {
            let tx = x as usize + pad_x;
            let ty = y as usize + pad_y;
            if tx >= size || ty >= size {
                continue;
            }
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        (tensor, letterbox)
    }
}

impl FaceLocator for FaceDetector {
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (width, height) = frame.dimensions();
        let (input, letterbox) = Self::preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[pos];
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| {
                        DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}"))
                    })
            };
            let scores = extract(score_idx, "scores")?;
            let bboxes = extract(bbox_idx, "bboxes")?;
            let kps = extract(kps_idx, "kps")?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let kept = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = kept.len(), "SCRFD detection complete");

        Ok(kept
            .into_iter()
            .filter_map(|c| {
                BoundingBox::clipped(
                    c.y1.round() as i64,
                    c.x2.round() as i64,
                    c.y2.round() as i64,
                    c.x1.round() as i64,
                    width,
                    height,
                )
                .map(|b| b.with_landmarks(c.landmarks))
            })
            .collect())
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Learned
    }
}

/// Discover output tensor ordering by name.
///
/// Exports either name their outputs "score_8", "bbox_16", "kps_32" and so on,
/// or use generic numeric names. Unrecognized names fall back to the standard
/// positional layout: [0-2] scores, [3-5] bboxes, [6-8] kps.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(found) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [found[0], found[1], found[2]]
        }
        None => {
            tracing::info!(
                ?names,
                "SCRFD: output names not recognized, using positional mapping"
            );
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Decode candidates above `threshold` for a single stride level.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<Candidate> {
    let grid = SCRFD_INPUT_SIZE / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = scores.get(idx).copied().unwrap_or(0.0);
            if score <= threshold {
                return None;
            }
            let off = bboxes.get(idx * 4..idx * 4 + 4)?;

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * s;
            let ay = (cell / grid) as f32 * s;

            let (x1, y1) = letterbox.unmap(ax - off[0] * s, ay - off[1] * s);
            let (x2, y2) = letterbox.unmap(ax + off[2] * s, ay + off[3] * s);

            let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.unmap(ax + k[i * 2] * s, ay + k[i * 2 + 1] * s))
            });

            Some(Candidate {
                x1,
                y1,
                x2,
                y2,
                score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression, highest score first.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
