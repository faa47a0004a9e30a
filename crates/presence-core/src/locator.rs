//! Face location contract shared by the cascade and learned strategies.

use crate::detector::DetectorError;
use crate::types::BoundingBox;
use image::RgbImage;
use std::fmt;

/// Detection strategy, chosen once at startup and never switched mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    /// Classical Haar cascade (Viola-Jones) detector.
    Cascade,
    /// Learned SCRFD detector via ONNX Runtime.
    Learned,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::Cascade => f.write_str("cascade"),
            DetectionMethod::Learned => f.write_str("learned"),
        }
    }
}

/// Maps a frame to the faces found in it.
///
/// Every implementation returns boxes in canonical `(top, right, bottom, left)`
/// order, clipped to the frame. An empty result means no faces were found.
/// No filtering happens beyond the detector's own thresholds.
pub trait FaceLocator: Send {
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError>;

    fn method(&self) -> DetectionMethod;
}
