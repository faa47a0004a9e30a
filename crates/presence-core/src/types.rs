use serde::{Deserialize, Serialize};
use std::fmt;

/// Name reported for a face whose nearest gallery entry is not within tolerance.
pub const UNKNOWN_NAME: &str = "unknown";

/// Face bounding box in canonical `(top, right, bottom, left)` pixel order.
///
/// Always clipped to the frame it was detected in, with `top < bottom`
/// and `left < right`. Build it through [`BoundingBox::clipped`] or
/// [`BoundingBox::from_xywh`] so the invariant holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    /// Only the learned detector produces them.
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Clip raw edges to a `frame_width` x `frame_height` frame.
    ///
    /// Returns `None` when nothing of the box survives clipping.
    pub fn clipped(
        top: i64,
        right: i64,
        bottom: i64,
        left: i64,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let top = top.clamp(0, frame_height as i64) as u32;
        let bottom = bottom.clamp(0, frame_height as i64) as u32;
        let left = left.clamp(0, frame_width as i64) as u32;
        let right = right.clamp(0, frame_width as i64) as u32;

        if top >= bottom || left >= right {
            return None;
        }

        Some(Self {
            top,
            right,
            bottom,
            left,
            landmarks: None,
        })
    }

    /// Convert a cascade-style `(x, y, w, h)` rectangle into canonical order.
    pub fn from_xywh(
        x: i64,
        y: i64,
        w: i64,
        h: i64,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        Self::clipped(y, x + w, y + h, x, frame_width, frame_height)
    }

    pub fn with_landmarks(mut self, landmarks: Option<[(f32, f32); 5]>) -> Self {
        self.landmarks = landmarks;
        self
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Face embedding vector in the gallery's metric space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two embeddings.
    ///
    /// This is the metric galleries are built with; it is what tolerance is
    /// expressed in.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Closed set of emotion labels, indexed the way the classifier emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    #[default]
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    /// Map a categorical classifier output index to its label.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved identity of one detected face in one tick, with its emotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub emotion: Emotion,
}
