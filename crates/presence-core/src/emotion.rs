//! Emotion classification and change detection.

use crate::types::{BoundingBox, Emotion};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Square input edge of the expression model.
const EMOTION_INPUT_SIZE: u32 = 197;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("emotion model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Labels the expression of one face region.
pub trait EmotionRecognizer: Send {
    fn classify(&mut self, frame: &RgbImage, face: &BoundingBox) -> Result<Emotion, ClassifierError>;
}

/// ONNX expression classifier with a 7-way categorical output.
///
/// Takes an NHWC `[1, 197, 197, 3]` tensor of raw 0–255 values in BGR order,
/// the layout the model was trained on.
pub struct EmotionClassifier {
    session: Session,
}

impl EmotionClassifier {
    pub fn load(model_path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded emotion model"
        );

        Ok(Self { session })
    }

    fn preprocess(frame: &RgbImage, face: &BoundingBox) -> Array4<f32> {
        let roi = image::imageops::crop_imm(frame, face.left, face.top, face.width(), face.height())
            .to_image();
        let roi = image::imageops::resize(&roi, EMOTION_INPUT_SIZE, EMOTION_INPUT_SIZE, FilterType::Triangle);

        let size = EMOTION_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
        for (x, y, pixel) in roi.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, y, x, 0]] = pixel[2] as f32;
            tensor[[0, y, x, 1]] = pixel[1] as f32;
            tensor[[0, y, x, 2]] = pixel[0] as f32;
        }
        tensor
    }
}

/// Index of the highest score; the first one wins ties.
fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &s)| match best {
            Some((_, b)) if s <= b => best,
            _ => Some((i, s)),
        })
        .map(|(i, _)| i)
}

impl EmotionRecognizer for EmotionClassifier {
    fn classify(&mut self, frame: &RgbImage, face: &BoundingBox) -> Result<Emotion, ClassifierError> {
        let input = Self::preprocess(frame, face);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("emotion scores: {e}")))?;

        if scores.len() != Emotion::ALL.len() {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected {} emotion scores, got {}",
                Emotion::ALL.len(),
                scores.len()
            )));
        }

        argmax(scores)
            .and_then(Emotion::from_index)
            .ok_or_else(|| ClassifierError::InferenceFailed("empty emotion scores".into()))
    }
}

/// How "last emitted emotion" is remembered between faces and ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmotionTracking {
    /// One value shared by every face: a change is reported relative to
    /// whichever face was evaluated last, regardless of who it was.
    #[default]
    Shared,
    /// One value per identity name.
    PerIdentity,
}

/// Reports an emotion only when it differs from the last one emitted.
#[derive(Debug, Clone)]
pub struct EmotionTracker {
    mode: EmotionTracking,
    shared: Emotion,
    per_identity: HashMap<String, Emotion>,
}

impl EmotionTracker {
    pub fn new(mode: EmotionTracking) -> Self {
        Self {
            mode,
            shared: Emotion::default(),
            per_identity: HashMap::new(),
        }
    }

    /// Last emitted emotion as seen by `name`.
    pub fn last_emitted(&self, name: &str) -> Emotion {
        match self.mode {
            EmotionTracking::Shared => self.shared,
            EmotionTracking::PerIdentity => self.per_identity.get(name).copied().unwrap_or_default(),
        }
    }

    /// Record a classification. Returns true when it should be emitted,
    /// in which case it becomes the retained value.
    pub fn observe(&mut self, name: &str, label: Emotion) -> bool {
        if self.last_emitted(name) == label {
            return false;
        }
        match self.mode {
            EmotionTracking::Shared => self.shared = label,
            EmotionTracking::PerIdentity => {
                self.per_identity.insert(name.to_string(), label);
            }
        }
        true
    }
}

impl Default for EmotionTracker {
    fn default() -> Self {
        Self::new(EmotionTracking::default())
    }
}
