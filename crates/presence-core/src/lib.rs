//! presence-core — face location, identity matching and affect tracking.
//!
//! Face location comes in two strategies behind [`FaceLocator`]: a Haar
//! cascade and SCRFD. Embeddings come from ArcFace and expressions from an
//! ONNX classifier, all on ONNX Runtime for CPU inference. The stateful parts
//! of the pipeline, [`EmotionTracker`] and [`SessionDiffer`], are plain data.

pub mod alignment;
pub mod cascade;
pub mod detector;
pub mod emotion;
pub mod identity;
pub mod locator;
pub mod recognizer;
pub mod session;
pub mod types;

use std::path::PathBuf;

pub use cascade::{CascadeLocator, CascadeParams};
pub use detector::{DetectorError, FaceDetector, ScrfdVariant};
pub use emotion::{EmotionClassifier, EmotionRecognizer, EmotionTracker, EmotionTracking};
pub use identity::{Gallery, IdentityMatcher, MatchResult};
pub use locator::{DetectionMethod, FaceLocator};
pub use recognizer::{FaceEmbedder, FaceRecognizer};
pub use session::{SessionDiff, SessionDiffer};
pub use types::{BoundingBox, Embedding, Emotion, Person, UNKNOWN_NAME};

/// Model directory used when none is configured.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}
