use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, ValueEnum};
use presence_core::{CascadeParams, EmotionTracking, ScrfdVariant};
use presence_hw::{CaptureSource, Rotation, SourceParseError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";
const RECOGNITION_FILE: &str = "w600k_r50.onnx";
const EMOTION_FILE: &str = "emotion.onnx";

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodArg {
    #[value(alias = "cascade")]
    Haar,
    #[value(alias = "learned")]
    Dnn,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionModelArg {
    Fast,
    Accurate,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmotionTrackingArg {
    Shared,
    PerIdentity,
}

/// Options of the `run` subcommand. Each falls back to a `PRESENCE_*` variable.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Face location strategy
    #[arg(long, value_enum, env = "PRESENCE_METHOD", default_value_t = MethodArg::Haar)]
    pub method: MethodArg,

    /// Learned detector variant (det_500m or det_10g)
    #[arg(long, value_enum, env = "PRESENCE_DETECTION_MODEL", default_value_t = DetectionModelArg::Fast)]
    pub detection_model: DetectionModelArg,

    /// OpenCV Haar cascade XML [default: <model-dir>/haarcascade_frontalface_default.xml]
    #[arg(long, env = "PRESENCE_CASCADE")]
    pub cascade: Option<PathBuf>,

    #[arg(long, default_value_t = 1.3)]
    pub scale_factor: f32,

    #[arg(long, default_value_t = 10)]
    pub min_neighbors: u32,

    /// Smallest face edge, in pixels of the processed frame
    #[arg(long, default_value_t = 75)]
    pub min_size: u32,

    /// Directory holding the ONNX models and the cascade
    #[arg(long, env = "PRESENCE_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// ArcFace embedder [default: <model-dir>/w600k_r50.onnx]
    #[arg(long, env = "PRESENCE_RECOGNITION_MODEL")]
    pub recognition_model: Option<PathBuf>,

    /// Expression classifier [default: <model-dir>/emotion.onnx]
    #[arg(long, env = "PRESENCE_EMOTION_MODEL")]
    pub emotion_model: Option<PathBuf>,

    /// Known identities and their reference embeddings
    #[arg(long, env = "PRESENCE_GALLERY", default_value = "encodings.json")]
    pub gallery: PathBuf,

    /// Largest embedding distance still accepted as a match
    #[arg(long, env = "PRESENCE_TOLERANCE", default_value_t = 0.6)]
    pub tolerance: f32,

    /// Pause between ticks, in milliseconds
    #[arg(long, env = "PRESENCE_INTERVAL", default_value_t = 2000)]
    pub interval: u64,

    /// Save a frame for every login under the dataset directory
    #[arg(
        long,
        env = "PRESENCE_EXTEND_DATASET",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub extend_dataset: bool,

    #[arg(long, env = "PRESENCE_DATASET", default_value = "../dataset/")]
    pub dataset: PathBuf,

    /// Refresh an annotated overlay image every tick
    #[arg(
        long,
        env = "PRESENCE_OUTPUT",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub output: bool,

    #[arg(long, env = "PRESENCE_OVERLAY_PATH", default_value = "overlay.jpg")]
    pub overlay_path: PathBuf,

    /// Device index, /dev path, or http(s) MJPEG URL
    #[arg(long, env = "PRESENCE_SOURCE", default_value = "0")]
    pub source: String,

    /// Clockwise rotation in degrees (0, 90, 180, 270)
    #[arg(long, env = "PRESENCE_ROTATE", default_value_t = 0, allow_negative_numbers = true)]
    pub rotate: i32,

    /// Compare emotions against one shared value or per identity
    #[arg(long, value_enum, env = "PRESENCE_EMOTION_TRACKING", default_value_t = EmotionTrackingArg::Shared)]
    pub emotion_tracking: EmotionTrackingArg,

    /// Frames are resized to this width before detection
    #[arg(long, default_value_t = 500)]
    pub process_width: u32,

    /// How long to wait for the first frame, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub warmup_ms: u64,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("tolerance must be a positive number, got {0}")]
    InvalidTolerance(f32),
    #[error("rotation must be 0, 90, 180 or 270 degrees, got {0}")]
    InvalidRotation(i32),
    #[error("scale factor must be greater than 1, got {0}")]
    InvalidScaleFactor(f32),
    #[error("process width must be positive")]
    InvalidProcessWidth,
    #[error(transparent)]
    Source(#[from] SourceParseError),
}

/// Which face locator to build, with its model path and parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum LocatorConfig {
    Cascade { path: PathBuf, params: CascadeParams },
    Learned { path: PathBuf, variant: ScrfdVariant },
}

/// Validated `run` configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub locator: LocatorConfig,
    pub recognition_model: PathBuf,
    pub emotion_model: PathBuf,
    pub gallery: PathBuf,
    pub tolerance: f32,
    pub interval: Duration,
    /// Dataset root, present only when extension is enabled.
    pub dataset: Option<PathBuf>,
    /// Overlay image path, present only when output is enabled.
    pub overlay: Option<PathBuf>,
    pub source: CaptureSource,
    pub rotation: Rotation,
    pub emotion_tracking: EmotionTracking,
    pub process_width: u32,
    pub warmup: Duration,
}

impl TryFrom<RunArgs> for Config {
    type Error = ConfigError;

    fn try_from(args: RunArgs) -> Result<Self, Self::Error> {
        if !args.tolerance.is_finite() || args.tolerance <= 0.0 {
            return Err(ConfigError::InvalidTolerance(args.tolerance));
        }
        if args.scale_factor.is_nan() || args.scale_factor <= 1.0 {
            return Err(ConfigError::InvalidScaleFactor(args.scale_factor));
        }
        if args.process_width == 0 {
            return Err(ConfigError::InvalidProcessWidth);
        }
        let rotation =
            Rotation::from_degrees(args.rotate).ok_or(ConfigError::InvalidRotation(args.rotate))?;
        let source: CaptureSource = args.source.parse()?;

        let model_dir = args
            .model_dir
            .unwrap_or_else(presence_core::default_model_dir);

        let locator = match args.method {
            MethodArg::Haar => LocatorConfig::Cascade {
                path: args.cascade.unwrap_or_else(|| model_dir.join(CASCADE_FILE)),
                params: CascadeParams {
                    scale_factor: args.scale_factor,
                    min_neighbors: args.min_neighbors,
                    min_size: args.min_size,
                },
            },
            MethodArg::Dnn => {
                let variant = match args.detection_model {
                    DetectionModelArg::Fast => ScrfdVariant::Fast,
                    DetectionModelArg::Accurate => ScrfdVariant::Accurate,
                };
                LocatorConfig::Learned {
                    path: variant.model_path(&model_dir),
                    variant,
                }
            }
        };

        Ok(Self {
            locator,
            recognition_model: args
                .recognition_model
                .unwrap_or_else(|| model_dir.join(RECOGNITION_FILE)),
            emotion_model: args
                .emotion_model
                .unwrap_or_else(|| model_dir.join(EMOTION_FILE)),
            gallery: args.gallery,
            tolerance: args.tolerance,
            interval: Duration::from_millis(args.interval),
            dataset: args.extend_dataset.then_some(args.dataset),
            overlay: args.output.then_some(args.overlay_path),
            source,
            rotation,
            emotion_tracking: match args.emotion_tracking {
                EmotionTrackingArg::Shared => EmotionTracking::Shared,
                EmotionTrackingArg::PerIdentity => EmotionTracking::PerIdentity,
            },
            process_width: args.process_width,
            warmup: Duration::from_millis(args.warmup_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        let cli = TestCli::try_parse_from(std::iter::once("presenced").chain(args.iter().copied()))
            .unwrap();
        Config::try_from(cli.run)
    }

    #[test]
    fn test_defaults() {
        let cfg = parse(&["--model-dir", "/opt/models"]).unwrap();
        assert_eq!(
            cfg.locator,
            LocatorConfig::Cascade {
                path: PathBuf::from("/opt/models/haarcascade_frontalface_default.xml"),
                params: CascadeParams::default(),
            }
        );
        assert_eq!(cfg.recognition_model, PathBuf::from("/opt/models/w600k_r50.onnx"));
        assert_eq!(cfg.gallery, PathBuf::from("encodings.json"));
        assert!((cfg.tolerance - 0.6).abs() < 1e-6);
        assert_eq!(cfg.interval, Duration::from_millis(2000));
        assert_eq!(cfg.dataset, None);
        assert_eq!(cfg.overlay, None);
        assert_eq!(cfg.source, CaptureSource::Device("/dev/video0".into()));
        assert_eq!(cfg.rotation, Rotation::None);
        assert_eq!(cfg.emotion_tracking, EmotionTracking::Shared);
        assert_eq!(cfg.process_width, 500);
    }

    #[test]
    fn test_learned_method_alias() {
        let cfg = parse(&[
            "--model-dir",
            "/m",
            "--method",
            "learned",
            "--detection-model",
            "accurate",
        ])
        .unwrap();
        assert_eq!(
            cfg.locator,
            LocatorConfig::Learned {
                path: PathBuf::from("/m/det_10g.onnx"),
                variant: ScrfdVariant::Accurate,
            }
        );
    }

    #[test]
    fn test_boolish_flags() {
        let cfg = parse(&["--extend-dataset", "--dataset", "/data/", "--output=no"]).unwrap();
        assert_eq!(cfg.dataset, Some(PathBuf::from("/data/")));
        assert_eq!(cfg.overlay, None);

        let cfg = parse(&["--extend-dataset=false", "--output=1"]).unwrap();
        assert_eq!(cfg.dataset, None);
        assert_eq!(cfg.overlay, Some(PathBuf::from("overlay.jpg")));
    }

    #[test]
    fn test_stream_source_and_rotation() {
        let cfg = parse(&["--source", "http://cam.local/video", "--rotate", "270"]).unwrap();
        assert_eq!(cfg.source, CaptureSource::Stream("http://cam.local/video".into()));
        assert_eq!(cfg.rotation, Rotation::Cw270);
    }

    #[test]
    fn test_per_identity_tracking_opt_in() {
        let cfg = parse(&["--emotion-tracking", "per-identity"]).unwrap();
        assert_eq!(cfg.emotion_tracking, EmotionTracking::PerIdentity);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            parse(&["--tolerance", "0"]),
            Err(ConfigError::InvalidTolerance(_))
        ));
        assert!(matches!(
            parse(&["--tolerance", "NaN"]),
            Err(ConfigError::InvalidTolerance(_))
        ));
        assert!(matches!(
            parse(&["--rotate", "45"]),
            Err(ConfigError::InvalidRotation(45))
        ));
        assert!(matches!(
            parse(&["--scale-factor", "1.0"]),
            Err(ConfigError::InvalidScaleFactor(_))
        ));
        assert!(matches!(
            parse(&["--process-width", "0"]),
            Err(ConfigError::InvalidProcessWidth)
        ));
        assert!(matches!(
            parse(&["--source", "webcam"]),
            Err(ConfigError::Source(_))
        ));
    }

    #[test]
    fn test_unknown_method_fails_to_parse() {
        assert!(TestCli::try_parse_from(["presenced", "--method", "hog"]).is_err());
    }
}
