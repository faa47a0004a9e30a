//! Capture sources: where frames come from and how a stream of them is read.

use crate::camera::{Camera, CameraError};
use crate::frame::FrameError;
use crate::mjpeg::MjpegSource;
use image::RgbImage;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("stream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    #[error("stream ended")]
    StreamEnded,
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    #[error("capture stopped")]
    Stopped,
}

/// A parsed `--source` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    /// Local V4L2 device node, e.g. `/dev/video0`.
    Device(String),
    /// MJPEG over HTTP(S).
    Stream(String),
}

#[derive(Error, Debug)]
#[error("invalid capture source {0:?}: expected a device index, a /dev path, or an http(s) URL")]
pub struct SourceParseError(pub String);

impl FromStr for CaptureSource {
    type Err = SourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<u32>() {
            return Ok(CaptureSource::Device(format!("/dev/video{index}")));
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(CaptureSource::Stream(s.to_string()));
        }
        if s.starts_with("/dev/") {
            return Ok(CaptureSource::Device(s.to_string()));
        }
        Err(SourceParseError(s.to_string()))
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureSource::Device(path) => f.write_str(path),
            CaptureSource::Stream(url) => f.write_str(url),
        }
    }
}

/// Something that can be (re)opened into a stream of frames.
///
/// The capture thread calls `open_stream` again after a stream fails, so a
/// source must tolerate being opened many times.
pub trait FrameSource: Send {
    fn describe(&self) -> String;
    fn open_stream(&mut self) -> Result<Box<dyn FrameStream + '_>, CaptureError>;
}

/// An open stream; each call blocks until the next frame is decoded.
pub trait FrameStream {
    fn next_frame(&mut self) -> Result<RgbImage, CaptureError>;
}

/// Open the device or stream a `CaptureSource` names.
pub fn open(source: &CaptureSource) -> Result<Box<dyn FrameSource>, CaptureError> {
    match source {
        CaptureSource::Device(path) => Ok(Box::new(Camera::open(path)?)),
        CaptureSource::Stream(url) => Ok(Box::new(MjpegSource::new(url)?)),
    }
}
