//! presence-hw — frame capture from V4L2 cameras and MJPEG network streams.
//!
//! A [`CaptureThread`] reads a [`FrameSource`] continuously and keeps only
//! the newest frame, so a slow pipeline always works on current video.

pub mod camera;
pub mod capture;
pub mod frame;
pub mod mjpeg;
pub mod slot;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use capture::{CaptureThread, FrameFeed};
pub use frame::{Frame, FrameError, Rotation};
pub use mjpeg::MjpegSource;
pub use slot::FrameSlot;
pub use source::{CaptureError, CaptureSource, FrameSource, FrameStream, SourceParseError};
