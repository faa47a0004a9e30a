//! Annotated frame written to disk for a kiosk viewer to display.

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use presence_core::BoundingBox;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("failed to encode overlay {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to replace overlay {path}: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct OverlayWriter {
    path: PathBuf,
    staging: PathBuf,
}

impl OverlayWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        Self {
            path,
            staging: PathBuf::from(staging),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of `frame` with a box drawn around each face.
    pub fn render(frame: &RgbImage, faces: &[BoundingBox]) -> RgbImage {
        let mut canvas = frame.clone();
        for face in faces {
            for inset in 0..BOX_THICKNESS {
                let (w, h) = (face.width(), face.height());
                if w <= 2 * inset || h <= 2 * inset {
                    break;
                }
                let rect = Rect::at((face.left + inset) as i32, (face.top + inset) as i32)
                    .of_size(w - 2 * inset, h - 2 * inset);
                draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
            }
        }
        canvas
    }

    /// Render and swap the result into place so readers never see a partial file.
    pub fn write(&self, frame: &RgbImage, faces: &[BoundingBox]) -> Result<(), OverlayError> {
        Self::render(frame, faces)
            .save_with_format(&self.staging, ImageFormat::Jpeg)
            .map_err(|source| OverlayError::Encode {
                path: self.staging.clone(),
                source,
            })?;
        std::fs::rename(&self.staging, &self.path).map_err(|source| OverlayError::Rename {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_draws_box_edges_only() {
        let frame = RgbImage::new(40, 40);
        let face = BoundingBox::clipped(10, 30, 30, 10, 40, 40).unwrap();
        let out = OverlayWriter::render(&frame, &[face]);

        assert_eq!(*out.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*out.get_pixel(11, 20), BOX_COLOR);
        assert_eq!(*out.get_pixel(20, 20), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OverlayWriter::new(dir.path().join("overlay.jpg"));
        let frame = RgbImage::new(16, 16);

        writer.write(&frame, &[]).unwrap();
        writer.write(&frame, &[]).unwrap();

        assert!(writer.path().exists());
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("overlay.jpg")]);
    }
}
