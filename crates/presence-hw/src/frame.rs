//! Frame type, rotation and pixel conversion from YUYV, GREY, Y16 and MJPEG to RGB.

use image::{ImageFormat, RgbImage};

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: std::time::Instant,
    /// Monotonic capture counter assigned by the producer.
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            timestamp: std::time::Instant::now(),
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Clockwise camera rotation applied to every captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Only right angles are supported; anything else is `None`.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Cw90),
            180 => Some(Rotation::Cw180),
            270 => Some(Rotation::Cw270),
            _ => None,
        }
    }

    pub fn apply(&self, image: RgbImage) -> RgbImage {
        match self {
            Rotation::None => image,
            Rotation::Cw90 => image::imageops::rotate90(&image),
            Rotation::Cw180 => image::imageops::rotate180(&image),
            Rotation::Cw270 => image::imageops::rotate270(&image),
        }
    }
}

fn checked_len(buf: &[u8], expected: usize) -> Result<&[u8], FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(&buf[..expected])
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert packed YUYV (4:2:2) to RGB with BT.601 studio-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let data = checked_len(yuyv, (width * height * 2) as usize)?;
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in data.chunks_exact(4) {
        let d = chunk[1] as i32 - 128;
        let e = chunk[3] as i32 - 128;
        for y in [chunk[0], chunk[2]] {
            let c = 298 * (y as i32 - 16);
            rgb.push(clamp_u8((c + 409 * e + 128) >> 8));
            rgb.push(clamp_u8((c - 100 * d - 208 * e + 128) >> 8));
            rgb.push(clamp_u8((c + 516 * d + 128) >> 8));
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidDimensions { width, height })
}

/// Replicate 8-bit grayscale into three channels.
pub fn gray_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let data = checked_len(gray, (width * height) as usize)?;
    let rgb = data.iter().flat_map(|&g| [g, g, g]).collect();
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidDimensions { width, height })
}

/// 16-bit little-endian grayscale, keeping the high byte.
pub fn y16_to_rgb(y16: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let data = checked_len(y16, (width * height * 2) as usize)?;
    let rgb = data
        .chunks_exact(2)
        .flat_map(|px| {
            let g = (u16::from_le_bytes([px[0], px[1]]) >> 8) as u8;
            [g, g, g]
        })
        .collect();
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidDimensions { width, height })
}

/// Decode one JPEG image (an MJPEG frame).
pub fn jpeg_to_rgb(jpeg: &[u8]) -> Result<RgbImage, FrameError> {
    Ok(image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("JPEG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_yuyv_white_and_black() {
        // 2x1 image: Y0=235 (white), Y1=16 (black), neutral chroma.
        let rgb = yuyv_to_rgb(&[235, 128, 16, 128], 2, 1).unwrap();
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([255, 255, 255]));
        assert_eq!(*rgb.get_pixel(1, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_yuyv_red_chroma() {
        let rgb = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        let px = rgb.get_pixel(0, 0);
        assert!(px[0] > 240 && px[1] < 10 && px[2] < 10, "got {px:?}");
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(matches!(
            yuyv_to_rgb(&[100, 128], 2, 1),
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_gray_to_rgb() {
        let rgb = gray_to_rgb(&[7, 200], 2, 1).unwrap();
        assert_eq!(*rgb.get_pixel(1, 0), Rgb([200, 200, 200]));
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        let rgb = y16_to_rgb(&[0x34, 0x12], 1, 1).unwrap();
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([0x12, 0x12, 0x12]));
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(0), Some(Rotation::None));
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Cw270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Cw90));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let rotated = Rotation::Cw90.apply(img);
        assert_eq!(rotated.dimensions(), (2, 4));
        // Top-left moves to top-right under a clockwise quarter turn.
        assert_eq!(*rotated.get_pixel(1, 0), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_jpeg_decode() {
        let img = RgbImage::from_pixel(8, 8, Rgb([120, 120, 120]));
        let mut jpeg = std::io::Cursor::new(Vec::new());
        img.write_to(&mut jpeg, ImageFormat::Jpeg).unwrap();
        let decoded = jpeg_to_rgb(jpeg.get_ref()).unwrap();
        assert_eq!(decoded.dimensions(), (8, 8));
    }
}
