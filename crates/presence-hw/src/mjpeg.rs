//! MJPEG over HTTP, the format served by most IP cameras and `mjpg-streamer`.

use crate::frame;
use crate::source::{CaptureError, FrameSource, FrameStream};
use image::RgbImage;
use std::io::Read;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_CHUNK: usize = 16 * 1024;
/// Bytes buffered without finding a complete JPEG before the buffer is reset.
const MAX_PENDING: usize = 8 * 1024 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

pub struct MjpegSource {
    url: String,
    client: reqwest::blocking::Client,
}

impl MjpegSource {
    pub fn new(url: &str) -> Result<Self, CaptureError> {
        // The body never ends, so only the connect phase is bounded.
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

impl FrameSource for MjpegSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn open_stream(&mut self) -> Result<Box<dyn FrameStream + '_>, CaptureError> {
        let response = self.client.get(&self.url).send()?.error_for_status()?;
        tracing::info!(
            url = %self.url,
            content_type = ?response.headers().get(reqwest::header::CONTENT_TYPE),
            "connected to MJPEG stream"
        );
        Ok(Box::new(MjpegStream::new(response)))
    }
}

/// Splits a byte stream into JPEG images on SOI/EOI markers.
///
/// Multipart boundaries and part headers between images are skipped.
pub struct MjpegStream<R> {
    reader: R,
    pending: Vec<u8>,
}

impl<R: Read> MjpegStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::with_capacity(READ_CHUNK * 4),
        }
    }

    /// Next complete JPEG in the stream.
    pub fn next_jpeg(&mut self) -> Result<Vec<u8>, CaptureError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some((start, end)) = find_jpeg(&self.pending) {
                let jpeg = self.pending[start..end].to_vec();
                self.pending.drain(..end);
                return Ok(jpeg);
            }

            if self.pending.len() > MAX_PENDING {
                tracing::warn!(bytes = self.pending.len(), "no JPEG boundary found; resyncing");
                self.pending.clear();
            }

            let n = self.reader.read(&mut chunk)?;
            if n == 0 {
                return Err(CaptureError::StreamEnded);
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }
}

impl<R: Read> FrameStream for MjpegStream<R> {
    fn next_frame(&mut self) -> Result<RgbImage, CaptureError> {
        let jpeg = self.next_jpeg()?;
        Ok(frame::jpeg_to_rgb(&jpeg)?)
    }
}

fn find_marker(buf: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(2)
        .position(|w| w == marker)
        .map(|p| p + from)
}

enum Headers {
    /// More bytes are needed to reach the start of scan.
    Incomplete,
    /// Offset of the entropy-coded data.
    Scan(usize),
    Malformed,
}

/// Walk the marker segments after SOI by their length fields.
fn skip_headers(buf: &[u8], mut pos: usize) -> Headers {
    loop {
        let (Some(&prefix), Some(&marker)) = (buf.get(pos), buf.get(pos + 1)) else {
            return Headers::Incomplete;
        };
        if prefix != 0xFF {
            return Headers::Malformed;
        }
        match marker {
            // fill byte
            0xFF => pos += 1,
            0xD9 => return Headers::Scan(pos),
            0x01 | 0xD0..=0xD7 => pos += 2,
            _ => {
                let Some(len) = buf.get(pos + 2..pos + 4) else {
                    return Headers::Incomplete;
                };
                let len = u16::from_be_bytes([len[0], len[1]]) as usize;
                if len < 2 {
                    return Headers::Malformed;
                }
                pos += 2 + len;
                if marker == 0xDA {
                    return Headers::Scan(pos);
                }
            }
        }
    }
}

/// Byte range `[start, end)` of the first complete JPEG in `buf`.
///
/// Header segments are skipped whole, so an EOI inside an embedded EXIF
/// thumbnail does not cut the image short. Entropy-coded data never holds
/// a bare `FFD9`, so the first one after the scan header ends the image.
fn find_jpeg(buf: &[u8]) -> Option<(usize, usize)> {
    let start = find_marker(buf, SOI, 0)?;
    let scan = match skip_headers(buf, start + 2) {
        Headers::Incomplete => return None,
        Headers::Scan(pos) => pos,
        Headers::Malformed => start + 2,
    };
    let eoi = find_marker(buf, EOI, scan)?;
    Some((start, eoi + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([90, 140, 200]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    fn multipart(parts: &[Vec<u8>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n");
            body.extend_from_slice(format!("Content-Length: {}\r\n\r\n", part.len()).as_bytes());
            body.extend_from_slice(part);
            body.extend_from_slice(b"\r\n");
        }
        body
    }

    /// Insert an APP1 segment carrying a tiny JPEG thumbnail right after SOI.
    fn with_exif_thumbnail(jpeg: &[u8]) -> Vec<u8> {
        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(&[0xFF, 0xD8, 0x00, 0x11, 0xFF, 0xD9]);
        let len = (payload.len() + 2) as u16;

        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn test_find_jpeg_skips_preamble() {
        let buf = [b'x', b'y', 0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02, 1, 2, 0xFF, 0xD9, b'z'];
        assert_eq!(find_jpeg(&buf), Some((2, 12)));
        assert_eq!(find_jpeg(&buf[..11]), None);
    }

    #[test]
    fn test_find_jpeg_falls_back_on_malformed_headers() {
        let buf = [0xFF, 0xD8, 1, 2, 0xFF, 0xD9];
        assert_eq!(find_jpeg(&buf), Some((0, 6)));
    }

    #[test]
    fn test_exif_thumbnail_does_not_truncate_frame() {
        let full = with_exif_thumbnail(&jpeg(16, 8));
        let mut stream = MjpegStream::new(Cursor::new(multipart(&[full.clone()])));
        assert_eq!(stream.next_jpeg().unwrap(), full);
    }

    #[test]
    fn test_stream_yields_each_part() {
        let body = multipart(&[jpeg(16, 8), jpeg(8, 16)]);
        let mut stream = MjpegStream::new(Cursor::new(body));
        assert_eq!(stream.next_frame().unwrap().dimensions(), (16, 8));
        assert_eq!(stream.next_frame().unwrap().dimensions(), (8, 16));
        assert!(matches!(stream.next_frame(), Err(CaptureError::StreamEnded)));
    }

    #[test]
    fn test_truncated_part_ends_stream() {
        let full = jpeg(8, 8);
        let body = multipart(&[full[..full.len() / 2].to_vec()]);
        let mut stream = MjpegStream::new(Cursor::new(body));
        assert!(matches!(stream.next_jpeg(), Err(CaptureError::StreamEnded)));
    }
}
