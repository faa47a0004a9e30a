//! Face alignment via 4-DOF similarity transform.
//!
//! Maps the five detected landmarks onto the InsightFace reference layout for
//! a 112×112 crop, then resamples the RGB frame with bilinear interpolation.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [a -b; b a] * src + [tx; ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Closed-form least-squares fit of `src` onto `dst`.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
            (sx / n, sy / n)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for (s, d) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (s.0 - msx, s.1 - msy);
            let (dx, dy) = (d.0 - mdx, d.1 - mdy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }

        if norm < 1e-12 {
            // Degenerate landmarks: fall back to a pure translation.
            return Self {
                a: 1.0,
                b: 0.0,
                tx: mdx - msx,
                ty: mdy - msy,
            };
        }

        let a = dot / norm;
        let b = cross / norm;
        Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Map an output pixel back into the source frame.
    fn invert(&self, u: f32, v: f32) -> (f32, f32) {
        let det = self.a * self.a + self.b * self.b;
        let (u, v) = (u - self.tx, v - self.ty);
        ((self.a * u + self.b * v) / det, (-self.b * u + self.a * v) / det)
    }
}

/// Bilinear sample of one pixel; samples outside the frame read as black.
fn sample(frame: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = frame.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return Rgb([0, 0, 0]);
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let tl = frame.get_pixel(x0, y0);
    let tr = frame.get_pixel(x1, y0);
    let bl = frame.get_pixel(x0, y1);
    let br = frame.get_pixel(x1, y1);

    Rgb(std::array::from_fn(|c| {
        let top = tl[c] as f32 * (1.0 - fx) + tr[c] as f32 * fx;
        let bottom = bl[c] as f32 * (1.0 - fx) + br[c] as f32 * fx;
        (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
    }))
}

/// Produce a 112×112 RGB crop with the landmarks in canonical position.
pub fn align_face(frame: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let transform = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112);
    RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |u, v| {
        let (x, y) = transform.invert(u as f32, v as f32);
        sample(frame, x, y)
    })
}
