//! Face alignment onto the canonical ArcFace crop.
//!
//! Fits a similarity transform (scale, rotation, translation) from the five
//! detected landmarks to the InsightFace reference positions, then resamples
//! the face into a 112×112 grayscale crop.

/// ArcFace reference landmarks for a 112×112 output.
pub const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: usize = 112;

/// Forward similarity transform `dst = [a -b; b a] * src + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Closed-form least-squares fit between two centred point sets.
    fn fit(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let n = src.len() as f32;
        let (smx, smy) = mean(src);
        let (dmx, dmy) = mean(dst);

        let mut num_a = 0.0f32;
        let mut num_b = 0.0f32;
        let mut den = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (sx - smx, sy - smy);
            let (dx, dy) = (dx - dmx, dy - dmy);
            num_a += sx * dx + sy * dy;
            num_b += sx * dy - sy * dx;
            den += sx * sx + sy * sy;
        }
        if den / n < 1e-6 {
            return None;
        }

        let a = num_a / den;
        let b = num_b / den;
        Some(Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        })
    }

    /// Map an output pixel back into the source frame.
    fn invert_point(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

fn mean(pts: &[(f32, f32); 5]) -> (f32, f32) {
    let n = pts.len() as f32;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
    (sx / n, sy / n)
}

fn sample_bilinear(frame: &[u8], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let px = |xi: i64, yi: i64| -> f32 {
        if xi < 0 || yi < 0 || xi >= width as i64 || yi >= height as i64 {
            0.0
        } else {
            frame[yi as usize * width + xi as usize] as f32
        }
    };

    let top = px(x0, y0) * (1.0 - fx) + px(x0 + 1, y0) * fx;
    let bottom = px(x0, y0 + 1) * (1.0 - fx) + px(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Align a detected face to a canonical 112×112 grayscale crop.
///
/// Degenerate landmarks (all points coincident) produce a black crop.
pub fn align_face(frame: &[u8], width: u32, height: u32, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let mut out = vec![0u8; ALIGNED_SIZE * ALIGNED_SIZE];
    let Some(transform) = Similarity::fit(landmarks, &REFERENCE_LANDMARKS) else {
        tracing::debug!("degenerate landmarks, skipping alignment");
        return out;
    };

    let (w, h) = (width as usize, height as usize);
    for oy in 0..ALIGNED_SIZE {
        for ox in 0..ALIGNED_SIZE {
            if let Some((sx, sy)) = transform.invert_point(ox as f32, oy as f32) {
                let v = sample_bilinear(frame, w, h, sx, sy);
                out[oy * ALIGNED_SIZE + ox] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}
