//! Face alignment via a 4-DOF similarity transform.
//!
//! Warps a detected face onto the canonical 112×112 ArcFace template using
//! the five detected landmarks and a least-squares fit.

/// ArcFace template landmarks for a 112×112 crop.
pub(crate) const TEMPLATE_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: usize = 112;

/// Similarity transform `dst = s·R·src + t`, stored as (a, b, tx, ty) with
/// `a = s·cosθ`, `b = s·sinθ`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit of `src` onto `dst`.
    ///
    /// Closed form: center both point sets, then
    /// `a = Σ(x·x' + y·y') / Σ|p|²`, `b = Σ(x·y' − y·x') / Σ|p|²`.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / 5.0, sy / 5.0)
        };
        let (smx, smy) = mean(src);
        let (dmx, dmy) = mean(dst);

        let mut num_a = 0.0f32;
        let mut num_b = 0.0f32;
        let mut denom = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (x, y) = (sx - smx, sy - smy);
            let (u, v) = (dx - dmx, dy - dmy);
            num_a += x * u + y * v;
            num_b += x * v - y * u;
            denom += x * x + y * y;
        }

        if denom < 1e-12 {
            // Degenerate landmarks: translate only.
            return Self { a: 1.0, b: 0.0, tx: dmx - smx, ty: dmy - smy };
        }

        let a = num_a / denom;
        let b = num_b / denom;
        Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        }
    }

    /// Map an output (template-space) point back into the source frame.
    fn invert_point(&self, ox: f32, oy: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let dx = ox - self.tx;
        let dy = oy - self.ty;
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Warp a packed RGB frame into an `out_size`² RGB crop.
///
/// Bilinear sampling; pixels mapped outside the frame are black.
fn warp_rgb(rgb: &[u8], width: usize, height: usize, t: &Similarity, out_size: usize) -> Vec<u8> {
    let mut out = vec![0u8; out_size * out_size * 3];

    let sample = |x: i64, y: i64, c: usize| -> f32 {
        if x >= 0 && (x as usize) < width && y >= 0 && (y as usize) < height {
            rgb[(y as usize * width + x as usize) * 3 + c] as f32
        } else {
            0.0
        }
    };

    for oy in 0..out_size {
        for ox in 0..out_size {
            let Some((sx, sy)) = t.invert_point(ox as f32, oy as f32) else {
                return out;
            };
            let x0 = sx.floor() as i64;
            let y0 = sy.floor() as i64;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            for c in 0..3 {
                let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                out[(oy * out_size + ox) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}

/// Align a detected face to a canonical 112×112 RGB crop for ArcFace.
pub fn align_face(rgb: &[u8], width: u32, height: u32, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let t = Similarity::estimate(landmarks, &TEMPLATE_112);
    warp_rgb(rgb, width as usize, height as usize, &t, ALIGNED_SIZE)
}
