//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the SCRFD `det_10g` model on letterboxed RGB frames and decodes its
//! three stride levels (anchor-free boxes plus five landmarks) followed by NMS.

use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::cmp::Ordering;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Default minimum score for a detection to be kept.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (download det_10g.onnx from insightface and place it in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame is {len} bytes, expected {width}x{height} RGB")]
    BadFrame { len: usize, width: u32, height: u32 },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A frame must be non-empty packed RGB of exactly `width * height * 3` bytes.
fn check_frame(rgb: &[u8], width: u32, height: u32) -> Result<(), DetectorError> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(3));
    if width == 0 || height == 0 || expected != Some(rgb.len()) {
        return Err(DetectorError::BadFrame {
            len: rgb.len(),
            width,
            height,
        });
    }
    Ok(())
}

/// Mapping from letterboxed model space back to frame space.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: usize, height: usize, target: usize) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (target as f32 - new_w) / 2.0,
            pad_y: (target as f32 - new_h) / 2.0,
        }
    }

    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score, bbox, kps).
type StrideOutputs = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    input_size: usize,
    confidence_threshold: f32,
    stride_outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_outputs = map_outputs(&output_names);
        tracing::debug!(?stride_outputs, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_size: SCRFD_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            stride_outputs,
        })
    }

    /// Override the minimum detection score.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Detect faces in a packed RGB frame, sorted by descending confidence.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        check_frame(rgb, width, height)?;

        let (input, letterbox) = preprocess(rgb, width as usize, height as usize, self.input_size);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (level, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_outputs[level];
            let tensor = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };

            let level_out = StrideLevel {
                scores: tensor(score_idx, "scores")?,
                bboxes: tensor(bbox_idx, "bboxes")?,
                kps: tensor(kps_idx, "kps")?,
                stride,
                grid: self.input_size / stride,
            };
            candidates.extend(level_out.decode(&letterbox, self.confidence_threshold));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::trace!(count = faces.len(), "SCRFD detections after NMS");
        Ok(faces)
    }
}

/// Letterbox an RGB frame into a square NCHW tensor normalized for SCRFD.
///
/// Padding uses the mean value so it normalizes to 0.0.
fn preprocess(rgb: &[u8], width: usize, height: usize, target: usize) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(width, height, target);
    let new_w = ((width as f32 * letterbox.scale).round() as usize).clamp(1, target);
    let new_h = ((height as f32 * letterbox.scale).round() as usize).clamp(1, target);
    let resized = resize_bilinear_rgb(rgb, width, height, new_w, new_h);

    let x0 = letterbox.pad_x.floor() as usize;
    let y0 = letterbox.pad_y.floor() as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, target, target));

    for y in 0..target {
        for x in 0..target {
            let inside = y >= y0 && y < y0 + new_h && x >= x0 && x < x0 + new_w;
            for c in 0..3 {
                let pixel = if inside {
                    resized[((y - y0) * new_w + (x - x0)) * 3 + c] as f32
                } else {
                    SCRFD_MEAN
                };
                tensor[[0, c, y, x]] = (pixel - SCRFD_MEAN) / SCRFD_STD;
            }
        }
    }

    (tensor, letterbox)
}

/// Bilinear resize of packed RGB8 with half-pixel centers.
pub(crate) fn resize_bilinear_rgb(
    src: &[u8],
    width: usize,
    height: usize,
    new_w: usize,
    new_h: usize,
) -> Vec<u8> {
    let sx = width as f32 / new_w as f32;
    let sy = height as f32 / new_h as f32;
    let mut out = vec![0u8; new_w * new_h * 3];

    for y in 0..new_h {
        let fy_src = ((y as f32 + 0.5) * sy - 0.5).max(0.0);
        let y0 = (fy_src.floor() as usize).min(height - 1);
        let y1 = (y0 + 1).min(height - 1);
        let fy = fy_src - y0 as f32;

        for x in 0..new_w {
            let fx_src = ((x as f32 + 0.5) * sx - 0.5).max(0.0);
            let x0 = (fx_src.floor() as usize).min(width - 1);
            let x1 = (x0 + 1).min(width - 1);
            let fx = fx_src - x0 as f32;

            for c in 0..3 {
                let at = |xx: usize, yy: usize| src[(yy * width + xx) * 3 + c] as f32;
                let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
                let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
                let val = top * (1.0 - fy) + bottom * fy;
                out[(y * new_w + x) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}

/// Map SCRFD outputs to stride slots.
///
/// Exports either name their tensors `score_8`, `bbox_16`, `kps_32`, ... or use
/// numeric names in the standard order `[scores ×3, bboxes ×3, kps ×3]`.
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let mut named = [(0usize, 0usize, 0usize); 3];
    for (level, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride), find("kps", stride)) {
            (Some(s), Some(b), Some(k)) => named[level] = (s, b, k),
            _ => {
                tracing::info!(?names, "SCRFD output names not recognized, using positional mapping");
                return [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
            }
        }
    }
    named
}

/// Raw outputs for one stride level.
struct StrideLevel<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
    stride: usize,
    grid: usize,
}

impl StrideLevel<'_> {
    fn decode(&self, letterbox: &Letterbox, threshold: f32) -> Vec<BoundingBox> {
        let stride = self.stride as f32;
        let anchors = self.grid * self.grid * SCRFD_ANCHORS_PER_CELL;
        let mut out = Vec::new();

        for idx in 0..anchors {
            let score = self.scores.get(idx).copied().unwrap_or(0.0);
            if score <= threshold {
                continue;
            }
            let Some(b) = self.bboxes.get(idx * 4..idx * 4 + 4) else {
                continue;
            };

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % self.grid) as f32 * stride;
            let ay = (cell / self.grid) as f32 * stride;

            let (x1, y1) = letterbox.unmap(ax - b[0] * stride, ay - b[1] * stride);
            let (x2, y2) = letterbox.unmap(ax + b[2] * stride, ay + b[3] * stride);

            let landmarks = self.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| {
                    letterbox.unmap(ax + k[i * 2] * stride, ay + k[i * 2 + 1] * stride)
                })
            });

            out.push(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            });
        }

        out
    }
}

fn by_confidence_desc(a: &BoundingBox, b: &BoundingBox) -> Ordering {
    b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal)
}

/// Non-maximum suppression; output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(by_confidence_desc);

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection-over-union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 { inter / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf, landmarks: None }
    }

    #[test]
    fn test_check_frame() {
        assert!(check_frame(&[0; 12], 2, 2).is_ok());
        assert!(check_frame(&[0; 11], 2, 2).is_err());
        assert!(check_frame(&[], 0, 0).is_err());
        // 40000 * 40000 * 3 wraps in u32 arithmetic.
        assert!(matches!(
            check_frame(&[0; 12], 40_000, 40_000),
            Err(DetectorError::BadFrame { width: 40_000, .. })
        ));
        assert!(check_frame(&[0; 12], u32::MAX, u32::MAX).is_err());
    }

    #[test]
    fn test_iou_identical() {
        let a = bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = bbox(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = bbox(20.0, 20.0, 10.0, 10.0, 1.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_of_overlap() {
        let result = nms(
            vec![
                bbox(5.0, 5.0, 100.0, 100.0, 0.8),
                bbox(200.0, 200.0, 50.0, 50.0, 0.7),
                bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            ],
            0.4,
        );
        let confs: Vec<f32> = result.iter().map(|b| b.confidence).collect();
        assert_eq!(confs, vec![0.9, 0.7]);
    }

    #[test]
    fn test_letterbox_unmap_roundtrip() {
        let lb = Letterbox::fit(640, 480, 640);
        assert!((lb.scale - 1.0).abs() < 1e-6);
        assert!((lb.pad_y - 80.0).abs() < 1e-6);
        let (x, y) = lb.unmap(100.0 * lb.scale + lb.pad_x, 50.0 * lb.scale + lb.pad_y);
        assert!((x - 100.0).abs() < 1e-3 && (y - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_map_outputs_named_out_of_order() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(map_outputs(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_map_outputs_positional_fallback() {
        let names: Vec<String> = (448..457).map(|i: usize| i.to_string()).collect();
        assert_eq!(map_outputs(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let src = [10u8, 200, 30].repeat(50 * 40);
        let out = resize_bilinear_rgb(&src, 50, 40, 120, 77);
        assert_eq!(out.len(), 120 * 77 * 3);
        assert!(out.chunks_exact(3).all(|p| p == [10, 200, 30]));
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let rgb = vec![255u8; 64 * 32 * 3];
        let (tensor, lb) = preprocess(&rgb, 64, 32, 64);
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert!((lb.pad_y - 16.0).abs() < 1e-6);
        // top padding row normalizes to 0, image rows to (255-127.5)/128
        assert_eq!(tensor[[0, 1, 0, 10]], 0.0);
        assert!((tensor[[0, 2, 20, 10]] - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-6);
    }

    #[test]
    fn test_decode_single_anchor() {
        // grid 2x2, 2 anchors per cell; only anchor 2 (cell 1 → x=1,y=0) fires
        let mut scores = vec![0.0f32; 8];
        scores[2] = 0.9;
        let mut bboxes = vec![0.0f32; 32];
        bboxes[8..12].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
        let kps = vec![0.0f32; 80];
        let level = StrideLevel { scores: &scores, bboxes: &bboxes, kps: &kps, stride: 8, grid: 2 };
        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };

        let dets = level.decode(&lb, 0.5);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!((d.x, d.y, d.width, d.height), (0.0, -8.0, 16.0, 16.0));
        assert_eq!(d.landmarks.unwrap()[0], (8.0, 0.0));
    }
}
