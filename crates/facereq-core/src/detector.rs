//! Face detection capability and its ONNX production adapter.
//!
//! The production adapter runs an UltraFace-style detector (fixed 320×240
//! input, two output tensors: per-anchor scores and normalized corner
//! boxes) via ONNX Runtime, with NMS post-processing.

use crate::types::BoundingBox;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ULTRAFACE_INPUT_WIDTH: usize = 320;
const ULTRAFACE_INPUT_HEIGHT: usize = 240;
const ULTRAFACE_MEAN: f32 = 127.0;
const ULTRAFACE_STD: f32 = 128.0;
const ULTRAFACE_CONFIDENCE_THRESHOLD: f32 = 0.7;
const ULTRAFACE_NMS_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("model file not found: {0} — download an UltraFace ONNX export and place it in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Locates face regions in a decoded image.
///
/// Zero boxes is a valid, non-exceptional return. No ordering is promised
/// by the capability itself; callers that care which face they get must
/// apply their own policy to the returned sequence.
pub trait FaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectError>;
}

/// Candidate detection in normalized [0, 1] corner coordinates.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

/// UltraFace-based face detector.
pub struct OnnxFaceDetector {
    session: Session,
}

impl OnnxFaceDetector {
    /// Load the UltraFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectError> {
        if !Path::new(model_path).exists() {
            return Err(DetectError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name().to_string()).collect::<Vec<_>>(),
            "loaded UltraFace model"
        );

        if session.outputs().len() < 2 {
            return Err(DetectError::InferenceFailed(format!(
                "UltraFace model requires 2 outputs (scores, boxes), got {}",
                session.outputs().len()
            )));
        }

        Ok(Self { session })
    }

    /// Resize to the fixed model input and normalize to an NCHW tensor.
    fn preprocess(image: &RgbImage) -> Array4<f32> {
        let resized = image::imageops::resize(
            image,
            ULTRAFACE_INPUT_WIDTH as u32,
            ULTRAFACE_INPUT_HEIGHT as u32,
            image::imageops::FilterType::Triangle,
        );

        let mut tensor =
            Array4::<f32>::zeros((1, 3, ULTRAFACE_INPUT_HEIGHT, ULTRAFACE_INPUT_WIDTH));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel.0[c] as f32 - ULTRAFACE_MEAN) / ULTRAFACE_STD;
            }
        }
        tensor
    }
}

impl FaceDetector for OnnxFaceDetector {
    /// Detect faces, returning pixel-space boxes sorted by confidence.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectError> {
        let input = Self::preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        // Output 0: scores [1, N, 2] (background, face); output 1: boxes
        // [1, N, 4] as normalized [x1, y1, x2, y2].
        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectError::InferenceFailed(format!("boxes: {e}")))?;

        let candidates = decode_candidates(scores, boxes, ULTRAFACE_CONFIDENCE_THRESHOLD);
        let kept = nms(candidates, ULTRAFACE_NMS_THRESHOLD);

        Ok(to_pixel_boxes(&kept, image.width(), image.height()))
    }
}

/// Pair scores with boxes and keep candidates above the confidence threshold.
fn decode_candidates(scores: &[f32], boxes: &[f32], threshold: f32) -> Vec<Candidate> {
    let num_anchors = scores.len() / 2;
    let mut candidates = Vec::new();

    for i in 0..num_anchors {
        let score = scores[i * 2 + 1];
        if score <= threshold {
            continue;
        }
        let off = i * 4;
        if off + 3 >= boxes.len() {
            break;
        }
        candidates.push(Candidate {
            x1: boxes[off],
            y1: boxes[off + 1],
            x2: boxes[off + 2],
            y2: boxes[off + 3],
            score,
        });
    }

    candidates
}

/// Non-Maximum Suppression: drop candidates overlapping a stronger one.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for cand in candidates {
        if keep.iter().all(|k| iou(k, &cand) <= iou_threshold) {
            keep.push(cand);
        }
    }
    keep
}

/// Intersection-over-Union of two normalized candidates.
fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 { inter / union } else { 0.0 }
}

/// Map normalized candidates to integer pixel boxes, discarding any that
/// collapse to an empty region after rounding.
fn to_pixel_boxes(candidates: &[Candidate], width: u32, height: u32) -> Vec<BoundingBox> {
    let w = width as f32;
    let h = height as f32;

    candidates
        .iter()
        .filter_map(|c| {
            let left = (c.x1.clamp(0.0, 1.0) * w).round() as u32;
            let top = (c.y1.clamp(0.0, 1.0) * h).round() as u32;
            let right = (c.x2.clamp(0.0, 1.0) * w).round() as u32;
            let bottom = (c.y2.clamp(0.0, 1.0) * h).round() as u32;
            BoundingBox::new(top, right, bottom, left)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Candidate {
        Candidate { x1, y1, x2, y2, score }
    }

    #[test]
    fn iou_identical_boxes() {
        let a = cand(0.1, 0.1, 0.5, 0.5, 0.9);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_disjoint_boxes() {
        let a = cand(0.0, 0.0, 0.2, 0.2, 0.9);
        let b = cand(0.5, 0.5, 0.8, 0.8, 0.9);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn iou_half_overlap() {
        let a = cand(0.0, 0.0, 0.2, 0.2, 0.9);
        let b = cand(0.1, 0.0, 0.3, 0.2, 0.9);
        // Intersection 0.1*0.2, union 2*0.04 - 0.02
        let expected = 0.02 / 0.06;
        assert!((iou(&a, &b) - expected).abs() < 1e-5);
    }

    #[test]
    fn nms_suppresses_weaker_overlap() {
        let candidates = vec![
            cand(0.0, 0.0, 0.4, 0.4, 0.8),
            cand(0.02, 0.02, 0.42, 0.42, 0.9),
            cand(0.6, 0.6, 0.9, 0.9, 0.7),
        ];
        let kept = nms(candidates, 0.3);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
        assert!((kept[1].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn nms_empty_input() {
        assert!(nms(vec![], 0.3).is_empty());
    }

    #[test]
    fn decode_respects_confidence_threshold() {
        // Two anchors: face scores 0.9 and 0.3.
        let scores = [0.1, 0.9, 0.7, 0.3];
        let boxes = [0.1, 0.1, 0.3, 0.3, 0.5, 0.5, 0.7, 0.7];
        let candidates = decode_candidates(&scores, &boxes, 0.7);
        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].score - 0.9).abs() < 1e-6);
        assert!((candidates[0].x1 - 0.1).abs() < 1e-6);
    }

    #[test]
    fn pixel_boxes_scale_and_validate() {
        let kept = [cand(0.25, 0.25, 0.75, 0.5, 0.9)];
        let boxes = to_pixel_boxes(&kept, 400, 200);
        assert_eq!(boxes, vec![BoundingBox::new(50, 300, 100, 100).unwrap()]);
    }

    #[test]
    fn degenerate_pixel_boxes_are_dropped() {
        // Collapses to zero width after rounding on a tiny image.
        let kept = [cand(0.4, 0.1, 0.42, 0.9, 0.9)];
        let boxes = to_pixel_boxes(&kept, 10, 10);
        assert!(boxes.is_empty());
    }

    #[test]
    fn preprocess_shape_and_normalization() {
        let img = RgbImage::from_pixel(64, 48, image::Rgb([127, 127, 127]));
        let tensor = OnnxFaceDetector::preprocess(&img);
        assert_eq!(
            tensor.shape(),
            &[1, 3, ULTRAFACE_INPUT_HEIGHT, ULTRAFACE_INPUT_WIDTH]
        );
        // 127 normalizes to exactly 0.
        assert!(tensor[[0, 0, 0, 0]].abs() < 1e-6);
        assert!(tensor[[0, 2, 100, 200]].abs() < 1e-6);
    }
}
