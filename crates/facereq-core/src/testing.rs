//! Deterministic fake adapters for exercising the pipeline without real
//! imagery or ONNX models.

use crate::detector::{DetectError, FaceDetector};
use crate::embedder::{EmbedError, EmbeddingExtractor};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;

/// Detector that returns a fixed box list on every call.
pub struct FakeDetector {
    boxes: Vec<BoundingBox>,
    fail: bool,
}

impl FakeDetector {
    /// Always report the given boxes, in the given order.
    pub fn returning(boxes: Vec<BoundingBox>) -> Self {
        Self { boxes, fail: false }
    }

    /// Never find a face (zero boxes — a valid detector outcome).
    pub fn none() -> Self {
        Self::returning(Vec::new())
    }

    /// Fail every call with an inference error.
    pub fn failing() -> Self {
        Self { boxes: Vec::new(), fail: true }
    }
}

impl FaceDetector for FakeDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, DetectError> {
        if self.fail {
            return Err(DetectError::InferenceFailed("fake detector failure".into()));
        }
        Ok(self.boxes.clone())
    }
}

/// Extractor that derives a 3-dimensional mean-RGB embedding from the crop.
///
/// Deterministic: identical pixels always produce identical embeddings, so
/// a registry built from it satisfies the self-match property. Solid-color
/// test images land at easily predicted distances from one another.
pub struct FakeExtractor {
    yield_none: bool,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self { yield_none: false }
    }

    /// Yield no embedding for any region (the recoverable "nothing there"
    /// outcome).
    pub fn empty() -> Self {
        Self { yield_none: true }
    }
}

impl Default for FakeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingExtractor for FakeExtractor {
    fn extract(&mut self, face: &RgbImage) -> Result<Option<Embedding>, EmbedError> {
        if self.yield_none {
            return Ok(None);
        }

        let pixels = (face.width() * face.height()) as f32;
        if pixels == 0.0 {
            return Ok(None);
        }

        let mut sums = [0.0f32; 3];
        for pixel in face.pixels() {
            for c in 0..3 {
                sums[c] += pixel.0[c] as f32;
            }
        }

        let values = sums.iter().map(|s| s / (pixels * 255.0)).collect();
        Ok(Some(Embedding::new(values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_extractor_is_deterministic() {
        let face = RgbImage::from_pixel(8, 8, image::Rgb([200, 100, 50]));
        let mut ex = FakeExtractor::new();
        let a = ex.extract(&face).unwrap().unwrap();
        let b = ex.extract(&face).unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dim(), 3);
    }

    #[test]
    fn fake_extractor_mean_color() {
        let face = RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 51]));
        let emb = FakeExtractor::new().extract(&face).unwrap().unwrap();
        assert!((emb.values[0] - 1.0).abs() < 1e-6);
        assert!(emb.values[1].abs() < 1e-6);
        assert!((emb.values[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn empty_extractor_yields_none() {
        let face = RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]));
        assert!(FakeExtractor::empty().extract(&face).unwrap().is_none());
    }

    #[test]
    fn fake_detector_reports_configured_boxes() {
        let boxes = vec![BoundingBox::new(0, 4, 4, 0).unwrap()];
        let img = RgbImage::new(8, 8);
        let mut det = FakeDetector::returning(boxes.clone());
        assert_eq!(det.detect(&img).unwrap(), boxes);
        assert!(FakeDetector::none().detect(&img).unwrap().is_empty());
        assert!(FakeDetector::failing().detect(&img).is_err());
    }
}
