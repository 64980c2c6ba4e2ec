//! Embedding extraction capability and its ONNX production adapter.
//!
//! The production adapter runs an ArcFace-style recognition model (112×112
//! input, one embedding vector out) via ONNX Runtime and L2-normalizes the
//! result so Euclidean and cosine comparisons both behave.

use crate::types::Embedding;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const EMBED_INPUT_SIZE: usize = 112;
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 127.5; // symmetric normalization, ArcFace convention

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("model file not found: {0} — download an ArcFace ONNX export and place it in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Converts a cropped face region into a fixed-length embedding.
///
/// `Ok(None)` means the region yields no embedding — an expected,
/// recoverable outcome, not a defect. Assumed deterministic for identical
/// pixel input.
pub trait EmbeddingExtractor {
    fn extract(&mut self, face: &RgbImage) -> Result<Option<Embedding>, EmbedError>;
}

/// ArcFace-style ONNX embedding extractor.
///
/// The embedding dimensionality is whatever the model emits; every
/// embedding is tagged with the model file stem so registries can tell
/// incompatible extractor configurations apart.
pub struct OnnxEmbedder {
    session: Session,
    model_version: String,
}

impl OnnxEmbedder {
    /// Load the recognition ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let model_version = Path::new(model_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        tracing::info!(
            path = model_path,
            version = %model_version,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name().to_string()).collect::<Vec<_>>(),
            "loaded embedding model"
        );

        Ok(Self { session, model_version })
    }

    /// Resize a face crop to the model input and normalize to NCHW.
    fn preprocess(face: &RgbImage) -> Array4<f32> {
        let resized = image::imageops::resize(
            face,
            EMBED_INPUT_SIZE as u32,
            EMBED_INPUT_SIZE as u32,
            image::imageops::FilterType::Triangle,
        );

        let mut tensor = Array4::<f32>::zeros((1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel.0[c] as f32 - EMBED_MEAN) / EMBED_STD;
            }
        }
        tensor
    }
}

impl EmbeddingExtractor for OnnxEmbedder {
    fn extract(&mut self, face: &RgbImage) -> Result<Option<Embedding>, EmbedError> {
        let input = Self::preprocess(face);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedError::InferenceFailed(format!("embedding output: {e}")))?;

        if raw.is_empty() {
            tracing::warn!("embedding model produced an empty output for this region");
            return Ok(None);
        }

        // L2-normalize; a zero-norm vector carries no identity signal.
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm <= 0.0 {
            tracing::warn!("embedding model produced a zero vector for this region");
            return Ok(None);
        }

        Ok(Some(Embedding {
            values: raw.iter().map(|x| x / norm).collect(),
            model_version: Some(self.model_version.clone()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_output_shape() {
        let face = RgbImage::from_pixel(80, 60, image::Rgb([10, 20, 30]));
        let tensor = OnnxEmbedder::preprocess(&face);
        assert_eq!(tensor.shape(), &[1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE]);
    }

    #[test]
    fn preprocess_symmetric_normalization() {
        // 0 → -1.0, 255 → +1.0 exactly.
        let dark = RgbImage::from_pixel(112, 112, image::Rgb([0, 0, 0]));
        let bright = RgbImage::from_pixel(112, 112, image::Rgb([255, 255, 255]));
        assert!((OnnxEmbedder::preprocess(&dark)[[0, 0, 5, 5]] + 1.0).abs() < 1e-6);
        assert!((OnnxEmbedder::preprocess(&bright)[[0, 1, 5, 5]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn preprocess_keeps_channels_separate() {
        let face = RgbImage::from_pixel(112, 112, image::Rgb([255, 0, 255]));
        let tensor = OnnxEmbedder::preprocess(&face);
        assert!(tensor[[0, 0, 0, 0]] > 0.99);
        assert!(tensor[[0, 1, 0, 0]] < -0.99);
        assert!(tensor[[0, 2, 0, 0]] > 0.99);
    }
}
