//! Recognition and enrollment orchestration.
//!
//! A query walks `Loaded → Detected → Cropped → Embedded → Matched`, with
//! any stage able to fail terminally instead of advancing. No stage is
//! retried here; retry belongs to acquisition, and a caller wanting
//! another shot at recognition re-invokes with a different input.

use crate::detector::{DetectError, FaceDetector};
use crate::embedder::{EmbedError, EmbeddingExtractor};
use crate::registry::Registry;
use crate::types::{BoundingBox, Embedding, MatchResult};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("could not load image {}: {source}", .path.display())]
    ImageLoad {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("no face detected")]
    NoFaceDetected,
    #[error("detected face region yielded no embedding")]
    NoEmbedding,
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
}

/// Successful recognition: the match outcome plus the cropped face region
/// it was computed from. `MatchResult::Unknown` is still a success.
#[derive(Debug)]
pub struct Recognition {
    pub result: MatchResult,
    pub face: RgbImage,
    pub bounds: BoundingBox,
}

/// Outcome of a batch enrollment pass.
#[derive(Debug, Default)]
pub struct EnrollReport {
    pub enrolled: Vec<String>,
    pub skipped: Vec<String>,
}

/// Detect → crop → embed orchestrator over pluggable capabilities.
pub struct Pipeline<D, E> {
    detector: D,
    extractor: E,
}

impl<D: FaceDetector, E: EmbeddingExtractor> Pipeline<D, E> {
    pub fn new(detector: D, extractor: E) -> Self {
        Self { detector, extractor }
    }

    /// Steps 1–4: detect, pick the first face in detector output order,
    /// crop, embed. Shared by recognition and enrollment.
    fn embed_first_face(
        &mut self,
        image: &RgbImage,
    ) -> Result<(Embedding, RgbImage, BoundingBox), RecognizeError> {
        let (face, bounds) = detect_and_crop(&mut self.detector, image)?;
        let embedding = self
            .extractor
            .extract(&face)?
            .ok_or(RecognizeError::NoEmbedding)?;

        Ok((embedding, face, bounds))
    }

    /// Recognize the face in `image` against `registry`.
    ///
    /// Returns the match result together with the cropped face region; a
    /// failed stage returns its error and produces no crop.
    pub fn recognize(
        &mut self,
        image: &RgbImage,
        registry: &Registry,
        threshold: f32,
    ) -> Result<Recognition, RecognizeError> {
        let (embedding, face, bounds) = self.embed_first_face(image)?;
        let result = registry.lookup_nearest(&embedding, threshold);
        Ok(Recognition { result, face, bounds })
    }

    /// Load an image from disk and recognize it.
    pub fn recognize_file(
        &mut self,
        path: &Path,
        registry: &Registry,
        threshold: f32,
    ) -> Result<Recognition, RecognizeError> {
        let image = load_image(path)?;
        self.recognize(&image, registry, threshold)
    }

    /// Enroll one reference image under `identity`.
    ///
    /// Stores the first successfully detected and embedded face;
    /// re-enrolling an identity overwrites its registry entry.
    pub fn enroll_image(
        &mut self,
        registry: &mut Registry,
        identity: &str,
        image: &RgbImage,
    ) -> Result<(), RecognizeError> {
        let (embedding, _, _) = self.embed_first_face(image)?;
        registry.enroll(identity, embedding);
        Ok(())
    }

    /// Enroll every image file in `dir`, filename stem as the identity key.
    ///
    /// One identity's failure (unreadable file, no face, no embedding) is
    /// logged and that identity skipped; nothing propagates out of the
    /// batch. Files are visited in name order so enrollment order — and
    /// therefore the registry's tie-break order — is deterministic.
    pub fn enroll_dir(&mut self, registry: &mut Registry, dir: &Path) -> EnrollReport {
        let mut report = EnrollReport::default();

        let mut paths: Vec<PathBuf> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect(),
            Err(err) => {
                tracing::error!(dir = %dir.display(), error = %err, "cannot read enrollment directory");
                return report;
            }
        };
        paths.sort();

        for path in paths {
            let Some(identity) = path.file_stem().map(|s| s.to_string_lossy().into_owned())
            else {
                continue;
            };

            let outcome = load_image(&path)
                .and_then(|image| self.enroll_image(registry, &identity, &image));

            match outcome {
                Ok(()) => {
                    tracing::info!(identity = %identity, "enrolled");
                    report.enrolled.push(identity);
                }
                Err(err) => {
                    tracing::warn!(identity = %identity, error = %err, "skipping identity");
                    report.skipped.push(identity);
                }
            }
        }

        tracing::info!(
            enrolled = report.enrolled.len(),
            skipped = report.skipped.len(),
            "enrollment batch complete"
        );
        report
    }
}

/// Detect faces and crop to the first box in detector output order
/// (first-detected policy: no size or confidence re-ranking).
///
/// Zero detected faces fails with `NoFaceDetected` and produces no crop.
pub fn detect_and_crop<D: FaceDetector>(
    detector: &mut D,
    image: &RgbImage,
) -> Result<(RgbImage, BoundingBox), RecognizeError> {
    let boxes = detector.detect(image)?;
    tracing::debug!(faces = boxes.len(), "detection complete");

    let bounds = boxes
        .first()
        .and_then(|b| b.clamp_to(image.width(), image.height()))
        .ok_or(RecognizeError::NoFaceDetected)?;

    Ok((crop(image, &bounds), bounds))
}

fn load_image(path: &Path) -> Result<RgbImage, RecognizeError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| RecognizeError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })
}

/// Crop `image` to `bounds`. The box must already be clamped to the image.
fn crop(image: &RgbImage, bounds: &BoundingBox) -> RgbImage {
    image::imageops::crop_imm(
        image,
        bounds.left,
        bounds.top,
        bounds.width(),
        bounds.height(),
    )
    .to_image()
}
