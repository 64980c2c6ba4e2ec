//! facereq-core — Face identity enrollment and recognition.
//!
//! Turns reference images into fixed-length embeddings, keeps an in-memory
//! registry of identity → embedding, and matches query images against it.
//! Detection and embedding are narrow capabilities with ONNX production
//! adapters (UltraFace, ArcFace) and deterministic fakes for tests.

pub mod detector;
pub mod embedder;
pub mod pipeline;
pub mod registry;
pub mod testing;
pub mod types;

pub use detector::{FaceDetector, OnnxFaceDetector};
pub use embedder::{EmbeddingExtractor, OnnxEmbedder};
pub use pipeline::{detect_and_crop, EnrollReport, Pipeline, Recognition, RecognizeError};
pub use registry::Registry;
pub use types::{BoundingBox, DistanceMetric, Embedding, MatchResult};
