use serde::{Deserialize, Serialize};

/// Face region in pixel coordinates: `(top, right, bottom, left)` row/column
/// bounds, exclusive on the bottom/right edge.
///
/// Invariants: `top < bottom`, `left < right`. [`BoundingBox::new`] enforces
/// them; detector adapters are expected to hand out boxes that already hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl BoundingBox {
    /// Build a box, returning `None` if the bounds are degenerate
    /// (`top >= bottom` or `left >= right`).
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Option<Self> {
        if top < bottom && left < right {
            Some(Self { top, right, bottom, left })
        } else {
            None
        }
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Clip the box to an image of `width` × `height` pixels.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        Self::new(
            self.top.min(height),
            self.right.min(width),
            self.bottom.min(height),
            self.left.min(width),
        )
    }

    /// Whether the box lies fully within an image of `width` × `height`.
    pub fn contained_in(&self, width: u32, height: u32) -> bool {
        self.right <= width && self.bottom <= height
    }
}

/// Fixed-length face embedding vector.
///
/// Two embeddings are comparable only if produced by the same extractor
/// configuration; `model_version` records which one that was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean (L2) distance to another embedding of the same dimension.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Cosine distance: `1 − cosine similarity`, in `[0, 2]`.
    ///
    /// Zero-norm vectors compare at distance 1 (no angular information).
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { 1.0 - dot / denom } else { 1.0 }
    }
}

/// Distance metric used by a registry. Fixed at construction time so every
/// stored embedding is compared the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Euclidean,
    Cosine,
}

impl DistanceMetric {
    pub fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        match self {
            DistanceMetric::Euclidean => a.euclidean_distance(b),
            DistanceMetric::Cosine => a.cosine_distance(b),
        }
    }
}

/// Outcome of matching a probe embedding against the registry.
///
/// `Unknown` is a successful result ("recognition ran but found nobody
/// known"), distinct at the type level from pipeline failures.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Match { identity: String, distance: f32 },
    Unknown,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_rejects_degenerate_bounds() {
        assert!(BoundingBox::new(10, 20, 10, 5).is_none());
        assert!(BoundingBox::new(0, 5, 10, 5).is_none());
        assert!(BoundingBox::new(0, 20, 10, 5).is_some());
    }

    #[test]
    fn bounding_box_dimensions() {
        let b = BoundingBox::new(10, 50, 40, 20).unwrap();
        assert_eq!(b.width(), 30);
        assert_eq!(b.height(), 30);
    }

    #[test]
    fn bounding_box_clamp_clips_to_image() {
        let b = BoundingBox::new(10, 500, 400, 20).unwrap();
        let clipped = b.clamp_to(100, 80).unwrap();
        assert_eq!(clipped, BoundingBox::new(10, 100, 80, 20).unwrap());
        assert!(clipped.contained_in(100, 80));
    }

    #[test]
    fn bounding_box_clamp_fully_outside_is_none() {
        let b = BoundingBox::new(200, 300, 250, 220).unwrap();
        assert!(b.clamp_to(100, 100).is_none());
    }

    #[test]
    fn euclidean_distance_identical_is_zero() {
        let a = Embedding::new(vec![0.5, -0.25, 1.0]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn euclidean_distance_unit_axes() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!((a.euclidean_distance(&b) - std::f32::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_identical_is_zero() {
        let a = Embedding::new(vec![0.3, 0.4, 0.0]);
        assert!(a.cosine_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_orthogonal_is_one() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!((a.cosine_distance(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_opposite_is_two() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.cosine_distance(&b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.cosine_distance(&b), 1.0);
    }
}
