use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter_w = ((self.x + self.width).min(other.x + other.width) - self.x.max(other.x)).max(0.0);
        let inter_h =
            ((self.y + self.height).min(other.y + other.height) - self.y.max(other.y)).max(0.0);
        let inter = inter_w * inter_h;
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Zero vectors compare as 0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let (dot, norm_a, norm_b) = self
            .values
            .iter()
            .zip(other.values.iter())
            .fold((0.0f32, 0.0f32, 0.0f32), |(d, na, nb), (a, b)| {
                (d + a * b, na + a * a, nb + b * b)
            });

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// One registered face sample in the in-memory gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceModel {
    pub id: String,
    pub name: String,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best candidate [-1, 1].
    pub similarity: f32,
    pub model_id: Option<String>,
    pub name: Option<String>,
}

/// Strategy for comparing a probe embedding against the registered gallery.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceModel], threshold: f32) -> MatchResult;
}

/// Cosine similarity matcher over the full gallery.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceModel], threshold: f32) -> MatchResult {
        let best = gallery
            .iter()
            .map(|model| (model, probe.similarity(&model.embedding)))
            .fold(None::<(&FaceModel, f32)>, |best, (model, sim)| match best {
                Some((_, best_sim)) if best_sim >= sim => best,
                _ => Some((model, sim)),
            });

        match best {
            Some((model, sim)) if sim >= threshold => MatchResult {
                matched: true,
                similarity: sim,
                model_id: Some(model.id.clone()),
                name: Some(model.name.clone()),
            },
            Some((_, sim)) => MatchResult {
                matched: false,
                similarity: sim,
                model_id: None,
                name: None,
            },
            None => MatchResult {
                matched: false,
                similarity: 0.0,
                model_id: None,
                name: None,
            },
        }
    }
}
