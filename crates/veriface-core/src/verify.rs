//! Verification decision: distance metric, threshold table, confidence.
//!
//! The threshold table maps each (embedding model, distance metric) pair to
//! the maximum distance at which two embeddings still count as the same
//! person. Confidence is a threshold-relative score in [0, 100], reported
//! only for matches.

use crate::recognizer::EmbedModel;
use crate::types::Embedding;
use serde::{Deserialize, Serialize};

pub const REASON_MATCH: &str = "Face matched";
pub const REASON_MISMATCH: &str = "Face mismatch - proxy attempt";

/// Dissimilarity metric between two embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    /// Euclidean distance between L2-normalized vectors.
    EuclideanL2,
}

impl DistanceMetric {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cosine" => Some(Self::Cosine),
            "euclidean" => Some(Self::Euclidean),
            "euclidean_l2" => Some(Self::EuclideanL2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::EuclideanL2 => "euclidean_l2",
        }
    }

    pub fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        match self {
            Self::Cosine => a.cosine_distance(b),
            Self::Euclidean => a.euclidean_distance(b),
            Self::EuclideanL2 => a.euclidean_l2_distance(b),
        }
    }
}

/// Cutoff distance for the given (model, metric) pair.
///
/// Fixed at startup; values come from the published per-model operating
/// points of each embedding model.
pub fn threshold(model: EmbedModel, metric: DistanceMetric) -> f32 {
    use DistanceMetric::*;
    use EmbedModel::*;
    match (model, metric) {
        (VggFace, Cosine) => 0.40,
        (VggFace, Euclidean) => 0.60,
        (VggFace, EuclideanL2) => 0.86,
        (Facenet, Cosine) => 0.40,
        (Facenet, Euclidean) => 10.0,
        (Facenet, EuclideanL2) => 0.80,
        (Facenet512, Cosine) => 0.30,
        (Facenet512, Euclidean) => 23.56,
        (Facenet512, EuclideanL2) => 1.04,
        (ArcFace, Cosine) => 0.68,
        (ArcFace, Euclidean) => 4.15,
        (ArcFace, EuclideanL2) => 1.13,
    }
}

/// Outcome of comparing a probe embedding against a stored embedding.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub matched: bool,
    pub distance: f32,
    pub threshold: f32,
    /// Threshold-relative confidence in [0, 100]; 0 for a mismatch.
    pub confidence: f64,
    pub reason: &'static str,
}

/// Compare a stored embedding against a probe under the given metric and
/// threshold. The threshold boundary is inclusive: `distance == threshold`
/// is still a match, with confidence 0.
pub fn decide(
    stored: &Embedding,
    probe: &Embedding,
    metric: DistanceMetric,
    threshold: f32,
) -> Decision {
    let distance = metric.distance(stored, probe);
    decide_from_distance(distance, threshold)
}

/// Classify a precomputed distance against a threshold.
pub fn decide_from_distance(distance: f32, threshold: f32) -> Decision {
    let matched = distance <= threshold;
    // Confidence is only derived from the linear formula for matches; a
    // mismatch reports 0 rather than a residual "similarity" for something
    // already classified as a different person.
    let confidence = if matched {
        confidence_score(distance, threshold)
    } else {
        0.0
    };
    Decision {
        matched,
        distance,
        threshold,
        confidence,
        reason: if matched { REASON_MATCH } else { REASON_MISMATCH },
    }
}

/// Linear interpolation from the threshold (0%) down to distance zero
/// (100%), clamped to [0, 100] and rounded to two decimals.
fn confidence_score(distance: f32, threshold: f32) -> f64 {
    if threshold <= 0.0 {
        return 0.0;
    }
    let raw = (1.0 - f64::from(distance) / f64::from(threshold)) * 100.0;
    (raw.clamp(0.0, 100.0) * 100.0).round() / 100.0
}
