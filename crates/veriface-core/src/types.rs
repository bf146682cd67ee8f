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

/// Face embedding vector. Dimensionality depends on the producing model:
/// 2622 for VGG-Face, 128 for Facenet, 512 for Facenet512 and ArcFace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Name of the model that produced this embedding (e.g., "ArcFace").
    pub model: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model: None }
    }

    /// Cosine distance: `1 − dot(a,b) / (‖a‖·‖b‖)`, in [0, 2].
    ///
    /// Defined as 1.0 (maximal useful distance) when either vector has zero
    /// norm, so a degenerate embedding is classified as a non-match instead
    /// of producing a division error.
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
        if denom > 0.0 {
            1.0 - dot / denom
        } else {
            1.0
        }
    }

    /// Euclidean (L2) distance between raw embedding vectors.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Euclidean distance between the L2-normalized vectors.
    pub fn euclidean_l2_distance(&self, other: &Embedding) -> f32 {
        let a = l2_normalize(&self.values);
        let b = l2_normalize(&other.values);
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// L2-normalize a vector; a zero-norm vector is returned unchanged.
pub fn l2_normalize(values: &[f32]) -> Vec<f32> {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|x| x / norm).collect()
    } else {
        values.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding::new(values)
    }

    #[test]
    fn test_cosine_distance_identical() {
        let a = emb(vec![1.0, 0.0, 0.0]);
        assert!(a.cosine_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        let a = emb(vec![1.0, 0.0]);
        let b = emb(vec![0.0, 1.0]);
        assert!((a.cosine_distance(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        let a = emb(vec![1.0, 0.0]);
        let b = emb(vec![-1.0, 0.0]);
        assert!((a.cosine_distance(&b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_zero_norm_is_maximal() {
        let a = emb(vec![0.0, 0.0]);
        let b = emb(vec![1.0, 0.0]);
        assert_eq!(a.cosine_distance(&b), 1.0);
        assert_eq!(b.cosine_distance(&a), 1.0);
    }

    #[test]
    fn test_cosine_distance_symmetric() {
        let a = emb(vec![0.3, -1.2, 0.5, 2.0]);
        let b = emb(vec![1.1, 0.4, -0.2, 0.9]);
        assert!((a.cosine_distance(&b) - b.cosine_distance(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = emb(vec![0.0, 0.0]);
        let b = emb(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_l2_scale_invariant() {
        // Scaling one vector must not change the normalized distance.
        let a = emb(vec![1.0, 2.0, 3.0]);
        let b = emb(vec![3.0, 1.0, 2.0]);
        let scaled = emb(vec![6.0, 2.0, 4.0]);
        assert!((a.euclidean_l2_distance(&b) - a.euclidean_l2_distance(&scaled)).abs() < 1e-5);
    }

    #[test]
    fn test_l2_normalize_unit_norm() {
        let v = l2_normalize(&[3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
