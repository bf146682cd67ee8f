//! Extraction pipeline: image bytes → exactly one face → embedding.
//!
//! The zero/one/many face policy applies to every extraction, both at
//! registration time and to the freshly captured probe during verification:
//! an image with no face or with more than one face is rejected.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceEmbedder, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use image::GrayImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::error::ImageError),
    #[error("No face detected in the image.")]
    NoFace,
    #[error("Multiple faces ({0}) detected. Please provide an image with a single clear face.")]
    MultipleFaces(usize),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

/// Detector + embedder pair for one configured model stack.
pub struct FacePipeline {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl FacePipeline {
    pub fn new(detector: FaceDetector, embedder: FaceEmbedder) -> Self {
        Self { detector, embedder }
    }

    pub fn embedder(&self) -> &FaceEmbedder {
        &self.embedder
    }

    /// Decode raw image bytes and extract the single face's embedding.
    pub fn extract_from_bytes(&mut self, bytes: &[u8]) -> Result<Embedding, ExtractError> {
        let image = image::load_from_memory(bytes)?.to_luma8();
        self.extract(&image)
    }

    /// Extract the embedding of the single face in a decoded image.
    pub fn extract(&mut self, image: &GrayImage) -> Result<Embedding, ExtractError> {
        let faces = self.detector.detect(image)?;
        let face = select_single_face(&faces)?;
        Ok(self.embedder.extract(image, face)?)
    }
}

/// Enforce the exactly-one-face policy over a detection result.
fn select_single_face(faces: &[BoundingBox]) -> Result<&BoundingBox, ExtractError> {
    match faces {
        [] => Err(ExtractError::NoFace),
        [face] => Ok(face),
        many => Err(ExtractError::MultipleFaces(many.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(conf: f32) -> BoundingBox {
        BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 50.0,
            height: 50.0,
            confidence: conf,
            landmarks: Some([(10.0, 10.0); 5]),
        }
    }

    #[test]
    fn test_no_face_is_rejected() {
        let err = select_single_face(&[]).unwrap_err();
        assert!(matches!(err, ExtractError::NoFace));
        assert_eq!(err.to_string(), "No face detected in the image.");
    }

    #[test]
    fn test_single_face_is_accepted() {
        let faces = vec![face(0.9)];
        let selected = select_single_face(&faces).unwrap();
        assert!((selected.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_multiple_faces_are_rejected_with_count() {
        let faces = vec![face(0.9), face(0.8), face(0.7)];
        let err = select_single_face(&faces).unwrap_err();
        assert!(matches!(err, ExtractError::MultipleFaces(3)));
        assert!(err.to_string().contains("Multiple faces (3)"));
    }

    #[test]
    fn test_undecodable_bytes_error() {
        let err = image::load_from_memory(b"definitely not an image").unwrap_err();
        let err = ExtractError::from(err);
        assert!(matches!(err, ExtractError::Decode(_)));
    }
}
