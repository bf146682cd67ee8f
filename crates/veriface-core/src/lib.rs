//! veriface-core — Face verification engine for attendance systems.
//!
//! Detects faces with SCRFD, extracts identity embeddings with a selectable
//! embedding model (VGG-Face, Facenet, Facenet512 or ArcFace), and decides
//! same-person / different-person against a per-(model, metric) threshold.
//! All inference runs via ONNX Runtime on CPU.

pub mod alignment;
pub mod detector;
pub mod pipeline;
pub mod recognizer;
pub mod store;
pub mod types;
pub mod verify;

pub use pipeline::{ExtractError, FacePipeline};
pub use recognizer::EmbedModel;
pub use store::{EmbeddingStore, StoredFace};
pub use types::{BoundingBox, Embedding};
pub use verify::{Decision, DistanceMetric};

use std::path::PathBuf;

/// Default directory for ONNX model files:
/// `$XDG_DATA_HOME/veriface/models` (falling back to `~/.local/share`).
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("veriface/models")
}
