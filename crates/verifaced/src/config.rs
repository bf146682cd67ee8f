use std::path::PathBuf;
use veriface_core::detector::DetectorModel;
use veriface_core::{verify, DistanceMetric, EmbedModel};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// HTTP bind address (default: 0.0.0.0:8001).
    pub bind_addr: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the JSON embedding store.
    pub embeddings_file: PathBuf,
    /// Embedding model used for registration and verification.
    pub embed_model: EmbedModel,
    /// SCRFD detector variant.
    pub detector_model: DetectorModel,
    /// Distance metric for the verification decision.
    pub metric: DistanceMetric,
    /// Optional override of the (model, metric) threshold.
    pub threshold_override: Option<f32>,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from `VERIFACE_*` environment variables with
    /// defaults. Unrecognized model or metric names fall back to the
    /// defaults with a warning rather than failing startup.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("VERIFACE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| veriface_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("veriface");

        let embeddings_file = std::env::var("VERIFACE_EMBEDDINGS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("embeddings/students.json"));

        Self {
            bind_addr: std::env::var("VERIFACE_BIND")
                .unwrap_or_else(|_| "0.0.0.0:8001".to_string()),
            model_dir,
            embeddings_file,
            embed_model: env_parsed("VERIFACE_EMBED_MODEL", EmbedModel::VggFace, EmbedModel::parse),
            detector_model: env_parsed(
                "VERIFACE_DETECTOR_MODEL",
                DetectorModel::Det10G,
                DetectorModel::parse,
            ),
            metric: env_parsed(
                "VERIFACE_DISTANCE_METRIC",
                DistanceMetric::Cosine,
                DistanceMetric::parse,
            ),
            threshold_override: std::env::var("VERIFACE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok()),
            max_upload_bytes: env_usize("VERIFACE_MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
        }
    }

    /// Effective decision threshold for the configured (model, metric) pair.
    pub fn threshold(&self) -> f32 {
        self.threshold_override
            .unwrap_or_else(|| verify::threshold(self.embed_model, self.metric))
    }

    /// Path to the SCRFD detector model file.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(self.detector_model.onnx_filename())
    }

    /// Path to the embedding model file.
    pub fn embed_model_path(&self) -> PathBuf {
        self.model_dir.join(self.embed_model.onnx_filename())
    }
}

fn env_parsed<T: Copy>(key: &str, default: T, parse: impl Fn(&str) -> Option<T>) -> T {
    match std::env::var(key) {
        Ok(raw) => match parse(&raw) {
            Some(value) => value,
            None => {
                tracing::warn!(key, value = raw, "unrecognized value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_follows_model_and_metric() {
        let config = Config {
            bind_addr: "0.0.0.0:8001".into(),
            model_dir: PathBuf::from("/tmp/models"),
            embeddings_file: PathBuf::from("/tmp/students.json"),
            embed_model: EmbedModel::VggFace,
            detector_model: DetectorModel::Det10G,
            metric: DistanceMetric::Cosine,
            threshold_override: None,
            max_upload_bytes: 1024,
        };
        assert_eq!(config.threshold(), 0.40);
    }

    #[test]
    fn test_threshold_override_wins() {
        let config = Config {
            bind_addr: "0.0.0.0:8001".into(),
            model_dir: PathBuf::from("/tmp/models"),
            embeddings_file: PathBuf::from("/tmp/students.json"),
            embed_model: EmbedModel::ArcFace,
            detector_model: DetectorModel::Det10G,
            metric: DistanceMetric::Cosine,
            threshold_override: Some(0.55),
            max_upload_bytes: 1024,
        };
        assert_eq!(config.threshold(), 0.55);
    }

    #[test]
    fn test_model_paths_join_model_dir() {
        let config = Config {
            bind_addr: "0.0.0.0:8001".into(),
            model_dir: PathBuf::from("/opt/models"),
            embeddings_file: PathBuf::from("/tmp/students.json"),
            embed_model: EmbedModel::Facenet512,
            detector_model: DetectorModel::Det500M,
            metric: DistanceMetric::Euclidean,
            threshold_override: None,
            max_upload_bytes: 1024,
        };
        assert_eq!(
            config.detector_model_path(),
            PathBuf::from("/opt/models/det_500m.onnx")
        );
        assert_eq!(
            config.embed_model_path(),
            PathBuf::from("/opt/models/facenet512.onnx")
        );
    }
}
