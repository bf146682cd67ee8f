//! Single-writer verification engine.
//!
//! All ONNX inference is blocking and the embedding store wants exactly one
//! writer, so both live on one dedicated OS thread. HTTP handlers talk to it
//! through an `mpsc` request channel with `oneshot` replies.

use crate::config::Config;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use veriface_core::detector::FaceDetector;
use veriface_core::recognizer::FaceEmbedder;
use veriface_core::store::StoreError;
use veriface_core::verify::{self, Decision};
use veriface_core::{DistanceMetric, EmbeddingStore, ExtractError, FacePipeline};

/// Failure to bring the engine up. The daemon fails fast on these.
#[derive(Error, Debug)]
pub enum EngineStartError {
    #[error(transparent)]
    Detector(#[from] veriface_core::detector::DetectorError),
    #[error(transparent)]
    Recognizer(#[from] veriface_core::recognizer::RecognizerError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
}

/// Failure of one engine request. Recovered per-request; never fatal.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Student ID not found in database.")]
    UnknownStudent,
    #[error("Stored embedding has {actual} dimensions but the {model} model produces {expected}; re-register the student under the current model.")]
    DimensionMismatch {
        model: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("No students registered.")]
    EmptyGallery,
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("failed to persist embedding store: {0}")]
    Store(#[from] StoreError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Outcome of a 1:1 verification against a claimed identity.
#[derive(Debug)]
pub struct Verification {
    pub student_id: String,
    pub decision: Decision,
}

/// Outcome of a 1:N identification over the whole gallery.
#[derive(Debug)]
pub struct Identification {
    /// The best-matching identifier, present only when the decision matched.
    pub student_id: Option<String>,
    pub decision: Decision,
}

/// Engine configuration snapshot reported on the status endpoint.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub registered: usize,
    pub model: &'static str,
    pub metric: &'static str,
    pub threshold: f32,
}

enum EngineRequest {
    Register {
        student_id: String,
        image: Vec<u8>,
        source_name: String,
        reply: oneshot::Sender<Result<(), RequestError>>,
    },
    Verify {
        student_id: String,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Verification, RequestError>>,
    },
    Identify {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Identification, RequestError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Register (or re-register) a student's face from an uploaded image.
    pub async fn register(
        &self,
        student_id: String,
        image: Vec<u8>,
        source_name: String,
    ) -> Result<(), RequestError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Register {
                student_id,
                image,
                source_name,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RequestError::ChannelClosed)?;
        reply_rx.await.map_err(|_| RequestError::ChannelClosed)?
    }

    /// 1:1 verification of an uploaded probe against a claimed identity.
    pub async fn verify(
        &self,
        student_id: String,
        image: Vec<u8>,
    ) -> Result<Verification, RequestError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                student_id,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RequestError::ChannelClosed)?;
        reply_rx.await.map_err(|_| RequestError::ChannelClosed)?
    }

    /// 1:N identification: best match across every stored embedding.
    pub async fn identify(&self, image: Vec<u8>) -> Result<Identification, RequestError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Identify {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RequestError::ChannelClosed)?;
        reply_rx.await.map_err(|_| RequestError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<EngineStatus, RequestError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| RequestError::ChannelClosed)?;
        reply_rx.await.map_err(|_| RequestError::ChannelClosed)
    }
}

struct Engine {
    pipeline: FacePipeline,
    store: EmbeddingStore,
    metric: DistanceMetric,
    threshold: f32,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads both ONNX models and the embedding store synchronously, then enters
/// the request loop. Fails fast at startup if a model is unavailable.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineStartError> {
    let detector = FaceDetector::load(&config.detector_model_path())?;
    let embedder = FaceEmbedder::load(config.embed_model, &config.embed_model_path())?;
    let store = EmbeddingStore::load(&config.embeddings_file);

    let mut engine = Engine {
        pipeline: FacePipeline::new(detector, embedder),
        store,
        metric: config.metric,
        threshold: config.threshold(),
    };

    tracing::info!(
        model = config.embed_model.as_str(),
        metric = config.metric.as_str(),
        threshold = engine.threshold,
        registered = engine.store.len(),
        "verification engine ready"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("veriface-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Register {
                        student_id,
                        image,
                        source_name,
                        reply,
                    } => {
                        let _ = reply.send(engine.register(&student_id, &image, &source_name));
                    }
                    EngineRequest::Verify {
                        student_id,
                        image,
                        reply,
                    } => {
                        let _ = reply.send(engine.verify(&student_id, &image));
                    }
                    EngineRequest::Identify { image, reply } => {
                        let _ = reply.send(engine.identify(&image));
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(engine.status());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineStartError::Spawn)?;

    Ok(EngineHandle { tx })
}

impl Engine {
    fn register(
        &mut self,
        student_id: &str,
        image: &[u8],
        source_name: &str,
    ) -> Result<(), RequestError> {
        let embedding = self.pipeline.extract_from_bytes(image)?;
        self.store.put(student_id, embedding.values, source_name)?;
        tracing::info!(student_id, source = source_name, "student registered");
        Ok(())
    }

    fn verify(&mut self, student_id: &str, image: &[u8]) -> Result<Verification, RequestError> {
        // Identifier lookup comes first: an unknown identifier is reported
        // as such even when the probe image is unusable.
        let stored = self
            .store
            .get(student_id)
            .ok_or(RequestError::UnknownStudent)?
            .embedding
            .clone();

        let model = self.pipeline.embedder().model();
        ensure_embedding_dim(model.as_str(), model.embedding_dim(), &stored)?;

        let probe = self.pipeline.extract_from_bytes(image)?;
        let stored = veriface_core::Embedding::new(stored);
        let decision = verify::decide(&stored, &probe, self.metric, self.threshold);

        tracing::info!(
            student_id,
            matched = decision.matched,
            distance = decision.distance,
            confidence = decision.confidence,
            "verification decided"
        );

        Ok(Verification {
            student_id: student_id.to_string(),
            decision,
        })
    }

    fn identify(&mut self, image: &[u8]) -> Result<Identification, RequestError> {
        if self.store.is_empty() {
            return Err(RequestError::EmptyGallery);
        }

        let probe = self.pipeline.extract_from_bytes(image)?;

        // Full gallery scan, no early exit: keep the minimum distance.
        let model = self.pipeline.embedder().model();
        let mut best: Option<(String, f32)> = None;
        for (id, face) in self.store.iter() {
            ensure_embedding_dim(model.as_str(), model.embedding_dim(), &face.embedding)?;
            let stored = veriface_core::Embedding::new(face.embedding.clone());
            let distance = self.metric.distance(&stored, &probe);
            let better = match &best {
                None => true,
                Some((_, best_distance)) => distance < *best_distance,
            };
            if better {
                best = Some((id.clone(), distance));
            }
        }

        // The store is non-empty, so a best candidate always exists.
        let (best_id, best_distance) = best.ok_or(RequestError::EmptyGallery)?;
        let decision = verify::decide_from_distance(best_distance, self.threshold);

        tracing::info!(
            best_id,
            matched = decision.matched,
            distance = decision.distance,
            "identification decided"
        );

        Ok(Identification {
            student_id: decision.matched.then_some(best_id),
            decision,
        })
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            registered: self.store.len(),
            model: self.pipeline.embedder().model().as_str(),
            metric: self.metric.as_str(),
            threshold: self.threshold,
        }
    }
}

/// Reject a stored vector whose length doesn't match the configured model.
/// Distances between vectors of different dimensionality are meaningless,
/// so this is surfaced as a service error, never as a match decision.
/// It happens when the store was written under a different
/// `VERIFACE_EMBED_MODEL` or the file was edited by hand.
fn ensure_embedding_dim(
    model: &'static str,
    expected: usize,
    values: &[f32],
) -> Result<(), RequestError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(RequestError::DimensionMismatch {
            model,
            expected,
            actual: values.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_dimensionality_is_accepted() {
        let values = vec![1.0f32; 128];
        assert!(ensure_embedding_dim("Facenet", 128, &values).is_ok());
    }

    #[test]
    fn test_stale_store_dimensionality_is_an_error_not_a_match() {
        // A 2622-dim VGG-Face record compared under a 128-dim Facenet
        // configuration must be rejected outright, not compared.
        let stored = vec![1.0f32; 2622];
        let err = ensure_embedding_dim("Facenet", 128, &stored).unwrap_err();
        match err {
            RequestError::DimensionMismatch {
                model,
                expected,
                actual,
            } => {
                assert_eq!(model, "Facenet");
                assert_eq!(expected, 128);
                assert_eq!(actual, 2622);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_record_is_rejected() {
        let stored = vec![0.5f32; 100];
        assert!(ensure_embedding_dim("Facenet", 128, &stored).is_err());
    }

    #[test]
    fn test_dimension_mismatch_message_names_both_sizes() {
        let err = ensure_embedding_dim("VGG-Face", 2622, &[0.0; 4]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("4"));
        assert!(message.contains("2622"));
        assert!(message.contains("re-register"));
    }
}
