//! HTTP surface: multipart `/register` and `/verify`, plus a status root.
//!
//! Response bodies follow the contract the attendance backend consumes:
//! success bodies carry `status: "success"`, failures are
//! `{"status": "error", "message": ..., "match": false}` with the HTTP code
//! signalling the failure class (404 unknown identifier, 400 unusable
//! image or request, 500 internal).

use crate::engine::{EngineHandle, Identification, RequestError, Verification};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use veriface_core::ExtractError;

pub fn router(engine: EngineHandle, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/register", post(register))
        .route("/verify", post(verify))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Request-level failure, rendered as the error JSON shape.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        match &err {
            RequestError::UnknownStudent => ApiError::NotFound(err.to_string()),
            RequestError::EmptyGallery => ApiError::BadRequest(err.to_string()),
            RequestError::DimensionMismatch { .. } => ApiError::BadRequest(err.to_string()),
            RequestError::Extract(extract) => match extract {
                ExtractError::Detector(_) | ExtractError::Recognizer(_) => {
                    ApiError::Internal(err.to_string())
                }
                _ => ApiError::BadRequest(err.to_string()),
            },
            RequestError::Store(_) | RequestError::ChannelClosed => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        let body = serde_json::json!({
            "status": "error",
            "message": message,
            "match": false,
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    service: &'static str,
    model: &'static str,
    metric: &'static str,
    threshold: f32,
    registered: usize,
}

#[derive(Serialize)]
struct RegisterResponse {
    status: &'static str,
    message: String,
    student_id: String,
}

#[derive(Serialize)]
struct VerifyResponse {
    status: &'static str,
    #[serde(rename = "match")]
    is_match: bool,
    confidence_score: f64,
    distance: f32,
    threshold: f32,
    reason: &'static str,
    student_id: Option<String>,
    // Compatibility aliases consumed by older attendance-backend builds.
    matched: bool,
    confidence: f64,
}

impl VerifyResponse {
    fn from_verification(v: Verification) -> Self {
        Self::new(Some(v.student_id), v.decision)
    }

    fn from_identification(i: Identification) -> Self {
        Self::new(i.student_id, i.decision)
    }

    fn new(student_id: Option<String>, decision: veriface_core::Decision) -> Self {
        Self {
            status: "success",
            is_match: decision.matched,
            confidence_score: decision.confidence,
            distance: decision.distance,
            threshold: decision.threshold,
            reason: decision.reason,
            student_id,
            matched: decision.matched,
            confidence: decision.confidence,
        }
    }
}

async fn status(State(engine): State<EngineHandle>) -> Result<Json<StatusResponse>, ApiError> {
    let status = engine.status().await?;
    Ok(Json(StatusResponse {
        status: "online",
        service: "veriface",
        model: status.model,
        metric: status.metric,
        threshold: status.threshold,
        registered: status.registered,
    }))
}

/// Multipart fields common to both endpoints.
struct Upload {
    student_id: Option<String>,
    file: Option<(String, Vec<u8>)>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload {
        student_id: None,
        file: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("student_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("invalid student_id field: {e}")))?;
                upload.student_id = Some(value);
            }
            Some("file") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("invalid file field: {e}")))?;
                upload.file = Some((name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    Ok(upload)
}

async fn register(
    State(engine): State<EngineHandle>,
    multipart: Multipart,
) -> Result<Json<RegisterResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let student_id = upload
        .student_id
        .ok_or_else(|| ApiError::BadRequest("missing student_id field".into()))?;
    let (source_name, image) = upload
        .file
        .ok_or_else(|| ApiError::BadRequest("missing file field".into()))?;

    engine
        .register(student_id.clone(), image, source_name)
        .await?;

    Ok(Json(RegisterResponse {
        status: "success",
        message: format!("Student {student_id} registered successfully."),
        student_id,
    }))
}

async fn verify(
    State(engine): State<EngineHandle>,
    multipart: Multipart,
) -> Result<Json<VerifyResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let (_, image) = upload
        .file
        .ok_or_else(|| ApiError::BadRequest("missing file field".into()))?;

    // student_id present → 1:1 verification; absent → 1:N identification.
    // An empty or whitespace-only value carries no claimed identity and is
    // treated as absent.
    let response = match normalize_student_id(upload.student_id) {
        Some(student_id) => {
            let verification = engine.verify(student_id, image).await?;
            VerifyResponse::from_verification(verification)
        }
        None => {
            let identification = engine.identify(image).await?;
            VerifyResponse::from_identification(identification)
        }
    };

    Ok(Json(response))
}

/// Blank form values carry no claimed identity.
fn normalize_student_id(student_id: Option<String>) -> Option<String> {
    student_id.filter(|id| !id.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use veriface_core::verify::decide_from_distance;

    #[test]
    fn test_unknown_student_maps_to_404() {
        let api: ApiError = RequestError::UnknownStudent.into();
        assert!(matches!(api, ApiError::NotFound(_)));
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_extraction_failures_map_to_400() {
        for err in [
            RequestError::Extract(ExtractError::NoFace),
            RequestError::Extract(ExtractError::MultipleFaces(2)),
        ] {
            let api: ApiError = err.into();
            assert!(matches!(api, ApiError::BadRequest(_)));
        }
    }

    #[test]
    fn test_dimension_mismatch_maps_to_400() {
        let err = RequestError::DimensionMismatch {
            model: "Facenet",
            expected: 128,
            actual: 2622,
        };
        let api: ApiError = err.into();
        assert!(matches!(api, ApiError::BadRequest(_)));
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_empty_student_id_falls_through_to_identification() {
        assert_eq!(normalize_student_id(None), None);
        assert_eq!(normalize_student_id(Some(String::new())), None);
        assert_eq!(normalize_student_id(Some("   ".into())), None);
        assert_eq!(
            normalize_student_id(Some("S1023".into())),
            Some("S1023".to_string())
        );
    }

    #[test]
    fn test_empty_gallery_maps_to_400() {
        let api: ApiError = RequestError::EmptyGallery.into();
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_engine_failures_map_to_500() {
        let api: ApiError = RequestError::ChannelClosed.into();
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unknown_student_error_message() {
        let api: ApiError = RequestError::UnknownStudent.into();
        match api {
            ApiError::NotFound(message) => {
                assert_eq!(message, "Student ID not found in database.")
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn test_verify_response_wire_shape() {
        let decision = decide_from_distance(0.20, 0.40);
        let response = VerifyResponse::new(Some("S1023".into()), decision);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "success");
        assert_eq!(json["match"], true);
        assert_eq!(json["matched"], true);
        assert_eq!(json["confidence_score"], 50.0);
        assert_eq!(json["confidence"], 50.0);
        assert_eq!(json["threshold"], 0.4);
        assert_eq!(json["reason"], "Face matched");
        assert_eq!(json["student_id"], "S1023");
    }

    #[test]
    fn test_verify_response_mismatch_reports_zero_confidence() {
        let decision = decide_from_distance(0.50, 0.40);
        let response = VerifyResponse::new(Some("S1023".into()), decision);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["match"], false);
        assert_eq!(json["confidence_score"], 0.0);
        assert_eq!(json["reason"], "Face mismatch - proxy attempt");
    }
}
