//! Prediction endpoint
//!
//! Every outcome is a JSON object holding either `predicted_class` and
//! `confidence`, or `error` and `kind`. With the `compat` status policy all
//! responses are 200.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ErrorStatusPolicy;
use crate::inference::Prediction;
use crate::server::state::SharedState;
use crate::utils::error::{Error, ErrorKind, Result};

/// Name of the multipart field carrying the image
pub const FILE_FIELD: &str = "file";

/// Body of a prediction response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictResponse {
    Success {
        predicted_class: String,
        confidence: f64,
    },
    Failure {
        error: String,
        kind: ErrorKind,
    },
}

impl From<&Prediction> for PredictResponse {
    fn from(prediction: &Prediction) -> Self {
        PredictResponse::Success {
            predicted_class: prediction.label.clone(),
            confidence: prediction.rounded_confidence(),
        }
    }
}

impl From<&Error> for PredictResponse {
    fn from(err: &Error) -> Self {
        PredictResponse::Failure {
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

/// Status code for an error under the given policy
pub fn error_status(policy: ErrorStatusPolicy, err: &Error) -> StatusCode {
    match policy {
        ErrorStatusPolicy::Compat => StatusCode::OK,
        ErrorStatusPolicy::Semantic => {
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Keep the body-limit status axum reports; everything else is a bad request
fn upload_error(status: StatusCode, message: String) -> Error {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(message)
    } else {
        Error::BadRequest(message)
    }
}

/// Pull the bytes of the `file` field out of a multipart body
async fn read_upload(multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<Bytes> {
    let mut multipart = multipart.map_err(|e| upload_error(e.status(), e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e.status(), e.body_text()))?
    {
        if field.name() == Some(FILE_FIELD) {
            return field
                .bytes()
                .await
                .map_err(|e| upload_error(e.status(), e.body_text()));
        }
    }

    Err(Error::BadRequest(format!(
        "missing multipart field '{}'",
        FILE_FIELD
    )))
}

/// Run decode, preprocessing and inference off the async workers
async fn classify_upload(state: &SharedState, bytes: Bytes) -> Result<Prediction> {
    let context = state.context.clone();
    tokio::task::spawn_blocking(move || context.predict_bytes(&bytes))
        .await
        .map_err(|e| Error::Inference(format!("inference task failed: {}", e)))?
}

/// POST /predict/ - Classify an uploaded leaf image
pub async fn predict(
    State(state): State<SharedState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let start = Instant::now();

    let outcome = match read_upload(multipart).await {
        Ok(bytes) => classify_upload(&state, bytes).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(prediction) => {
            info!(
                class = %prediction.label,
                confidence = prediction.confidence,
                "Prediction served in {:.1}ms",
                start.elapsed().as_secs_f64() * 1000.0
            );
            (StatusCode::OK, Json(PredictResponse::from(&prediction))).into_response()
        }
        Err(err) => {
            let kind = err.kind();
            warn!(kind = %kind, "Prediction failed: {}", err);
            let status = error_status(state.config.error_status, &err);
            (status, Json(PredictResponse::from(&err))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelTable;

    #[test]
    fn test_success_body_shape() {
        let mut probs = vec![0.0; 38];
        probs[30] = 0.876543;
        let prediction =
            Prediction::from_probabilities(probs, &LabelTable::plant_village()).unwrap();

        let json = serde_json::to_value(PredictResponse::from(&prediction)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "predicted_class": "Tomato___Late_blight",
                "confidence": 0.8765
            })
        );
    }

    #[test]
    fn test_failure_body_shape() {
        let err = Error::Decode("unrecognized image format".into());
        let json = serde_json::to_value(PredictResponse::from(&err)).unwrap();

        assert_eq!(json["kind"], "decode");
        assert!(json["error"].as_str().unwrap().contains("unrecognized"));
        assert!(json.get("predicted_class").is_none());
        assert!(json.get("confidence").is_none());
    }

    #[test]
    fn test_error_status_policies() {
        let errors = [
            Error::Decode("bad".into()),
            Error::Preprocess("empty".into()),
            Error::Inference("oom".into()),
            Error::BadRequest("no file".into()),
            Error::PayloadTooLarge("limit".into()),
        ];
        for err in &errors {
            assert_eq!(error_status(ErrorStatusPolicy::Compat, err), StatusCode::OK);
        }

        let semantic: Vec<StatusCode> = errors
            .iter()
            .map(|err| error_status(ErrorStatusPolicy::Semantic, err))
            .collect();
        assert_eq!(
            semantic,
            vec![
                StatusCode::BAD_REQUEST,
                StatusCode::UNPROCESSABLE_ENTITY,
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_REQUEST,
                StatusCode::PAYLOAD_TOO_LARGE,
            ]
        );
    }

    #[test]
    fn test_upload_error_keeps_limit_status() {
        let err = upload_error(StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded".into());
        assert!(matches!(err, Error::PayloadTooLarge(_)));
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = upload_error(StatusCode::BAD_REQUEST, "invalid boundary".into());
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
