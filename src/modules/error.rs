use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::services::dify::DifyError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            details: None,
        }),
    )
}

fn with_details(status: StatusCode, message: &str, details: Value) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            details: Some(details),
        }),
    )
}

/// Maps a relay failure onto the JSON error body. `upstream_label` names the
/// upstream call when its status is propagated.
pub fn relay_error(err: DifyError, upstream_label: &str) -> ApiError {
    match err {
        DifyError::MissingConfig => {
            tracing::error!("relay called without DIFY_API_URL/DIFY_API_KEY");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        DifyError::ApiError { status, body } => {
            tracing::error!(%status, details = %body, "{}", upstream_label);
            with_details(status, upstream_label, body)
        }
        DifyError::RequestError(_) | DifyError::StreamError(_) => {
            tracing::error!(error = %err, "relay transport failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
        DifyError::UpstreamEvent {
            message,
            conversation_id,
        } => {
            tracing::error!(%message, conversation_id = ?conversation_id, "upstream stream error");
            with_details(
                StatusCode::BAD_GATEWAY,
                "Dify stream error",
                json!({ "message": message, "conversationId": conversation_id }),
            )
        }
        DifyError::EmptyAnswer { conversation_id } => with_details(
            StatusCode::BAD_GATEWAY,
            "Empty response from Dify",
            json!({ "conversationId": conversation_id }),
        ),
        DifyError::UnrecognisedAnswer {
            answer,
            conversation_id,
        } => {
            tracing::warn!(conversation_id = ?conversation_id, "answer matched no parser");
            with_details(
                StatusCode::BAD_GATEWAY,
                "Unrecognised answer format",
                json!({ "conversationId": conversation_id, "answer": answer }),
            )
        }
    }
}
