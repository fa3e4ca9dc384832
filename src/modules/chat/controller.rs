use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::modules::chat::{
    model::{upstream_request, CaptionResult},
    schema::{ChatRequest, ChatResponse},
};
use crate::modules::error::{error_response, relay_error, ApiError};
use crate::services::dify::ResponseMode;
use crate::AppState;

const UPSTREAM_LABEL: &str = "Dify API Error";

pub async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if let Err(e) = payload.validate() {
        return Err(error_response(StatusCode::BAD_REQUEST, e.to_string()));
    }

    let dify = state
        .dify_client()
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;

    let request = upstream_request(&payload, &state.dify.chat_user, ResponseMode::Blocking);

    let response = dify
        .chat_blocking(&request)
        .await
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;

    let data = CaptionResult::from_answer(&payload, &response.answer);

    tracing::info!(
        conversation_id = ?response.conversation_id,
        message_id = ?response.message_id,
        modification = payload.modification().is_some(),
        "caption turn completed"
    );

    Ok(Json(ChatResponse {
        data,
        conversation_id: response.conversation_id,
    }))
}
