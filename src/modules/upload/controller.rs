use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::modules::error::{error_response, relay_error, ApiError};
use crate::services::dify::FilePart;
use crate::AppState;

const UPSTREAM_LABEL: &str = "Dify file upload failed";

pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let dify = state
        .dify_client()
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;

    let mut file: Option<FilePart> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, format!("Failed to read multipart: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(|s| s.to_string());
            let data = field.bytes().await.map_err(|e| {
                error_response(StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?;

            file = Some(FilePart {
                data: data.to_vec(),
                file_name,
                content_type,
            });
        }
    }

    let file = file
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "File not found in request"))?;

    tracing::info!(file_name = %file.file_name, bytes = file.data.len(), "relaying upload");

    let result = dify
        .upload_file(file, &state.dify.upload_user)
        .await
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;

    Ok(Json(result))
}
