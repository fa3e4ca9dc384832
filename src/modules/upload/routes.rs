use axum::{extract::DefaultBodyLimit, routing::post, Router};

use crate::modules::upload::controller;
use crate::AppState;

// Matches the workflow service's own per-file ceiling.
const MAX_UPLOAD_BYTES: usize = 15 * 1024 * 1024;

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/api/upload",
        post(controller::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
    )
}
