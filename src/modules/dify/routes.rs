use axum::{
    routing::{get, post},
    Router,
};

use crate::modules::dify::controller;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/dify", post(controller::proxy))
        .route("/api/dify/sse", post(controller::proxy_sse))
        .route("/api/dify/aggregate", post(controller::aggregate))
        .route("/api/health", get(controller::health))
}
