use axum::Router;
use reqwest::Client;
use tower_http::cors::CorsLayer;

use crate::config::dify::DifyConfig;
use crate::services::dify::{DifyClient, DifyError};

pub mod client;
pub mod config;
pub mod modules;
pub mod services;

#[derive(Clone)]
pub struct AppState {
    pub dify: DifyConfig,
    pub http: Client,
}

impl AppState {
    pub fn new(dify: DifyConfig) -> Self {
        Self {
            dify,
            http: Client::new(),
        }
    }

    /// Fails with `MissingConfig` before any request is built.
    pub fn dify_client(&self) -> Result<DifyClient, DifyError> {
        DifyClient::new(self.http.clone(), &self.dify)
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(modules::chat::routes::routes())
        .merge(modules::dify::routes::routes())
        .merge(modules::upload::routes::routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
