use caption_relay::{app, config, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    config::logging::init();

    let state = AppState::new(config::dify::load());
    let addr = config::server::bind_address();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    tracing::info!("caption relay listening on {}", addr);

    axum::serve(listener, app(state))
        .await
        .expect("Server error");
}
