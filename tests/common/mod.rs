#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use caption_relay::config::dify::DifyConfig;
use serde_json::Value;

#[derive(Clone)]
pub enum Reply {
    Json(StatusCode, Value),
    Stream(Vec<Vec<u8>>),
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Reply::Json(StatusCode::OK, body)
    }

    pub fn events(lines: &[&str]) -> Self {
        Reply::Stream(
            lines
                .iter()
                .map(|l| format!("data: {}\n\n", l).into_bytes())
                .collect(),
        )
    }

    /// Raw body chunks, sent as-is.
    pub fn chunks(parts: &[&[u8]]) -> Self {
        Reply::Stream(parts.iter().map(|p| p.to_vec()).collect())
    }
}

#[derive(Clone)]
struct MockState {
    calls: Arc<AtomicUsize>,
    chat_bodies: Arc<Mutex<Vec<Value>>>,
    upload_fields: Arc<Mutex<Vec<(String, String)>>>,
    authorizations: Arc<Mutex<Vec<String>>>,
    reply: Reply,
}

/// Stand-in for the workflow service, listening on an ephemeral port.
pub struct MockUpstream {
    pub url: String,
    state: MockState,
}

impl MockUpstream {
    pub async fn start(reply: Reply) -> Self {
        let state = MockState {
            calls: Arc::new(AtomicUsize::new(0)),
            chat_bodies: Arc::new(Mutex::new(Vec::new())),
            upload_fields: Arc::new(Mutex::new(Vec::new())),
            authorizations: Arc::new(Mutex::new(Vec::new())),
            reply,
        };

        let router = Router::new()
            .route("/chat-messages", post(chat_messages))
            .route("/files/upload", post(files_upload))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn config(&self) -> DifyConfig {
        DifyConfig::new(Some(self.url.clone()), Some("test-key".to_string()))
    }

    pub fn config_without_key(&self) -> DifyConfig {
        DifyConfig::new(Some(self.url.clone()), None)
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn chat_bodies(&self) -> Vec<Value> {
        self.state.chat_bodies.lock().unwrap().clone()
    }

    pub fn upload_fields(&self) -> Vec<(String, String)> {
        self.state.upload_fields.lock().unwrap().clone()
    }

    pub fn authorizations(&self) -> Vec<String> {
        self.state.authorizations.lock().unwrap().clone()
    }
}

fn record_call(state: &MockState, headers: &HeaderMap) {
    state.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        state.authorizations.lock().unwrap().push(auth.to_string());
    }
}

fn respond(reply: &Reply) -> Response {
    match reply {
        Reply::Json(status, body) => (*status, Json(body.clone())).into_response(),
        Reply::Stream(chunks) => {
            let parts: Vec<Result<Bytes, Infallible>> =
                chunks.iter().map(|c| Ok(Bytes::from(c.clone()))).collect();

            Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from_stream(futures::stream::iter(parts)))
                .unwrap()
        }
    }
}

async fn chat_messages(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    record_call(&state, &headers);

    if let Ok(value) = serde_json::from_slice::<Value>(&body) {
        state.chat_bodies.lock().unwrap().push(value);
    }

    respond(&state.reply)
}

async fn files_upload(
    State(state): State<MockState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    record_call(&state, &headers);

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or("").to_string();
        let value = match field.file_name().map(str::to_string) {
            Some(file_name) => {
                field.bytes().await.unwrap();
                file_name
            }
            None => field.text().await.unwrap(),
        };
        state.upload_fields.lock().unwrap().push((name, value));
    }

    respond(&state.reply)
}
