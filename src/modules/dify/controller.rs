use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderName, StatusCode},
    response::{sse::Event, Response, Sse},
    Json,
};
use futures::Stream;
use validator::Validate;

use crate::modules::chat::{model::upstream_request, schema::ChatRequest};
use crate::modules::dify::schema::{AggregateResponse, HealthResponse};
use crate::modules::error::{error_response, relay_error, ApiError};
use crate::services::answer::{self, AnswerFormat};
use crate::services::dify::{DifyClient, DifyError, ResponseMode};
use crate::services::stream;
use crate::AppState;

const UPSTREAM_LABEL: &str = "Dify API Error";

fn is_hop_by_hop(name: &HeaderName) -> bool {
    [
        header::CONNECTION,
        header::CONTENT_LENGTH,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ]
    .contains(name)
}

/// Transparent reverse proxy: status, headers and body come back untouched.
pub async fn proxy(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let dify = state
        .dify_client()
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;

    let upstream = dify
        .forward(body)
        .await
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;

    let mut response = Response::builder().status(upstream.status());
    if let Some(headers) = response.headers_mut() {
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| {
            tracing::error!(error = %e, "failed to build proxied response");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to proxy request to Dify API")
        })
}

/// Forwards the body and re-emits each upstream chunk as its own SSE event.
pub async fn proxy_sse(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, reqwest::Error>> + Send + 'static>, ApiError> {
    let dify = state
        .dify_client()
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;

    let upstream = dify
        .forward(body)
        .await
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;
    let upstream = DifyClient::ensure_success(upstream)
        .await
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;

    Ok(Sse::new(stream::rewrap_as_sse(upstream.bytes_stream())))
}

/// Streams the chat call to completion and returns the parsed final answer.
pub async fn aggregate(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<AggregateResponse>, ApiError> {
    if let Err(e) = payload.validate() {
        return Err(error_response(StatusCode::BAD_REQUEST, e.to_string()));
    }

    let dify = state
        .dify_client()
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;

    let request = upstream_request(&payload, &state.dify.chat_user, ResponseMode::Streaming);

    tracing::debug!(phase = "sending", "aggregate relay");
    let upstream = dify
        .chat_stream(&request)
        .await
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;

    tracing::debug!(phase = "streaming", "aggregate relay");
    let captured = stream::collect_answer(upstream.bytes_stream())
        .await
        .map_err(|e| relay_error(e, UPSTREAM_LABEL))?;

    let parsed = answer::parse_answer(&captured.answer).ok_or_else(|| {
        relay_error(
            DifyError::UnrecognisedAnswer {
                answer: captured.answer.clone(),
                conversation_id: captured.conversation_id.clone(),
            },
            UPSTREAM_LABEL,
        )
    })?;

    let outcome = match parsed.format {
        AnswerFormat::Sections => "parse-fallback-text",
        AnswerFormat::NestedJson | AnswerFormat::Json => "parsed-result",
    };
    tracing::info!(
        phase = outcome,
        format = ?parsed.format,
        conversation_id = ?captured.conversation_id,
        "aggregate relay completed"
    );

    Ok(Json(AggregateResponse {
        conversation_id: captured.conversation_id,
        answer: captured.answer,
        format: parsed.format,
        result: parsed.result,
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        configured: state.dify.is_configured(),
    })
}
