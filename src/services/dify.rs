use std::collections::BTreeMap;

use axum::body::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::dify::DifyConfig;

#[derive(Error, Debug)]
pub enum DifyError {
    #[error("API URL or Key is not configured")]
    MissingConfig,
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    ApiError { status: StatusCode, body: Value },
    #[error("Stream read failed: {0}")]
    StreamError(String),
    #[error("Upstream reported an error: {message}")]
    UpstreamEvent {
        message: String,
        conversation_id: Option<String>,
    },
    #[error("Empty response from Dify")]
    EmptyAnswer { conversation_id: Option<String> },
    #[error("Unrecognised answer format")]
    UnrecognisedAnswer {
        answer: String,
        conversation_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Blocking,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInput {
    #[serde(rename = "type")]
    pub kind: String,
    pub transfer_method: String,
    pub upload_file_id: String,
}

impl FileInput {
    pub fn local(upload_file_id: String, mime_type: Option<&str>) -> Self {
        let kind = match mime_type {
            Some(mime) if mime.starts_with("image/") => "image",
            _ => "document",
        };

        Self {
            kind: kind.to_string(),
            transfer_method: "local_file".to_string(),
            upload_file_id,
        }
    }
}

/// Body of `POST {base}/chat-messages`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessageRequest {
    pub inputs: BTreeMap<String, String>,
    pub query: String,
    pub user: String,
    pub response_mode: ResponseMode,
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileInput>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessageResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

pub struct FilePart {
    pub data: Vec<u8>,
    pub file_name: String,
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct DifyClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl DifyClient {
    pub fn new(client: Client, config: &DifyConfig) -> Result<Self, DifyError> {
        let (base_url, api_key) = config.credentials().ok_or(DifyError::MissingConfig)?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub async fn upload_file(&self, file: FilePart, user: &str) -> Result<Value, DifyError> {
        let mut part = Part::bytes(file.data).file_name(file.file_name);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }

        let form = Form::new().part("file", part).text("user", user.to_string());

        let response = self
            .client
            .post(format!("{}/files/upload", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    pub async fn chat_blocking(
        &self,
        request: &ChatMessageRequest,
    ) -> Result<ChatMessageResponse, DifyError> {
        let response = self.post_chat(request).await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Streaming call whose body is left unread for the caller.
    pub async fn chat_stream(&self, request: &ChatMessageRequest) -> Result<Response, DifyError> {
        let response = self.post_chat(request).await?;
        Self::ensure_success(response).await
    }

    /// Sends an already encoded JSON body and hands back the response as-is,
    /// error statuses included.
    pub async fn forward(&self, body: Bytes) -> Result<Response, DifyError> {
        let response = self
            .client
            .post(format!("{}/chat-messages", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        Ok(response)
    }

    async fn post_chat(&self, request: &ChatMessageRequest) -> Result<Response, DifyError> {
        let response = self
            .client
            .post(format!("{}/chat-messages", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        Ok(response)
    }

    pub async fn ensure_success(response: Response) -> Result<Response, DifyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&error_text).unwrap_or(Value::String(error_text));

        Err(DifyError::ApiError { status, body })
    }
}
