use std::path::Path;

use anyhow::{anyhow, Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::modules::chat::schema::{ChatRequest, ChatResponse, FileReference};
use crate::modules::dify::schema::HealthResponse;
use crate::modules::upload::schema::UploadedFile;

/// HTTP client for the relay's own `/api/*` surface.
#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .client
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await
            .context("Failed to reach relay")?;

        Self::read_json(response).await
    }

    pub async fn upload(&self, path: &Path) -> Result<UploadedFile> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = Part::bytes(data)
            .file_name(file_name.clone())
            .mime_str(mime_type(&file_name))?;

        let response = self
            .client
            .post(format!("{}/api/upload", self.base_url))
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .context("Failed to send upload")?;

        Self::read_json(response).await
    }

    /// Uploads every path and returns the references for the chat request.
    pub async fn upload_all(&self, paths: &[impl AsRef<Path>]) -> Result<Vec<FileReference>> {
        let mut references = Vec::with_capacity(paths.len());

        for path in paths {
            let uploaded = self.upload(path.as_ref()).await?;
            references.push(FileReference {
                id: uploaded.id,
                mime_type: uploaded.mime_type,
            });
        }

        Ok(references)
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await
            .context("Failed to send chat request")?;

        Self::read_json(response).await
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .pointer("/details/message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("API Error: {}", status.as_u16()));
            return Err(anyhow!(message));
        }

        response.json().await.context("Invalid response from relay")
    }
}

fn mime_type(file_name: &str) -> &'static str {
    let extension = file_name.rsplit('.').next().unwrap_or("").to_lowercase();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}
