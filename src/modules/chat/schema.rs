use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::modules::chat::model::CaptionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Medium {
    X,
    Instagram,
    TikTok,
    #[serde(rename = "LINE")]
    Line,
}

impl Medium {
    pub fn as_str(&self) -> &'static str {
        match self {
            Medium::X => "X",
            Medium::Instagram => "Instagram",
            Medium::TikTok => "TikTok",
            Medium::Line => "LINE",
        }
    }

    pub fn all() -> Vec<Medium> {
        vec![Medium::X, Medium::Instagram, Medium::TikTok, Medium::Line]
    }

    pub fn parse(value: &str) -> Option<Medium> {
        Medium::all()
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReference {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Body of `POST /api/chat` and `POST /api/dify/aggregate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_generation_fields"))]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<Medium>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileReference>,
}

impl ChatRequest {
    pub fn modification(&self) -> Option<&str> {
        self.modification_request
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn validate_generation_fields(request: &ChatRequest) -> Result<(), ValidationError> {
    if request.modification().is_some() {
        return Ok(());
    }

    if filled(&request.client)
        && filled(&request.product)
        && filled(&request.theme)
        && request.medium.is_some()
    {
        Ok(())
    } else {
        let mut err = ValidationError::new("incomplete_form");
        err.message = Some("client, product, theme and medium are required".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub data: CaptionResult,
    pub conversation_id: Option<String>,
}
