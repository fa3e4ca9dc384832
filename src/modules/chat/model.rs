use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::modules::chat::schema::ChatRequest;
use crate::services::answer;
use crate::services::dify::{ChatMessageRequest, FileInput, ResponseMode};

pub const QUERY_PLACEHOLDER: &str = "キャプション生成";
pub const NOT_AVAILABLE: &str = "N/A";
pub const NO_RESULT: &str = "結果なし";
pub const NOT_RECHECKED: &str = "修正後は未チェック";

const NEEDS_REVIEW_TOKEN: &str = "要確認";
const CLEAR_TOKEN: &str = "問題なし";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionResult {
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub initial_caption: Option<String>,
    #[serde(default)]
    pub pharma_check: Value,
    #[serde(default)]
    pub ad_check: Value,
    pub final_caption: String,
}

impl CaptionResult {
    /// Builds the result for a blocking answer. Any JSON answer fills the four
    /// fields; anything else is a revised caption from a modification turn.
    pub fn from_answer(request: &ChatRequest, answer_text: &str) -> Self {
        match answer::parse_json_answer(answer_text) {
            Some(parsed) => {
                let empty = Map::new();
                Self::from_fields(request, parsed.result.as_object().unwrap_or(&empty))
            }
            None => Self::revised(request, answer_text),
        }
    }

    pub fn from_fields(request: &ChatRequest, fields: &Map<String, Value>) -> Self {
        let present = |key: &str| fields.get(key).filter(|v| is_truthy(v));
        let text = |key: &str, default: &str| match present(key) {
            Some(Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
            None => default.to_string(),
        };
        let check = |key: &str| {
            present(key)
                .cloned()
                .unwrap_or_else(|| Value::String(NOT_AVAILABLE.to_string()))
        };

        Self {
            client: request.client.clone(),
            medium: request.medium.map(|m| m.as_str().to_string()),
            product: request.product.clone(),
            initial_caption: Some(text("initial_draft", NOT_AVAILABLE)),
            pharma_check: check("pharma_check"),
            ad_check: check("ad_check"),
            final_caption: text("final_draft", NO_RESULT),
        }
    }

    pub fn revised(request: &ChatRequest, answer_text: &str) -> Self {
        Self {
            client: request.client.clone(),
            medium: request.medium.map(|m| m.as_str().to_string()),
            product: request.product.clone(),
            initial_caption: request.last_caption.clone(),
            pharma_check: Value::String(NOT_RECHECKED.to_string()),
            ad_check: Value::String(NOT_RECHECKED.to_string()),
            final_caption: answer_text.to_string(),
        }
    }
}

// Falsy values (null, false, zero, empty string) take the placeholder.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Translates a relay request into the workflow's `chat-messages` body.
///
/// A modification turn sends only the instruction; the workflow keeps the
/// earlier fields in its conversation memory.
pub fn upstream_request(request: &ChatRequest, user: &str, mode: ResponseMode) -> ChatMessageRequest {
    let mut inputs = BTreeMap::new();

    let query = match request.modification() {
        Some(modification) => {
            inputs.insert("modification_request".to_string(), modification.to_string());
            modification.to_string()
        }
        None => {
            let slots = [
                ("user_client", request.client.clone()),
                ("user_products", request.product.clone()),
                ("user_theme", request.theme.clone()),
                ("user_medium", request.medium.map(|m| m.as_str().to_string())),
            ];
            for (slot, value) in slots {
                inputs.insert(slot.to_string(), value.unwrap_or_default());
            }
            if let Some(tone) = request.tone.as_deref().filter(|t| !t.trim().is_empty()) {
                inputs.insert("user_tone".to_string(), tone.to_string());
            }
            QUERY_PLACEHOLDER.to_string()
        }
    };

    ChatMessageRequest {
        inputs,
        query,
        user: user.to_string(),
        response_mode: mode,
        conversation_id: request.conversation_id.clone().filter(|id| !id.is_empty()),
        files: request
            .files
            .iter()
            .map(|f| FileInput::local(f.id.clone(), f.mime_type.as_deref()))
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Clear,
    NeedsReview,
    Unknown,
}

impl CheckStatus {
    pub fn of(check: &Value) -> Self {
        let text = match check {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("result").and_then(Value::as_str).unwrap_or(""),
            _ => "",
        };

        if text.contains(NEEDS_REVIEW_TOKEN) {
            CheckStatus::NeedsReview
        } else if text.contains(CLEAR_TOKEN) {
            CheckStatus::Clear
        } else {
            CheckStatus::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CheckStatus::Clear => CLEAR_TOKEN,
            CheckStatus::NeedsReview => NEEDS_REVIEW_TOKEN,
            CheckStatus::Unknown => "-",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CheckIssue {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub basis: String,
}

pub fn check_issues(check: &Value) -> Vec<CheckIssue> {
    check
        .get("issues")
        .and_then(Value::as_array)
        .map(|issues| {
            issues
                .iter()
                .filter_map(|i| serde_json::from_value(i.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::chat::schema::{FileReference, Medium};
    use serde_json::json;

    fn generation_request() -> ChatRequest {
        ChatRequest {
            client: Some("ロート製薬".to_string()),
            product: Some("目薬".to_string()),
            theme: Some("花粉の季節".to_string()),
            medium: Some(Medium::Instagram),
            ..Default::default()
        }
    }

    #[test]
    fn generation_inputs_mirror_form_fields() {
        let request = upstream_request(&generation_request(), "u", ResponseMode::Blocking);

        assert_eq!(request.query, QUERY_PLACEHOLDER);
        assert_eq!(request.inputs["user_client"], "ロート製薬");
        assert_eq!(request.inputs["user_products"], "目薬");
        assert_eq!(request.inputs["user_theme"], "花粉の季節");
        assert_eq!(request.inputs["user_medium"], "Instagram");
        assert!(!request.inputs.contains_key("user_tone"));
        assert_eq!(request.conversation_id, None);
    }

    #[test]
    fn modification_turn_sends_only_the_instruction() {
        let request = ChatRequest {
            modification_request: Some("もっと短く".to_string()),
            conversation_id: Some("conv-1".to_string()),
            ..generation_request()
        };

        let upstream = upstream_request(&request, "u", ResponseMode::Streaming);

        assert_eq!(upstream.query, "もっと短く");
        assert_eq!(upstream.inputs.len(), 1);
        assert_eq!(upstream.inputs["modification_request"], "もっと短く");
        assert_eq!(upstream.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(upstream.response_mode, ResponseMode::Streaming);
    }

    #[test]
    fn files_become_local_file_inputs() {
        let request = ChatRequest {
            files: vec![
                FileReference { id: "f1".to_string(), mime_type: Some("image/png".to_string()) },
                FileReference { id: "f2".to_string(), mime_type: None },
            ],
            ..generation_request()
        };

        let upstream = upstream_request(&request, "u", ResponseMode::Blocking);

        assert_eq!(upstream.files[0].kind, "image");
        assert_eq!(upstream.files[1].kind, "document");
        assert_eq!(upstream.files[1].upload_file_id, "f2");
    }

    #[test]
    fn json_answer_maps_to_result() {
        let answer = r#"{"initial_draft":"A","pharma_check":"B","ad_check":"C","final_draft":"D"}"#;
        let result = CaptionResult::from_answer(&generation_request(), answer);

        assert_eq!(result.initial_caption.as_deref(), Some("A"));
        assert_eq!(result.pharma_check, json!("B"));
        assert_eq!(result.ad_check, json!("C"));
        assert_eq!(result.final_caption, "D");
        assert_eq!(result.medium.as_deref(), Some("Instagram"));
    }

    #[test]
    fn missing_keys_use_placeholders() {
        let result = CaptionResult::from_answer(&generation_request(), r#"{"initial_draft":""}"#);

        assert_eq!(result.initial_caption.as_deref(), Some(NOT_AVAILABLE));
        assert_eq!(result.pharma_check, json!(NOT_AVAILABLE));
        assert_eq!(result.final_caption, NO_RESULT);
    }

    #[test]
    fn truthy_non_string_drafts_are_kept() {
        let answer = r#"{"initial_draft":{"text":"A"},"pharma_check":false,"ad_check":0,"final_draft":2024}"#;
        let result = CaptionResult::from_answer(&generation_request(), answer);

        assert_eq!(result.initial_caption.as_deref(), Some(r#"{"text":"A"}"#));
        assert_eq!(result.final_caption, "2024");
        assert_eq!(result.pharma_check, json!(NOT_AVAILABLE));
        assert_eq!(result.ad_check, json!(NOT_AVAILABLE));
    }

    #[test]
    fn non_object_json_answer_uses_placeholders() {
        let result = CaptionResult::from_answer(&generation_request(), "[1,2]");

        assert_eq!(result.initial_caption.as_deref(), Some(NOT_AVAILABLE));
        assert_eq!(result.final_caption, NO_RESULT);
    }

    #[test]
    fn plain_answer_is_a_revision() {
        let request = ChatRequest {
            last_caption: Some("old caption".to_string()),
            ..generation_request()
        };

        let result = CaptionResult::from_answer(&request, "Revised caption text");

        assert_eq!(result.final_caption, "Revised caption text");
        assert_eq!(result.initial_caption.as_deref(), Some("old caption"));
        assert_eq!(result.pharma_check, json!(NOT_RECHECKED));
        assert_eq!(result.ad_check, json!(NOT_RECHECKED));
    }

    #[test]
    fn check_status_reads_tokens() {
        let structured = json!({
            "result": "要確認",
            "issues": [{"text": "治る", "reason": "効能の断定", "basis": "薬機法66条"}]
        });

        assert_eq!(CheckStatus::of(&structured), CheckStatus::NeedsReview);
        assert_eq!(CheckStatus::of(&json!("問題なし")), CheckStatus::Clear);
        assert_eq!(CheckStatus::of(&json!(NOT_RECHECKED)), CheckStatus::Unknown);

        let issues = check_issues(&structured);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].text, "治る");
    }
}
