use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::answer::AnswerFormat;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    pub conversation_id: Option<String>,
    pub answer: String,
    pub format: AnswerFormat,
    pub result: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub configured: bool,
}
