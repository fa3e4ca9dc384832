use serde_json::Value;

use crate::client::session::{ChatMessage, MessageRole};
use crate::modules::chat::model::{check_issues, CaptionResult, CheckStatus};

pub fn message(message: &ChatMessage) -> String {
    let time = message.timestamp.format("%H:%M:%S");

    match (&message.role, &message.data) {
        (MessageRole::Result, Some(data)) => format!("{}\n({})", result_card(data), time),
        (MessageRole::User, _) => format!("> {}\n({})", message.content, time),
        (MessageRole::Error, _) => format!("! {}\n({})", message.content, time),
        _ => format!("{}\n({})", message.content, time),
    }
}

pub fn result_card(result: &CaptionResult) -> String {
    let badge = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    let mut out = format!(
        "==== キャプション生成結果 [{}] [{}] [{}]\n",
        badge(&result.client),
        badge(&result.medium),
        badge(&result.product)
    );

    let initial = result
        .initial_caption
        .clone()
        .map(Value::String)
        .unwrap_or(Value::Null);

    out.push_str(&card("初稿", &initial));
    out.push_str(&card("薬機法チェック結果", &result.pharma_check));
    out.push_str(&card("景表法チェック結果", &result.ad_check));
    out.push_str(&card("修正稿", &Value::String(result.final_caption.clone())));
    out
}

fn card(title: &str, content: &Value) -> String {
    let mut out = format!("---- {}\n", title);

    match content {
        Value::String(text) => {
            for line in text.lines() {
                out.push_str(&format!("  {}\n", line));
            }
        }
        Value::Object(map) if map.get("result").is_some_and(Value::is_string) => {
            let status = CheckStatus::of(content);
            let result = map.get("result").and_then(Value::as_str).unwrap_or("");
            out.push_str(&format!("  [{}] {}\n", status.label(), result));

            for issue in check_issues(content) {
                out.push_str(&format!("  * 指摘箇所:「{}」\n", issue.text));
                out.push_str(&format!("    理由: {}\n", issue.reason));
                out.push_str(&format!("    根拠: {}\n", issue.basis));
            }
        }
        Value::Null => out.push_str("  -\n"),
        other => {
            let pretty = serde_json::to_string_pretty(other).unwrap_or_default();
            for line in pretty.lines() {
                out.push_str(&format!("  {}\n", line));
            }
        }
    }

    out
}
