use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::modules::chat::model::CaptionResult;
use crate::modules::chat::schema::{ChatRequest, FileReference, Medium};

pub const WELCOME: &str = "キャプション生成ボットへようこそ！SNS投稿用のキャプションを生成いたします。";
pub const LOADING: &str = "生成中...";
pub const RESULT_LABEL: &str = "結果";
pub const THANKS: &str =
    "ありがとうございました！\n新規でキャプション作成したい場合は「新しいキャプションを生成」を選んでください。";

#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("a request is already in flight")]
    RequestInFlight,
    #[error("client, product, theme and medium are required")]
    IncompleteForm,
    #[error("modification text is empty")]
    EmptyModification,
    #[error("no caption to modify yet")]
    NothingToModify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Bot,
    Result,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub data: Option<CaptionResult>,
    pub pending: bool,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
            data: None,
            pending: false,
        }
    }

    pub fn user(content: String) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn bot(content: String) -> Self {
        Self::new(MessageRole::Bot, content)
    }

    fn placeholder() -> Self {
        let mut message = Self::bot(LOADING.to_string());
        message.pending = true;
        message
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormInputs {
    pub client: String,
    pub product: String,
    pub theme: String,
    pub medium: Option<Medium>,
    pub tone: Option<String>,
    pub files: Vec<PathBuf>,
}

impl FormInputs {
    pub fn is_complete(&self) -> bool {
        !self.client.trim().is_empty()
            && !self.product.trim().is_empty()
            && !self.theme.trim().is_empty()
            && self.medium.is_some()
    }

    pub fn summary(&self) -> String {
        format!(
            "キャプション生成を開始します。\nクライアント: {}\n商品: {}\n媒体: {}",
            self.client,
            self.product,
            self.medium.map(|m| m.as_str()).unwrap_or("")
        )
    }
}

/// Ticket for the single in-flight request, tagged with the session
/// generation it was issued under.
#[derive(Debug)]
pub struct PendingReply {
    message_id: Uuid,
    generation: u64,
}

#[derive(Debug, Clone)]
pub enum ReplyOutcome {
    Result {
        data: CaptionResult,
        conversation_id: Option<String>,
    },
    Error(String),
}

/// Client-side conversation state: transcript, conversation id and the
/// latest result.
#[derive(Debug)]
pub struct Session {
    messages: Vec<ChatMessage>,
    conversation_id: Option<String>,
    current_result: Option<CaptionResult>,
    generation: u64,
    pending: Option<Uuid>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::bot(WELCOME.to_string())],
            conversation_id: None,
            current_result: None,
            generation: 0,
            pending: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message(&self, id: Uuid) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn current_result(&self) -> Option<&CaptionResult> {
        self.current_result.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> Uuid {
        let message = ChatMessage::user(content.into());
        let id = message.id;
        self.messages.push(message);
        id
    }

    pub fn begin_request(&mut self) -> Result<PendingReply, SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::RequestInFlight);
        }

        let placeholder = ChatMessage::placeholder();
        let message_id = placeholder.id;
        self.messages.push(placeholder);
        self.pending = Some(message_id);

        Ok(PendingReply {
            message_id,
            generation: self.generation,
        })
    }

    /// Replaces the placeholder with the reply. Returns `false` when the reply
    /// belongs to a session that has since been reset.
    pub fn resolve(&mut self, reply: PendingReply, outcome: ReplyOutcome) -> bool {
        if reply.generation != self.generation {
            tracing::debug!(
                stale = reply.generation,
                current = self.generation,
                "discarding reply from an abandoned session"
            );
            return false;
        }

        let Some(message) = self.messages.iter_mut().find(|m| m.id == reply.message_id) else {
            return false;
        };

        match outcome {
            ReplyOutcome::Result {
                data,
                conversation_id,
            } => {
                message.role = MessageRole::Result;
                message.content = RESULT_LABEL.to_string();
                message.data = Some(data.clone());
                self.current_result = Some(data);
                self.conversation_id = conversation_id;
            }
            ReplyOutcome::Error(text) => {
                message.role = MessageRole::Error;
                message.content = format!("エラーが発生しました: {}", text);
            }
        }
        message.pending = false;
        message.timestamp = Utc::now();

        self.pending = None;
        true
    }

    pub fn acknowledge(&mut self) {
        self.messages.push(ChatMessage::bot(THANKS.to_string()));
    }

    pub fn start_new(&mut self) {
        self.generation += 1;
        self.messages = vec![ChatMessage::bot(WELCOME.to_string())];
        self.conversation_id = None;
        self.current_result = None;
        self.pending = None;
    }

    pub fn generation_request(
        &self,
        form: &FormInputs,
        files: Vec<FileReference>,
    ) -> Result<ChatRequest, SessionError> {
        if !form.is_complete() {
            return Err(SessionError::IncompleteForm);
        }

        Ok(ChatRequest {
            client: Some(form.client.trim().to_string()),
            product: Some(form.product.trim().to_string()),
            theme: Some(form.theme.trim().to_string()),
            medium: form.medium,
            tone: form.tone.clone().filter(|t| !t.trim().is_empty()),
            conversation_id: self.conversation_id.clone(),
            files,
            ..Default::default()
        })
    }

    pub fn modification_request(&self, text: &str) -> Result<ChatRequest, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyModification);
        }
        let current = self
            .current_result
            .as_ref()
            .ok_or(SessionError::NothingToModify)?;

        Ok(ChatRequest {
            client: current.client.clone(),
            product: current.product.clone(),
            medium: current.medium.as_deref().and_then(Medium::parse),
            modification_request: Some(text.to_string()),
            conversation_id: self.conversation_id.clone(),
            last_caption: current.initial_caption.clone(),
            ..Default::default()
        })
    }
}
