use std::env;

const DEFAULT_CHAT_USER: &str = "dify-interactive-user";
const DEFAULT_UPLOAD_USER: &str = "dify-caption-bot-user";

/// Upstream workflow settings. The URL and key stay optional here so that a
/// missing value surfaces as a 500 on the relay endpoints instead of a panic
/// at boot.
#[derive(Debug, Clone, Default)]
pub struct DifyConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub chat_user: String,
    pub upload_user: String,
}

impl DifyConfig {
    pub fn new(api_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            api_url,
            api_key,
            chat_user: DEFAULT_CHAT_USER.to_string(),
            upload_user: DEFAULT_UPLOAD_USER.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        non_empty(&self.api_url).is_some() && non_empty(&self.api_key).is_some()
    }

    /// Base URL and key, both present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let url = non_empty(&self.api_url)?;
        let key = non_empty(&self.api_key)?;
        Some((url.trim_end_matches('/'), key))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn load() -> DifyConfig {
    let mut config = DifyConfig::new(env::var("DIFY_API_URL").ok(), env::var("DIFY_API_KEY").ok());

    if let Ok(user) = env::var("DIFY_USER") {
        config.chat_user = user;
    }
    if let Ok(user) = env::var("DIFY_UPLOAD_USER") {
        config.upload_user = user;
    }

    if !config.is_configured() {
        tracing::warn!("DIFY_API_URL or DIFY_API_KEY is not set; relay endpoints will return 500");
    }

    config
}
