use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, http_client, Backend, MAX_TOKENS};
use crate::error::{ConfigError, TransportError};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [WireMessage<'a>; 1],
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Anthropic messages API.
pub struct ClaudeBackend {
    http: reqwest::Client,
    headers: HeaderMap,
    base_url: String,
    model: String,
}

impl ClaudeBackend {
    pub fn new(api_key: String, model: String) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&api_key)
            .map_err(|e| ConfigError::InvalidCredential(e.to_string()))?;
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            http: http_client()?,
            headers,
            base_url: ANTHROPIC_API_URL.to_string(),
            model,
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Backend for ClaudeBackend {
    async fn generate(&self, prompt: &str) -> Result<String, TransportError> {
        let url = format!("{}/messages", self.base_url);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: [WireMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(model = %self.model, "Claude request");
        let response = self
            .http
            .post(&url)
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await?;
        let response: MessagesResponse = check_status(response).await?.json().await?;

        response
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .ok_or_else(|| TransportError::Other("no text in Claude response".to_string()))
    }

    fn provider(&self) -> &str {
        "claude"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
