use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, http_client, Backend, MAX_TOKENS};
use crate::error::{ConfigError, TransportError};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI chat completions, and any service speaking the same protocol
/// (MiniMax is configured this way).
pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    provider: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String, model: String) -> Result<Self, ConfigError> {
        Ok(Self {
            http: http_client()?,
            api_key,
            base_url: OPENAI_API_URL.to_string(),
            model,
            provider: "openai".to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_provider_name(mut self, name: &str) -> Self {
        self.provider = name.to_string();
        self
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn generate(&self, prompt: &str) -> Result<String, TransportError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_TOKENS,
        };

        debug!(provider = %self.provider, model = %self.model, "chat completion request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response: ChatResponse = check_status(response).await?.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                TransportError::Other(format!("no content in {} response", self.provider))
            })
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }
}
