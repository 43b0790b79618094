use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, http_client, Backend};
use crate::error::{ConfigError, TransportError};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Google Gemini `generateContent`.
pub struct GeminiBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(api_key: String, model: String) -> Result<Self, ConfigError> {
        Ok(Self {
            http: http_client()?,
            api_key,
            base_url: GEMINI_API_URL.to_string(),
            model,
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> Result<String, TransportError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        debug!(model = %self.model, "Gemini request");
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        let response: GenerateResponse = check_status(response).await?.json().await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(TransportError::Other("no text in Gemini response".to_string()));
        }
        Ok(text)
    }

    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
