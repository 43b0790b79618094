mod claude;
mod gemini;
mod ollama;
mod openai;

use std::time::Duration;

use async_trait::async_trait;

pub use claude::ClaudeBackend;
pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::config::{LlmConfig, Provider};
use crate::error::{ConfigError, TransportError};

pub(crate) const MAX_TOKENS: u32 = 1024;
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const MINIMAX_API_URL: &str = "https://api.minimax.chat/v1";

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, TransportError>;

    /// Provider tag recorded on every analyzed paper.
    fn provider(&self) -> &str;

    fn model(&self) -> &str;
}

/// The configured backend, one variant per supported provider.
pub enum LlmBackend {
    Claude(ClaudeBackend),
    OpenAi(OpenAiBackend),
    Gemini(GeminiBackend),
    Ollama(OllamaBackend),
}

impl LlmBackend {
    /// Build the backend named by `config`, reading its API key from the
    /// environment once. Fails before any network activity when the key is
    /// missing.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigError> {
        let api_key = match config.key_env() {
            Some(env) => match std::env::var(env) {
                Ok(key) if !key.trim().is_empty() => Some(key),
                _ if config.provider == Provider::Ollama => None,
                _ => {
                    return Err(ConfigError::MissingCredential {
                        env: env.to_string(),
                    })
                }
            },
            None => None,
        };
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: Option<String>) -> Result<Self, ConfigError> {
        let require_key = || {
            api_key.clone().ok_or_else(|| ConfigError::MissingCredential {
                env: config.key_env().unwrap_or("API key").to_string(),
            })
        };
        let model = config.model.clone();

        let backend = match config.provider {
            Provider::Claude => {
                let mut backend = ClaudeBackend::new(require_key()?, model)?;
                if let Some(url) = &config.base_url {
                    backend = backend.with_base_url(url);
                }
                LlmBackend::Claude(backend)
            }
            Provider::OpenAi => {
                let mut backend = OpenAiBackend::new(require_key()?, model)?;
                if let Some(url) = &config.base_url {
                    backend = backend.with_base_url(url);
                }
                LlmBackend::OpenAi(backend)
            }
            Provider::MiniMax => {
                let url = config.base_url.as_deref().unwrap_or(MINIMAX_API_URL);
                let backend = OpenAiBackend::new(require_key()?, model)?
                    .with_base_url(url)
                    .with_provider_name("minimax");
                LlmBackend::OpenAi(backend)
            }
            Provider::Gemini => {
                let mut backend = GeminiBackend::new(require_key()?, model)?;
                if let Some(url) = &config.base_url {
                    backend = backend.with_base_url(url);
                }
                LlmBackend::Gemini(backend)
            }
            Provider::Ollama => {
                let host = config
                    .base_url
                    .clone()
                    .or_else(|| std::env::var("OLLAMA_HOST").ok())
                    .unwrap_or_else(|| ollama::DEFAULT_HOST.to_string());
                LlmBackend::Ollama(OllamaBackend::new(&host, model)?)
            }
        };
        Ok(backend)
    }

    fn inner(&self) -> &dyn Backend {
        match self {
            LlmBackend::Claude(b) => b,
            LlmBackend::OpenAi(b) => b,
            LlmBackend::Gemini(b) => b,
            LlmBackend::Ollama(b) => b,
        }
    }
}

#[async_trait]
impl Backend for LlmBackend {
    async fn generate(&self, prompt: &str) -> Result<String, TransportError> {
        self.inner().generate(prompt).await
    }

    fn provider(&self) -> &str {
        self.inner().provider()
    }

    fn model(&self) -> &str {
        self.inner().model()
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Turn a non-success response into the matching transport error.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::from_status(status.as_u16(), body.trim()))
}
