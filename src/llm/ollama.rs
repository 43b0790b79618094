use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::Ollama;
use tokio::time::timeout;
use tracing::debug;

use super::{Backend, REQUEST_TIMEOUT};
use crate::error::{ConfigError, TransportError};

pub const DEFAULT_HOST: &str = "http://localhost:11434";
const DEFAULT_PORT: u16 = 11434;

/// A local Ollama server.
pub struct OllamaBackend {
    client: Ollama,
    model: String,
}

impl OllamaBackend {
    /// `host` may be a full URL or a bare `host:port` as found in `OLLAMA_HOST`.
    pub fn new(host: &str, model: String) -> Result<Self, ConfigError> {
        let host = host.trim();
        let full = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
        let bad = |reason: String| ConfigError::BadUrl {
            url: host.to_string(),
            reason,
        };

        let url = reqwest::Url::parse(&full).map_err(|e| bad(e.to_string()))?;
        let hostname = url
            .host_str()
            .ok_or_else(|| bad("missing host".to_string()))?;
        let port = url.port().unwrap_or(DEFAULT_PORT);

        Ok(Self {
            client: Ollama::new(format!("{}://{}", url.scheme(), hostname), port),
            model,
        })
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn generate(&self, prompt: &str) -> Result<String, TransportError> {
        debug!(model = %self.model, "Ollama request");
        let request = GenerationRequest::new(self.model.clone(), prompt.to_string());

        // Local models can be slow; the client itself has no timeout.
        match timeout(REQUEST_TIMEOUT, self.client.generate(request)).await {
            Ok(Ok(response)) => Ok(response.response),
            Ok(Err(e)) => Err(TransportError::Other(format!("Ollama error: {e}"))),
            Err(_) => Err(TransportError::Other(format!(
                "Ollama timed out after {}s",
                REQUEST_TIMEOUT.as_secs()
            ))),
        }
    }

    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bare_host_and_port() {
        assert!(OllamaBackend::new("localhost:11434", "m".to_string()).is_ok());
        assert!(OllamaBackend::new("127.0.0.1", "m".to_string()).is_ok());
        assert!(OllamaBackend::new(DEFAULT_HOST, "m".to_string()).is_ok());
    }

    #[test]
    fn rejects_nonsense() {
        assert!(matches!(
            OllamaBackend::new("http://", "m".to_string()),
            Err(ConfigError::BadUrl { .. })
        ));
    }
}
