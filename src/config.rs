use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "data/config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Paper Tracker".to_string(),
            description: "Daily arXiv paper tracking with AI-powered analysis".to_string(),
            base_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    OpenAi,
    Ollama,
    MiniMax,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAi => "openai",
            Provider::Ollama => "ollama",
            Provider::MiniMax => "minimax",
            Provider::Gemini => "gemini",
        }
    }

    /// Environment variable holding the API key when the config names none.
    /// Ollama runs locally and needs no key.
    pub fn default_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::Claude => Some("ANTHROPIC_API_KEY"),
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::MiniMax => Some("MINIMAX_API_KEY"),
            Provider::Gemini => Some("GEMINI_API_KEY"),
            Provider::Ollama => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Claude,
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: None,
            base_url: None,
        }
    }
}

impl LlmConfig {
    pub fn key_env(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .or_else(|| self.provider.default_key_env())
    }

    pub fn api_key_is_set(&self) -> bool {
        self.key_env()
            .map(|env| std::env::var(env).map(|v| !v.is_empty()).unwrap_or(false))
            .unwrap_or(true)
    }
}

/// One configured research area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSpec {
    pub name: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub output_category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub days_back: u32,
    pub max_papers_per_domain: usize,
    pub min_relevance_score: u8,
    pub request_delay_secs: u64,
    pub page_size: usize,
    pub max_attempts: u32,
    pub backoff_secs: u64,
    pub domain_pause_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            days_back: 1,
            max_papers_per_domain: 50,
            min_relevance_score: 5,
            request_delay_secs: 10,
            page_size: 100,
            max_attempts: 3,
            backoff_secs: 60,
            domain_pause_secs: 5,
        }
    }
}

impl FetchConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub llm: LlmConfig,
    pub domains: Vec<DomainSpec>,
    pub fetch: FetchConfig,
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            llm: LlmConfig::default(),
            domains: Vec::new(),
            fetch: FetchConfig::default(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    /// Load from `path` (or the default location). A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn output_categories(&self) -> Vec<String> {
        self.domains
            .iter()
            .map(|d| d.output_category.clone())
            .collect()
    }

    pub fn domain_by_output_category(&self, slug: &str) -> Option<&DomainSpec> {
        self.domains.iter().find(|d| d.output_category == slug)
    }

    /// Every source category across all domains, sorted and unique.
    pub fn all_categories(&self) -> Vec<String> {
        self.domains
            .iter()
            .flat_map(|d| d.categories.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
