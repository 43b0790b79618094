//! Fetch recent arXiv papers per research domain, analyze each with an LLM
//! backend and keep a deduplicated record per day.

pub mod analysis;
pub mod arxiv;
pub mod config;
pub mod error;
pub mod fetch;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod web;

pub use config::{Config, DomainSpec};
pub use error::{AnalysisError, ConfigError, StoreError, TransportError};
pub use models::{identity_key, AnalysisResult, AnalyzedPaper, DailyRecord, RawPaper};
