mod orchestrator;
mod prompt;
mod validate;

pub use orchestrator::{Analyzer, BatchReport, PaperFailure, Progress};
pub use prompt::{build_prompt, Catalogue, CatalogueEntry, FALLBACK_CATEGORY};
pub use validate::{ResponseValidator, DEFAULT_SCORE, MAX_SCORE, MIN_SCORE};
