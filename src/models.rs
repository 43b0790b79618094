use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Strip a trailing version suffix: `2401.12345v2` -> `2401.12345`.
pub fn identity_key(id: &str) -> &str {
    match id.rfind('v') {
        Some(ix)
            if ix > 0
                && ix + 1 < id.len()
                && id[ix + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &id[..ix]
        }
        _ => id,
    }
}

/// A paper as returned by the search service, before analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPaper {
    pub arxiv_id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub primary_category: String,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub pdf_url: String,
    pub abs_url: String,
}

impl RawPaper {
    pub fn short_id(&self) -> &str {
        identity_key(&self.arxiv_id)
    }
}

/// Structured output of one LLM analysis, after validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub key_contributions: Vec<String>,
    pub methodology: String,
    pub tags: Vec<String>,
    pub category: String,
    pub relevance_score: u8,
    pub relevance_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedPaper {
    pub arxiv_id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub primary_category: String,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub pdf_url: String,
    pub abs_url: String,

    pub summary: String,
    pub key_contributions: Vec<String>,
    pub methodology: String,
    pub tags: Vec<String>,
    pub assigned_category: String,
    pub relevance_score: u8,
    pub relevance_reason: String,

    pub analyzed_at: DateTime<Utc>,
    pub llm_provider: String,
    pub llm_model: String,
}

impl AnalyzedPaper {
    pub fn from_raw_and_analysis(
        raw: RawPaper,
        analysis: AnalysisResult,
        llm_provider: &str,
        llm_model: &str,
    ) -> Self {
        Self {
            arxiv_id: raw.arxiv_id,
            title: raw.title,
            abstract_text: raw.abstract_text,
            authors: raw.authors,
            categories: raw.categories,
            primary_category: raw.primary_category,
            published: raw.published,
            updated: raw.updated,
            pdf_url: raw.pdf_url,
            abs_url: raw.abs_url,
            summary: analysis.summary,
            key_contributions: analysis.key_contributions,
            methodology: analysis.methodology,
            tags: analysis.tags,
            assigned_category: analysis.category,
            relevance_score: analysis.relevance_score,
            relevance_reason: analysis.relevance_reason,
            analyzed_at: Utc::now(),
            llm_provider: llm_provider.to_string(),
            llm_model: llm_model.to_string(),
        }
    }

    pub fn short_id(&self) -> &str {
        identity_key(&self.arxiv_id)
    }
}

/// Everything analyzed for one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    #[serde(default)]
    pub papers: Vec<AnalyzedPaper>,
    pub fetch_time: DateTime<Utc>,
}

impl DailyRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            papers: Vec::new(),
            fetch_time: Utc::now(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.papers.iter().any(|p| p.short_id() == key)
    }

    /// Append unless a paper with the same identity key is already present.
    pub fn add_paper(&mut self, paper: AnalyzedPaper) -> bool {
        if self.contains(paper.short_id()) {
            return false;
        }
        self.papers.push(paper);
        true
    }

    pub fn by_category<'a>(&'a self, slug: &'a str) -> impl Iterator<Item = &'a AnalyzedPaper> {
        self.papers
            .iter()
            .filter(move |p| p.assigned_category == slug)
    }

    pub fn high_relevance(&self, min_score: u8) -> impl Iterator<Item = &AnalyzedPaper> {
        self.papers
            .iter()
            .filter(move |p| p.relevance_score >= min_score)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn raw(id: &str, published: DateTime<Utc>) -> RawPaper {
        let key = identity_key(id);
        RawPaper {
            arxiv_id: id.to_string(),
            title: format!("Paper {key}"),
            abstract_text: format!("Abstract of {key}"),
            authors: vec!["Doe, J.".to_string()],
            categories: vec!["cs.AI".to_string()],
            primary_category: "cs.AI".to_string(),
            published,
            updated: published,
            pdf_url: format!("https://arxiv.org/pdf/{id}"),
            abs_url: format!("https://arxiv.org/abs/{id}"),
        }
    }

    pub fn analysis(category: &str, score: u8) -> AnalysisResult {
        AnalysisResult {
            summary: "s".to_string(),
            key_contributions: vec!["a".to_string(), "b".to_string()],
            methodology: "m".to_string(),
            tags: vec!["t".to_string()],
            category: category.to_string(),
            relevance_score: score,
            relevance_reason: "r".to_string(),
        }
    }

    pub fn analyzed(id: &str, category: &str, score: u8) -> AnalyzedPaper {
        let published = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        AnalyzedPaper::from_raw_and_analysis(
            raw(id, published),
            analysis(category, score),
            "claude",
            "test-model",
        )
    }
}
