use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::prompt::{build_prompt, Catalogue};
use super::validate::ResponseValidator;
use crate::error::AnalysisError;
use crate::llm::Backend;
use crate::models::{AnalyzedPaper, RawPaper};

/// Reported before each paper is sent to the backend.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// 1-based.
    pub index: usize,
    pub total: usize,
    pub title: &'a str,
}

#[derive(Debug)]
pub struct PaperFailure {
    pub arxiv_id: String,
    pub error: AnalysisError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub kept: Vec<AnalyzedPaper>,
    pub below_threshold: usize,
    pub failures: Vec<PaperFailure>,
    pub cancelled: bool,
}

/// Runs papers through one backend, one at a time.
pub struct Analyzer<B> {
    backend: B,
    validator: ResponseValidator,
    min_score: u8,
}

impl<B: Backend> Analyzer<B> {
    pub fn new(backend: B, catalogue: Catalogue, min_score: u8) -> Self {
        Self {
            backend,
            validator: ResponseValidator::new(catalogue),
            min_score,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Analyze a single paper. Does not apply the score threshold.
    pub async fn analyze(&self, paper: RawPaper) -> Result<AnalyzedPaper, AnalysisError> {
        let prompt = build_prompt(&paper.title, &paper.abstract_text, self.validator.catalogue());
        let response = self.backend.generate(&prompt).await?;
        let analysis = self.validator.validate(&response)?;
        Ok(AnalyzedPaper::from_raw_and_analysis(
            paper,
            analysis,
            self.backend.provider(),
            self.backend.model(),
        ))
    }

    /// Analyze every paper, keeping those scoring at least `min_score`.
    /// A failing paper is logged and skipped; the batch always runs to the
    /// end unless `cancel` fires.
    pub async fn analyze_batch<F>(
        &self,
        papers: Vec<RawPaper>,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> BatchReport
    where
        F: FnMut(Progress<'_>),
    {
        let total = papers.len();
        let mut report = BatchReport::default();

        for (i, paper) in papers.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(done = i, total, "analysis cancelled");
                report.cancelled = true;
                break;
            }

            on_progress(Progress {
                index: i + 1,
                total,
                title: &paper.title,
            });

            let arxiv_id = paper.arxiv_id.clone();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                outcome = self.analyze(paper) => outcome,
            };

            match outcome {
                Ok(analyzed) if analyzed.relevance_score >= self.min_score => {
                    info!(
                        arxiv_id = %analyzed.arxiv_id,
                        score = analyzed.relevance_score,
                        category = %analyzed.assigned_category,
                        "kept"
                    );
                    report.kept.push(analyzed);
                }
                Ok(analyzed) => {
                    info!(
                        arxiv_id = %analyzed.arxiv_id,
                        score = analyzed.relevance_score,
                        min_score = self.min_score,
                        "below threshold"
                    );
                    report.below_threshold += 1;
                }
                Err(error) => {
                    warn!(%arxiv_id, %error, "analysis failed, skipping paper");
                    report.failures.push(PaperFailure { arxiv_id, error });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainSpec;
    use crate::error::TransportError;
    use crate::models::fixtures::raw;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers by looking for a paper title in the prompt.
    struct Scripted {
        replies: HashMap<String, Result<String, u16>>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Backend for Scripted {
        async fn generate(&self, prompt: &str) -> Result<String, TransportError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            for (title, reply) in &self.replies {
                if prompt.contains(title.as_str()) {
                    return reply
                        .clone()
                        .map_err(|status| TransportError::from_status(status, "nope"));
                }
            }
            Err(TransportError::Other("no script".to_string()))
        }

        fn provider(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "v0"
        }
    }

    fn reply(category: &str, score: u8) -> Result<String, u16> {
        Ok(format!(
            r#"```json
{{"summary":"s","key_contributions":["a","b"],"methodology":"m","tags":["t"],"category":"{category}","relevance_score":{score},"relevance_reason":"r"}}
```"#
        ))
    }

    fn catalogue() -> Catalogue {
        Catalogue::from_domains(&[DomainSpec {
            name: "Agents".to_string(),
            categories: vec![],
            keywords: vec!["agent".to_string()],
            output_category: "agents".to_string(),
        }])
    }

    fn analyzer(replies: Vec<(&str, Result<String, u16>)>) -> Analyzer<Scripted> {
        let backend = Scripted {
            replies: replies
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            prompts: Mutex::new(Vec::new()),
        };
        Analyzer::new(backend, catalogue(), 5)
    }

    #[tokio::test]
    async fn failures_and_low_scores_do_not_stop_batch() {
        let analyzer = analyzer(vec![
            ("Paper 2501.00001", reply("agents", 9)),
            ("Paper 2501.00002", Err(500)),
            ("Paper 2501.00003", Ok("not json at all".to_string())),
            ("Paper 2501.00004", reply("agents", 3)),
            ("Paper 2501.00005", reply("unknown", 5)),
        ]);
        let papers = (1..=5)
            .map(|i| raw(&format!("2501.{i:05}v1"), Utc::now()))
            .collect();

        let mut seen = Vec::new();
        let report = analyzer
            .analyze_batch(papers, &CancellationToken::new(), |p| {
                seen.push((p.index, p.total))
            })
            .await;

        assert_eq!(seen, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
        let kept: Vec<_> = report.kept.iter().map(|p| p.arxiv_id.as_str()).collect();
        assert_eq!(kept, vec!["2501.00001v1", "2501.00005v1"]);
        assert_eq!(report.kept[1].assigned_category, "agents");
        assert_eq!(report.kept[0].llm_provider, "scripted");
        assert_eq!(report.kept[0].llm_model, "v0");
        assert_eq!(report.below_threshold, 1);

        let failed: Vec<_> = report.failures.iter().map(|f| f.arxiv_id.as_str()).collect();
        assert_eq!(failed, vec!["2501.00002v1", "2501.00003v1"]);
        assert!(matches!(report.failures[0].error, AnalysisError::Transport(_)));
        assert!(matches!(report.failures[1].error, AnalysisError::Parse(_)));
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn prompt_carries_title_and_catalogue() {
        let analyzer = analyzer(vec![("Paper 2501.00001", reply("agents", 8))]);
        analyzer
            .analyze(raw("2501.00001v1", Utc::now()))
            .await
            .unwrap();
        let prompts = analyzer.backend().prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Title: Paper 2501.00001"));
        assert!(prompts[0].contains("agents: Agents (keywords: agent)"));
    }

    #[tokio::test]
    async fn cancelled_batch_analyzes_nothing() {
        let analyzer = analyzer(vec![("Paper 2501.00001", reply("agents", 8))]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = analyzer
            .analyze_batch(vec![raw("2501.00001v1", Utc::now())], &cancel, |_| {})
            .await;
        assert!(report.cancelled);
        assert!(report.kept.is_empty());
        assert!(analyzer.backend().prompts.lock().unwrap().is_empty());
    }
}
