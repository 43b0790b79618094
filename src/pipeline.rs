use std::sync::Arc;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analysis::{Analyzer, Catalogue, PaperFailure, Progress};
use crate::arxiv::SearchClient;
use crate::config::Config;
use crate::error::StoreError;
use crate::fetch::{Aggregation, CrossDomainAggregator, FetchPolicy, FetchWindow};
use crate::llm::Backend;
use crate::models::RawPaper;
use crate::store::DailyStore;

#[derive(Debug)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub fetched: usize,
    pub kept: usize,
    pub below_threshold: usize,
    pub failures: Vec<PaperFailure>,
    pub added: usize,
    pub cancelled: bool,
}

/// Fetch, analyze and store, wired from one configuration.
pub struct Pipeline {
    config: Config,
    aggregator: CrossDomainAggregator,
    store: DailyStore,
}

impl Pipeline {
    pub fn new(config: Config, search: Arc<dyn SearchClient>) -> Self {
        let aggregator = CrossDomainAggregator::new(search, FetchPolicy::from(&config.fetch));
        let store = DailyStore::new(&config.data_dir);
        Self {
            config,
            aggregator,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &DailyStore {
        &self.store
    }

    pub fn catalogue(&self) -> Catalogue {
        Catalogue::from_domains(&self.config.domains)
    }

    pub async fn fetch_by_domain(&self, days: u32, cancel: &CancellationToken) -> Aggregation {
        self.aggregator
            .fetch_all(
                &self.config.domains,
                &FetchWindow::lookback(days),
                self.config.fetch.max_papers_per_domain,
                cancel,
            )
            .await
    }

    /// Every recent paper across domains, deduplicated, newest first.
    pub async fn fetch(&self, days: u32, cancel: &CancellationToken) -> Vec<RawPaper> {
        self.fetch_by_domain(days, cancel).await.into_recent()
    }

    pub async fn analyze_and_save<B, F>(
        &self,
        analyzer: &Analyzer<B>,
        papers: Vec<RawPaper>,
        date: NaiveDate,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<RunSummary, StoreError>
    where
        B: Backend,
        F: FnMut(Progress<'_>),
    {
        let fetched = papers.len();
        let report = analyzer.analyze_batch(papers, cancel, on_progress).await;
        let added = self.store.save(date, &report.kept).await?;

        info!(
            fetched,
            kept = report.kept.len(),
            failed = report.failures.len(),
            added,
            "run complete"
        );

        Ok(RunSummary {
            date,
            fetched,
            kept: report.kept.len(),
            below_threshold: report.below_threshold,
            failures: report.failures,
            added,
            cancelled: report.cancelled,
        })
    }
}
