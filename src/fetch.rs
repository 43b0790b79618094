use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::arxiv::{build_query, PaginatedFetcher, SearchClient};
use crate::config::{DomainSpec, FetchConfig};
use crate::error::TransportError;
use crate::models::RawPaper;

/// Hard ceiling on how many results one domain fetch may ask the search
/// service for, whatever `max_papers` is.
pub const MAX_REQUEST_BUDGET: usize = 1000;

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub page_size: usize,
    pub max_attempts: u32,
    /// Wait before retry `n` is `backoff * n`.
    pub backoff: Duration,
    pub domain_pause: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for FetchPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_secs(config.backoff_secs),
            domain_pause: Duration::from_secs(config.domain_pause_secs),
        }
    }
}

/// Results for `max_papers` plus headroom for date/dedup filtering.
pub fn request_budget(max_papers: usize) -> usize {
    max_papers.saturating_mul(2).min(MAX_REQUEST_BUDGET)
}

/// Papers published at or after `cutoff` are in the window.
#[derive(Debug, Clone, Copy)]
pub struct FetchWindow {
    cutoff: DateTime<Utc>,
}

impl FetchWindow {
    pub fn lookback(days: u32) -> Self {
        Self::since(Utc::now() - chrono::Duration::days(i64::from(days)))
    }

    pub fn since(cutoff: DateTime<Utc>) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    pub fn contains(&self, paper: &RawPaper) -> bool {
        paper.published >= self.cutoff
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainOutcome {
    Complete,
    /// Still rate limited after the last attempt.
    RetriesExhausted,
    Failed(String),
    Cancelled,
}

#[derive(Debug)]
pub struct DomainFetch {
    pub papers: Vec<RawPaper>,
    pub attempts: u32,
    pub outcome: DomainOutcome,
}

enum ScanEnd {
    Done,
    Cancelled,
}

/// Fetches one domain with retry on rate limiting. Never returns an error:
/// on failure the papers gathered so far come back with the outcome.
#[derive(Clone)]
pub struct DomainFetcher {
    pager: PaginatedFetcher,
    policy: FetchPolicy,
}

impl DomainFetcher {
    pub fn new(client: Arc<dyn SearchClient>, policy: FetchPolicy) -> Self {
        Self {
            pager: PaginatedFetcher::new(client, policy.page_size),
            policy,
        }
    }

    pub async fn fetch_domain(
        &self,
        domain: &DomainSpec,
        window: &FetchWindow,
        max_papers: usize,
        cancel: &CancellationToken,
    ) -> DomainFetch {
        let query = build_query(domain);
        let budget = request_budget(max_papers);
        debug!(
            domain = %domain.name,
            %query,
            budget,
            cutoff = %window.cutoff(),
            "domain query"
        );

        let mut seen = HashSet::new();
        let mut papers = Vec::new();
        let mut attempt = 0;

        let outcome = loop {
            attempt += 1;
            let scan = self
                .scan(&query, budget, window, max_papers, &mut seen, &mut papers, cancel)
                .await;

            match scan {
                Ok(ScanEnd::Done) => break DomainOutcome::Complete,
                Ok(ScanEnd::Cancelled) => break DomainOutcome::Cancelled,
                Err(e) if e.is_rate_limited() && attempt < self.policy.max_attempts => {
                    let wait = self.policy.backoff * attempt;
                    warn!(
                        domain = %domain.name,
                        attempt,
                        wait_secs = wait.as_secs(),
                        error = %e,
                        "rate limited, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break DomainOutcome::Cancelled,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Err(e) if e.is_rate_limited() => {
                    warn!(domain = %domain.name, attempt, error = %e, "giving up after retries");
                    break DomainOutcome::RetriesExhausted;
                }
                Err(e) => {
                    warn!(domain = %domain.name, attempt, error = %e, "domain fetch failed");
                    break DomainOutcome::Failed(e.to_string());
                }
            }
        };

        DomainFetch {
            papers,
            attempts: attempt,
            outcome,
        }
    }

    /// One pass over the requested batch. Every record is looked at; a stale
    /// one does not end the scan since the remote sort is only approximate.
    #[allow(clippy::too_many_arguments)]
    async fn scan(
        &self,
        query: &str,
        budget: usize,
        window: &FetchWindow,
        max_papers: usize,
        seen: &mut HashSet<String>,
        papers: &mut Vec<RawPaper>,
        cancel: &CancellationToken,
    ) -> Result<ScanEnd, TransportError> {
        if papers.len() >= max_papers {
            return Ok(ScanEnd::Done);
        }

        let results = self.pager.results(query, budget);
        futures::pin_mut!(results);

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(ScanEnd::Cancelled),
                next = results.next() => next,
            };
            let Some(record) = next else {
                return Ok(ScanEnd::Done);
            };

            let paper = match RawPaper::try_from(record?) {
                Ok(paper) => paper,
                Err(e) => {
                    warn!(error = %e, "skipping malformed record");
                    continue;
                }
            };

            if !window.contains(&paper) {
                continue;
            }
            if !seen.insert(paper.short_id().to_string()) {
                continue;
            }

            papers.push(paper);
            if papers.len() >= max_papers {
                return Ok(ScanEnd::Done);
            }
        }
    }
}

#[derive(Debug)]
pub struct DomainBatch {
    pub name: String,
    pub output_category: String,
    pub papers: Vec<RawPaper>,
    pub attempts: u32,
    pub outcome: DomainOutcome,
}

/// Per-domain results in configuration order.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub batches: Vec<DomainBatch>,
}

impl Aggregation {
    pub fn papers_for(&self, output_category: &str) -> Option<&[RawPaper]> {
        self.batches
            .iter()
            .find(|b| b.output_category == output_category)
            .map(|b| b.papers.as_slice())
    }

    pub fn total(&self) -> usize {
        self.batches.iter().map(|b| b.papers.len()).sum()
    }

    /// Flatten into one list, newest first. The sort is stable so equal
    /// timestamps keep domain order.
    pub fn into_recent(self) -> Vec<RawPaper> {
        let mut seen = HashSet::new();
        let mut papers: Vec<RawPaper> = self
            .batches
            .into_iter()
            .flat_map(|b| b.papers)
            .filter(|p| seen.insert(p.short_id().to_string()))
            .collect();
        papers.sort_by(|a, b| b.published.cmp(&a.published));
        papers
    }
}

pub struct CrossDomainAggregator {
    fetcher: DomainFetcher,
    domain_pause: Duration,
}

impl CrossDomainAggregator {
    pub fn new(client: Arc<dyn SearchClient>, policy: FetchPolicy) -> Self {
        let domain_pause = policy.domain_pause;
        Self {
            fetcher: DomainFetcher::new(client, policy),
            domain_pause,
        }
    }

    /// Fetch every domain in order. A paper already claimed by an earlier
    /// domain is dropped from later ones.
    pub async fn fetch_all(
        &self,
        domains: &[DomainSpec],
        window: &FetchWindow,
        max_papers: usize,
        cancel: &CancellationToken,
    ) -> Aggregation {
        let mut aggregation = Aggregation::default();
        let mut claimed: HashSet<String> = HashSet::new();

        for (i, domain) in domains.iter().enumerate() {
            if i > 0 && !self.domain_pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.domain_pause) => {}
                }
            }
            if cancel.is_cancelled() {
                info!("fetch cancelled before domain {}", domain.name);
                break;
            }

            info!(domain = %domain.name, "fetching domain");
            let fetch = self
                .fetcher
                .fetch_domain(domain, window, max_papers, cancel)
                .await;

            let papers: Vec<RawPaper> = fetch
                .papers
                .into_iter()
                .filter(|p| claimed.insert(p.short_id().to_string()))
                .collect();

            info!(
                domain = %domain.name,
                found = papers.len(),
                attempts = fetch.attempts,
                outcome = ?fetch.outcome,
                "domain done"
            );

            aggregation.batches.push(DomainBatch {
                name: domain.name.clone(),
                output_category: domain.output_category.clone(),
                papers,
                attempts: fetch.attempts,
                outcome: fetch.outcome,
            });
        }

        aggregation
    }

    pub async fn fetch_recent(
        &self,
        domains: &[DomainSpec],
        window: &FetchWindow,
        max_papers: usize,
        cancel: &CancellationToken,
    ) -> Vec<RawPaper> {
        self.fetch_all(domains, window, max_papers, cancel)
            .await
            .into_recent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arxiv::ResultRecord;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn record(id: &str, published: &str) -> ResultRecord {
        ResultRecord {
            entry_id: format!("http://arxiv.org/abs/{id}"),
            title: format!("Title {id}"),
            summary: "Abstract".to_string(),
            published: published.to_string(),
            categories: vec!["cs.AI".to_string()],
            ..ResultRecord::default()
        }
    }

    struct Fixed {
        records: Vec<ResultRecord>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl SearchClient for Fixed {
        async fn search_page(
            &self,
            _query: &str,
            start: usize,
            page_size: usize,
        ) -> Result<Vec<ResultRecord>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.iter().skip(start).take(page_size).cloned().collect())
        }
    }

    /// Serves `ok_pages` pages and then fails with `error` on every call.
    struct Flaky {
        records: Vec<ResultRecord>,
        ok_pages: u32,
        status: u16,
        calls: AtomicU32,
    }

    #[async_trait]
    impl SearchClient for Flaky {
        async fn search_page(
            &self,
            _query: &str,
            start: usize,
            page_size: usize,
        ) -> Result<Vec<ResultRecord>, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.ok_pages {
                return Err(TransportError::from_status(self.status, "busy"));
            }
            Ok(self.records.iter().skip(start).take(page_size).cloned().collect())
        }
    }

    fn fast_policy() -> FetchPolicy {
        FetchPolicy {
            page_size: 2,
            max_attempts: 3,
            backoff: Duration::from_millis(1),
            domain_pause: Duration::ZERO,
        }
    }

    fn domain(slug: &str) -> DomainSpec {
        DomainSpec {
            name: slug.to_uppercase(),
            categories: vec!["cs.AI".to_string()],
            keywords: vec!["agent".to_string()],
            output_category: slug.to_string(),
        }
    }

    fn window() -> FetchWindow {
        FetchWindow::since(Utc.with_ymd_and_hms(2025, 1, 14, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn drops_stale_and_duplicate_versions() {
        let client = Arc::new(Fixed {
            records: vec![
                record("2501.00003v1", "2025-01-15T10:00:00Z"),
                record("2501.00001v1", "2025-01-10T10:00:00Z"),
                record("2501.00003v2", "2025-01-15T11:00:00Z"),
                record("2501.00002v1", "2025-01-14T09:00:00Z"),
            ],
            calls: AtomicU32::new(0),
        });
        let fetcher = DomainFetcher::new(client, fast_policy());
        let fetch = fetcher
            .fetch_domain(&domain("a"), &window(), 10, &CancellationToken::new())
            .await;

        let ids: Vec<_> = fetch.papers.iter().map(|p| p.arxiv_id.as_str()).collect();
        assert_eq!(ids, vec!["2501.00003v1", "2501.00002v1"]);
        assert_eq!(fetch.outcome, DomainOutcome::Complete);
    }

    #[tokio::test]
    async fn stale_record_does_not_end_scan() {
        let client = Arc::new(Fixed {
            records: vec![
                record("2501.00001v1", "2024-12-01T00:00:00Z"),
                record("2501.00002v1", "2024-12-01T00:00:00Z"),
                record("2501.00003v1", "2025-01-15T00:00:00Z"),
            ],
            calls: AtomicU32::new(0),
        });
        let fetcher = DomainFetcher::new(client, fast_policy());
        let fetch = fetcher
            .fetch_domain(&domain("a"), &window(), 10, &CancellationToken::new())
            .await;
        assert_eq!(fetch.papers.len(), 1);
        assert_eq!(fetch.papers[0].arxiv_id, "2501.00003v1");
    }

    #[tokio::test]
    async fn malformed_record_is_skipped() {
        let client = Arc::new(Fixed {
            records: vec![
                record("2501.00001v1", "garbage"),
                record("2501.00002v1", "2025-01-15T00:00:00Z"),
            ],
            calls: AtomicU32::new(0),
        });
        let fetcher = DomainFetcher::new(client, fast_policy());
        let fetch = fetcher
            .fetch_domain(&domain("a"), &window(), 10, &CancellationToken::new())
            .await;
        assert_eq!(fetch.papers.len(), 1);
        assert_eq!(fetch.outcome, DomainOutcome::Complete);
    }

    #[tokio::test]
    async fn stops_at_max_papers() {
        let records = (0..10)
            .map(|i| record(&format!("2501.{i:05}v1"), "2025-01-15T00:00:00Z"))
            .collect();
        let client = Arc::new(Fixed {
            records,
            calls: AtomicU32::new(0),
        });
        let fetcher = DomainFetcher::new(client.clone(), fast_policy());
        let fetch = fetcher
            .fetch_domain(&domain("a"), &window(), 3, &CancellationToken::new())
            .await;
        assert_eq!(fetch.papers.len(), 3);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rate_limit_retries_three_times_then_gives_up() {
        let client = Arc::new(Flaky {
            records: Vec::new(),
            ok_pages: 0,
            status: 429,
            calls: AtomicU32::new(0),
        });
        let fetcher = DomainFetcher::new(client.clone(), fast_policy());
        let fetch = fetcher
            .fetch_domain(&domain("a"), &window(), 5, &CancellationToken::new())
            .await;

        assert_eq!(fetch.attempts, 3);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert!(fetch.papers.is_empty());
        assert_eq!(fetch.outcome, DomainOutcome::RetriesExhausted);
    }

    #[tokio::test]
    async fn partial_results_survive_rate_limiting() {
        let records = (0..6)
            .map(|i| record(&format!("2501.{i:05}v1"), "2025-01-15T00:00:00Z"))
            .collect();
        let client = Arc::new(Flaky {
            records,
            ok_pages: 1,
            status: 503,
            calls: AtomicU32::new(0),
        });
        let fetcher = DomainFetcher::new(client.clone(), fast_policy());
        let fetch = fetcher
            .fetch_domain(&domain("a"), &window(), 5, &CancellationToken::new())
            .await;

        assert_eq!(fetch.papers.len(), 2);
        assert_eq!(fetch.attempts, 3);
        assert_eq!(fetch.outcome, DomainOutcome::RetriesExhausted);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let client = Arc::new(Flaky {
            records: Vec::new(),
            ok_pages: 0,
            status: 500,
            calls: AtomicU32::new(0),
        });
        let fetcher = DomainFetcher::new(client.clone(), fast_policy());
        let fetch = fetcher
            .fetch_domain(&domain("a"), &window(), 5, &CancellationToken::new())
            .await;

        assert_eq!(fetch.attempts, 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(fetch.outcome, DomainOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_any_request() {
        let client = Arc::new(Fixed {
            records: vec![record("2501.00001v1", "2025-01-15T00:00:00Z")],
            calls: AtomicU32::new(0),
        });
        let aggregator = CrossDomainAggregator::new(client.clone(), fast_policy());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let aggregation = aggregator
            .fetch_all(&[domain("a"), domain("b")], &window(), 5, &cancel)
            .await;
        assert!(aggregation.batches.is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn earlier_domain_claims_shared_paper() {
        let client = Arc::new(Fixed {
            records: vec![
                record("2501.00001v1", "2025-01-15T08:00:00Z"),
                record("2501.00002v1", "2025-01-15T09:00:00Z"),
            ],
            calls: AtomicU32::new(0),
        });
        let aggregator = CrossDomainAggregator::new(client, fast_policy());
        let aggregation = aggregator
            .fetch_all(
                &[domain("first"), domain("second")],
                &window(),
                5,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(aggregation.papers_for("first").map(|p| p.len()), Some(2));
        assert_eq!(aggregation.papers_for("second").map(|p| p.len()), Some(0));

        let recent = aggregation.into_recent();
        let ids: Vec<_> = recent.iter().map(|p| p.arxiv_id.as_str()).collect();
        assert_eq!(ids, vec!["2501.00002v1", "2501.00001v1"]);
    }

    #[test]
    fn equal_timestamps_keep_domain_order() {
        let paper = |id: &str, published: &str| RawPaper::try_from(record(id, published)).unwrap();
        let batch = |slug: &str, papers: Vec<RawPaper>| DomainBatch {
            name: slug.to_uppercase(),
            output_category: slug.to_string(),
            papers,
            attempts: 1,
            outcome: DomainOutcome::Complete,
        };
        let aggregation = Aggregation {
            batches: vec![
                batch("first", vec![paper("2501.00001v1", "2025-01-15T08:00:00Z")]),
                batch(
                    "second",
                    vec![
                        paper("2501.00002v1", "2025-01-15T08:00:00Z"),
                        paper("2501.00003v1", "2025-01-15T09:00:00Z"),
                    ],
                ),
            ],
        };
        assert_eq!(aggregation.total(), 3);

        let recent = aggregation.into_recent();
        let ids: Vec<_> = recent.iter().map(|p| p.arxiv_id.as_str()).collect();
        assert_eq!(ids, vec!["2501.00003v1", "2501.00001v1", "2501.00002v1"]);
    }

    #[tokio::test]
    async fn cancel_interrupts_backoff_wait() {
        let client = Arc::new(Flaky {
            records: Vec::new(),
            ok_pages: 0,
            status: 429,
            calls: AtomicU32::new(0),
        });
        let policy = FetchPolicy {
            backoff: Duration::from_secs(600),
            ..fast_policy()
        };
        let fetcher = DomainFetcher::new(client.clone(), policy);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let fetch = tokio::time::timeout(
            Duration::from_secs(5),
            fetcher.fetch_domain(&domain("a"), &window(), 5, &cancel),
        )
        .await
        .expect("backoff wait was not interrupted");

        assert_eq!(fetch.outcome, DomainOutcome::Cancelled);
        assert_eq!(fetch.attempts, 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn budget_is_bounded() {
        assert_eq!(request_budget(50), 100);
        assert_eq!(request_budget(10_000), MAX_REQUEST_BUDGET);
        assert_eq!(request_budget(usize::MAX), MAX_REQUEST_BUDGET);
    }
}
