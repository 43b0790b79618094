use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::atom::{parse_feed, ResultRecord};
use crate::error::TransportError;

const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

/// A search service that can return one page of results for a query,
/// newest submissions first.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search_page(
        &self,
        query: &str,
        start: usize,
        page_size: usize,
    ) -> Result<Vec<ResultRecord>, TransportError>;
}

/// Enforces a minimum gap between successive requests. Shared by every
/// caller of one client, so concurrent users are still paced globally.
pub struct Pacer {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait until the next request may go out and reserve the slot after it.
    pub async fn wait(&self) {
        let mut next = self.next_slot.lock().await;
        if let Some(at) = *next {
            sleep_until(at).await;
        }
        *next = Some(Instant::now() + self.min_interval);
    }
}

pub struct ArxivClient {
    http: Client,
    pacer: Pacer,
}

impl ArxivClient {
    pub fn new(request_delay: Duration) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(concat!("paper_tracker/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            pacer: Pacer::new(request_delay),
        })
    }
}

#[async_trait]
impl SearchClient for ArxivClient {
    async fn search_page(
        &self,
        query: &str,
        start: usize,
        page_size: usize,
    ) -> Result<Vec<ResultRecord>, TransportError> {
        self.pacer.wait().await;
        debug!(query, start, page_size, "arXiv request");

        let response = self
            .http
            .get(ARXIV_API_URL)
            .query(&[("search_query", query)])
            .query(&[("start", start), ("max_results", page_size)])
            .query(&[("sortBy", "submittedDate"), ("sortOrder", "descending")])
            .header(ACCEPT, "application/atom+xml, application/xml;q=0.9, text/xml;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status.as_u16(), body.trim()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !(content_type.contains("xml") || content_type.contains("atom")) {
            let mut preview = response.text().await.unwrap_or_default().trim().to_string();
            if preview.len() > 200 {
                let mut end = 200;
                while !preview.is_char_boundary(end) {
                    end -= 1;
                }
                preview.truncate(end);
            }
            return Err(TransportError::Other(format!(
                "unexpected content-type {content_type}: {preview}"
            )));
        }

        let body = response.text().await?;
        parse_feed(&body)
    }
}
