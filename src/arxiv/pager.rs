use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};

use super::atom::ResultRecord;
use super::client::SearchClient;
use crate::error::TransportError;

/// Walks the pages of one query, one request at a time, never asking for
/// more than `max_results` records in total.
#[derive(Clone)]
pub struct PaginatedFetcher {
    client: Arc<dyn SearchClient>,
    page_size: usize,
}

struct Page {
    start: usize,
    exhausted: bool,
}

impl PaginatedFetcher {
    pub fn new(client: Arc<dyn SearchClient>, page_size: usize) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
        }
    }

    /// Lazily stream records for `query`. The next page is only requested once
    /// the previous one has been consumed, so there is never more than one
    /// request in flight. A short page ends the stream.
    pub fn results<'q>(
        &'q self,
        query: &'q str,
        max_results: usize,
    ) -> impl Stream<Item = Result<ResultRecord, TransportError>> + 'q {
        let initial = Page {
            start: 0,
            exhausted: false,
        };

        stream::try_unfold(initial, move |page| async move {
            if page.exhausted || page.start >= max_results {
                return Ok::<_, TransportError>(None);
            }

            let size = (max_results - page.start).min(self.page_size);
            let records = self.client.search_page(query, page.start, size).await?;
            let next = Page {
                start: page.start + size,
                exhausted: records.len() < size,
            };

            let batch = stream::iter(records.into_iter().map(Ok::<_, TransportError>));
            Ok(Some((batch, next)))
        })
        .try_flatten()
    }
}
