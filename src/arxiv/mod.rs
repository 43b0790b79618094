mod atom;
mod client;
mod pager;
mod query;

pub use atom::{arxiv_id_from_entry, parse_feed, RecordError, ResultRecord};
pub use client::{ArxivClient, Pacer, SearchClient};
pub use pager::PaginatedFetcher;
pub use query::{build_query, FALLBACK_QUERY};
