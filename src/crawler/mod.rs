//! Crawler module for both external sources
//!
//! This module contains the crawling logic, including:
//! - HTTP fetching with retry logic and per-host politeness
//! - Wiki page classification and link extraction
//! - Task queueing and bounded concurrent dispatch
//! - The link-following wiki crawl
//! - The paginated ontology sync over SPARQL

mod fetcher;
mod ontology;
mod parser;
mod queue;
mod sparql;
mod wiki;

pub use fetcher::{
    build_http_client, with_retries, FetchedPage, HttpFetcher, NetworkError, OntologyEndpoint,
    PageFetcher,
};
pub use ontology::{OntologySync, SyncTarget, TargetSummary};
pub use parser::{resolve_link, ArticlePage, PageClass, ParseError, WikiRules};
pub use queue::{ChannelQueue, CrawlTask, DispatchStats, Dispatcher, TaskQueue};
pub use sparql::{parse_results, Row, SparqlEndpoint};
pub use wiki::{CrawlSummary, VisitOutcome, WikiCrawler, LINKS_TO};
