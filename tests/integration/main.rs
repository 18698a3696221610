//! Integration tests for the crawlers and the alignment pass
//!
//! The wiki site and the SPARQL endpoint are served by wiremock; stores are
//! SQLite databases in temporary directories.

mod alignment;
mod common;
mod ontology_sync;
mod wiki_crawl;
