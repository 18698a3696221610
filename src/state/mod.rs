//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `needs_refresh`: the recency gate deciding whether a stored entity is due for a revisit
//! - `VisitState`: the per-locator state machine of the link-following crawler
//! - `HostState`: per-host politeness bookkeeping used by the HTTP fetcher

mod host_state;
mod recency;
mod visit_state;

pub use host_state::HostState;
pub use recency::{needs_refresh, revisit_interval, DEFAULT_REVISIT_DAYS};
pub use visit_state::VisitState;
