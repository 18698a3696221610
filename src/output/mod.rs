//! Output module for reporting the contents of the entity store
//!
//! This module handles:
//! - Loading entity, relation and catalog counters from the store
//! - Rendering them together with the latest job runs

pub mod stats;

pub use stats::{format_statistics, load_statistics, print_statistics, AtlasStatistics};
