//! Configuration module for Trope-Atlas
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use trope_atlas::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("atlas.toml")).unwrap();
//! println!("Revisit interval: {} days", config.wiki.revisit_interval_days);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    AlignmentConfig, ClassTarget, Config, OntologyConfig, PropertyTarget, SimilarityMetric,
    StoreConfig, UserAgentConfig, WikiConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
