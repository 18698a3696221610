//! URL handling module for Trope-Atlas
//!
//! This module provides URL canonicalization and the mapping between wiki
//! article URLs and entity keys.

mod locator;
mod normalize;

pub use locator::ArticleLocator;
pub use normalize::canonical_url;
