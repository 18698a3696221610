//! Wiki page classification
//!
//! This module turns a fetched wiki page into one of:
//! - a not-found page
//! - an administrative page
//! - an article with its title, entity kind and outbound article links
//!
//! It also reads alias links from the "related" page of an article.

use crate::config::WikiConfig;
use crate::crawler::fetcher::FetchedPage;
use crate::storage::{EntityDetails, NodeRef};
use crate::url::ArticleLocator;
use crate::{AtlasError, ConfigError};
use scraper::{Html, Selector};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Structural failures of a page that claimed to be an article
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("page has no article title")]
    MissingTitle,

    #[error("resolved URL is not a wiki article: {0}")]
    NotAnArticle(String),
}

/// A parsed article
#[derive(Debug, Clone, PartialEq)]
pub struct ArticlePage {
    /// Canonical key, from the resolved URL
    pub node: NodeRef,
    pub label: String,
    pub details: EntityDetails,
    /// Distinct article links, in document order, excluding the page itself
    pub links: Vec<NodeRef>,
}

/// Classification of a fetched wiki page
#[derive(Debug, Clone, PartialEq)]
pub enum PageClass {
    NotFound,
    Administrative(NodeRef),
    Article(ArticlePage),
}

/// Page contract of the crawled wiki
pub struct WikiRules {
    locator: ArticleLocator,
    not_found_marker: String,
    administrative: HashSet<String>,
    tropes: HashSet<String>,
    creators: HashSet<String>,
    title_selector: Selector,
    link_selector: Selector,
    alias_selector: Selector,
}

impl WikiRules {
    /// Builds the rules from the wiki configuration
    pub fn from_config(config: &WikiConfig) -> Result<Self, AtlasError> {
        let selector = |css: &str| {
            Selector::parse(css)
                .map_err(|e| ConfigError::InvalidSelector(format!("{}: {:?}", css, e)))
        };

        Ok(Self {
            locator: ArticleLocator::new(&config.base_url, &config.article_path)?,
            not_found_marker: config.not_found_marker.clone(),
            administrative: config.administrative_namespaces.iter().cloned().collect(),
            tropes: config.trope_namespaces.iter().cloned().collect(),
            creators: config.creator_namespaces.iter().cloned().collect(),
            title_selector: selector("h1.entry-title")?,
            link_selector: selector("a[href]")?,
            alias_selector: selector(&config.alias_selector)?,
        })
    }

    pub fn locator(&self) -> &ArticleLocator {
        &self.locator
    }

    /// Entity kind of an article in `namespace`
    pub fn details_for(&self, namespace: &str) -> EntityDetails {
        if self.tropes.contains(namespace) {
            EntityDetails::Trope
        } else if self.creators.contains(namespace) {
            EntityDetails::Creator
        } else {
            EntityDetails::Work {
                medium: Some(namespace.to_string()),
            }
        }
    }

    /// Classifies a fetched page
    ///
    /// # Returns
    ///
    /// * `Ok(PageClass)` - Not found, administrative, or a parsed article
    /// * `Err(ParseError)` - The page resolved off-wiki or has no title
    pub fn classify(&self, page: &FetchedPage) -> Result<PageClass, ParseError> {
        if page.status == 404
            || (!self.not_found_marker.is_empty() && page.body.contains(&self.not_found_marker))
        {
            return Ok(PageClass::NotFound);
        }

        let node = self
            .locator
            .parse(&page.final_url)
            .map_err(|_| ParseError::NotAnArticle(page.final_url.clone()))?;

        if self.administrative.contains(&node.namespace) {
            return Ok(PageClass::Administrative(node));
        }

        let document = Html::parse_document(&page.body);

        let raw_title = document
            .select(&self.title_selector)
            .next()
            .map(|element| collapse_whitespace(&element.text().collect::<String>()))
            .filter(|s| !s.is_empty())
            .ok_or(ParseError::MissingTitle)?;
        let label = strip_namespace_prefix(&raw_title, &node.namespace);

        let base = Url::parse(&page.final_url)
            .map_err(|_| ParseError::NotAnArticle(page.final_url.clone()))?;
        let mut seen = HashSet::new();
        seen.insert(node.clone());
        let links = document
            .select(&self.link_selector)
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| resolve_link(href, &base))
            .filter_map(|url| self.locator.parse(&url).ok())
            .filter(|link| seen.insert(link.clone()))
            .collect();

        Ok(PageClass::Article(ArticlePage {
            details: self.details_for(&node.namespace),
            node,
            label,
            links,
        }))
    }

    /// Reads alias keys from the related page of `canonical`
    ///
    /// Links that are not articles, and the canonical key itself, are dropped.
    pub fn extract_aliases(&self, body: &str, page_url: &str, canonical: &NodeRef) -> Vec<NodeRef> {
        let Ok(base) = Url::parse(page_url) else {
            return Vec::new();
        };

        let document = Html::parse_document(body);
        let mut seen = HashSet::new();
        seen.insert(canonical.clone());

        document
            .select(&self.alias_selector)
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| resolve_link(href, &base))
            .filter_map(|url| self.locator.parse(&url).ok())
            .filter(|alias| seen.insert(alias.clone()))
            .collect()
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drops a leading `"<Namespace> / "` from an article title
///
/// The displayed namespace may contain spaces (`Western Animation` for
/// `WesternAnimation`).
fn strip_namespace_prefix(title: &str, namespace: &str) -> String {
    match title.split_once(" / ") {
        Some((prefix, rest)) if prefix.replace(' ', "").eq_ignore_ascii_case(namespace) => {
            rest.trim().to_string()
        }
        _ => title.to_string(),
    }
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
        Some(absolute_url.to_string())
    } else {
        None
    }
}
