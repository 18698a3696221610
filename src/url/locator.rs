use crate::storage::NodeRef;
use crate::url::canonical_url;
use crate::{UrlError, UrlResult};
use url::Url;

/// Maps wiki article URLs to `Namespace/Name` keys and back
///
/// An article locator has the shape `<base><article-path><Namespace>/<Name>`.
/// Host comparison ignores case and a `www.` prefix; query strings and
/// fragments are not part of the identity.
#[derive(Debug, Clone)]
pub struct ArticleLocator {
    base: Url,
    article_path: String,
}

impl ArticleLocator {
    /// Creates a locator for a wiki rooted at `base_url`
    ///
    /// `article_path` gets a trailing `/` if it lacks one.
    pub fn new(base_url: &str, article_path: &str) -> UrlResult<Self> {
        let base = canonical_url(base_url)?;
        let mut article_path = article_path.to_string();
        if !article_path.starts_with('/') {
            article_path.insert(0, '/');
        }
        if !article_path.ends_with('/') {
            article_path.push('/');
        }
        Ok(Self { base, article_path })
    }

    /// Returns true if a canonical URL is on the wiki host
    pub fn is_wiki_host(&self, url: &Url) -> bool {
        url.host_str() == self.base.host_str()
            && url.port_or_known_default() == self.base.port_or_known_default()
    }

    /// Derives the entity key named by an article URL
    ///
    /// # Returns
    ///
    /// * `Ok(NodeRef)` - The namespace and page name
    /// * `Err(UrlError::NotAnArticle)` - The URL is off-host or not an article path
    pub fn parse(&self, url_str: &str) -> UrlResult<NodeRef> {
        let url = canonical_url(url_str)?;
        if !self.is_wiki_host(&url) {
            return Err(UrlError::NotAnArticle(url_str.to_string()));
        }

        // The canonical path has no trailing slash, so compare without it
        let prefix = &self.article_path[..self.article_path.len() - 1];
        let rest = url
            .path()
            .strip_prefix(prefix)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| UrlError::NotAnArticle(url_str.to_string()))?;

        let mut parts = rest.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(name), None) if !namespace.is_empty() && !name.is_empty() => {
                Ok(NodeRef::new(namespace, name))
            }
            _ => Err(UrlError::NotAnArticle(url_str.to_string())),
        }
    }

    /// Builds the canonical locator of a key
    pub fn build(&self, node: &NodeRef) -> String {
        format!(
            "{}{}{}/{}",
            self.base.as_str().trim_end_matches('/'),
            self.article_path,
            node.namespace,
            node.name
        )
    }

    /// Canonical form of an article URL
    pub fn canonicalize(&self, url_str: &str) -> UrlResult<String> {
        self.parse(url_str).map(|node| self.build(&node))
    }
}
