//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawlers, including:
//! - Building HTTP clients with proper user agent strings
//! - Per-host politeness delays
//! - Retry logic for transient failures
//! - Error classification

use crate::config::UserAgentConfig;
use crate::crawler::sparql::Row;
use crate::state::HostState;
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client, StatusCode};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Failure of a single request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("request timed out")]
    Timeout,

    #[error("connection reset")]
    ConnectionReset,

    #[error("HTTP status {0}")]
    HttpError(u16),

    #[error("incomplete read")]
    IncompleteRead,

    #[error("endpoint not found")]
    EndpointNotFound,
}

impl NetworkError {
    /// Returns true if repeating the same request may succeed
    ///
    /// Client errors (4xx) are permanent. A 404 from an endpoint maps to
    /// `EndpointNotFound`, which overloaded SPARQL servers return
    /// intermittently, so it stays transient.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::HttpError(code) if (400..500).contains(code))
    }

    /// Maps an unsuccessful status code
    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::NOT_FOUND {
            Self::EndpointNotFound
        } else {
            Self::HttpError(status.as_u16())
        }
    }

    /// Classifies a client error
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::ConnectionReset
        } else if let Some(status) = error.status() {
            Self::from_status(status)
        } else {
            Self::IncompleteRead
        }
    }
}

/// A fetched page after redirects
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested
    pub requested_url: String,
    /// URL after following redirects
    pub final_url: String,
    /// HTTP status code
    pub status: u16,
    /// Page body
    pub body: String,
}

/// Fetches wiki pages
///
/// A 404 is returned as a page so the caller can classify it; other
/// unsuccessful statuses are errors.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, NetworkError>;
}

/// Runs SPARQL SELECT queries
#[async_trait]
pub trait OntologyEndpoint: Send + Sync {
    async fn query(&self, sparql: &str) -> Result<Vec<Row>, NetworkError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Total request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use trope_atlas::config::UserAgentConfig;
/// use trope_atlas::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "TropeAtlas".to_string(),
///     crawler_version: "0.3".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Raw response of one GET request
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub final_url: String,
    pub status: StatusCode,
    pub body: String,
}

/// reqwest-backed fetcher shared by both crawlers
///
/// Requests to the same host are spaced by at least `request_delay`,
/// however many tasks share the fetcher.
pub struct HttpFetcher {
    client: Client,
    request_delay: Duration,
    hosts: Mutex<HashMap<String, HostState>>,
}

impl HttpFetcher {
    /// Creates a fetcher
    pub fn new(
        user_agent: &UserAgentConfig,
        timeout: Duration,
        request_delay: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, timeout)?,
            request_delay,
            hosts: Mutex::new(HashMap::new()),
        })
    }

    /// Waits until the host of `url` may receive another request
    ///
    /// The slot is reserved under the lock; the sleep happens after it is
    /// released.
    async fn wait_for_host(&self, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };

        let wait = {
            let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
            let state = hosts.entry(host.to_string()).or_insert_with(HostState::new);
            let now = Instant::now();
            let wait = state.time_until_next_request(self.request_delay, now);
            state.record_request(now + wait.unwrap_or_default());
            wait
        };

        if let Some(wait) = wait {
            tracing::trace!("Waiting {:?} before requesting {}", wait, host);
            tokio::time::sleep(wait).await;
        }
    }

    /// Sends a GET request and reads the body whatever the status
    pub(crate) async fn get(&self, url: Url, accept: &str) -> Result<RawResponse, NetworkError> {
        self.wait_for_host(&url).await;

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, accept)
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(&e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| NetworkError::from_reqwest(&e))?;

        Ok(RawResponse {
            final_url,
            status,
            body,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, NetworkError> {
        let parsed = Url::parse(url).map_err(|_| NetworkError::HttpError(400))?;
        let response = self.get(parsed, "text/html").await?;

        if !response.status.is_success() && response.status != StatusCode::NOT_FOUND {
            return Err(NetworkError::from_status(response.status));
        }

        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url: response.final_url,
            status: response.status.as_u16(),
            body: response.body,
        })
    }
}

/// Runs `op` until it succeeds, fails permanently, or `attempts` tries are spent
///
/// Only transient errors are retried, with `delay` between attempts. The
/// last error is returned on exhaustion.
///
/// # Arguments
///
/// * `attempts` - Total number of tries (at least one is made)
/// * `delay` - Pause between tries
/// * `what` - Description used in log lines
/// * `op` - Produces a fresh request future per attempt
pub async fn with_retries<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    what: &str,
    mut op: F,
) -> Result<T, NetworkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NetworkError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::debug!(
                    "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                    attempt,
                    attempts,
                    what,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
