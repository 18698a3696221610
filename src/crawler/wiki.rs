//! Link-following wiki crawler
//!
//! Each visit of a locator runs strictly in sequence:
//! 1. Skip when the stored entity is still fresh
//! 2. Fetch and classify the page
//! 3. Upsert the canonical entity and, after a redirect, its aliases
//! 4. Probe every outbound link, record the relation and enqueue the child
//! 5. Stamp the entity as crawled
//!
//! Visits run concurrently under a `Dispatcher`; a failed visit is logged
//! and never aborts the run.

use crate::config::WikiConfig;
use crate::crawler::fetcher::{with_retries, FetchedPage, NetworkError, PageFetcher};
use crate::crawler::parser::{PageClass, WikiRules};
use crate::crawler::queue::{ChannelQueue, CrawlTask, DispatchStats, Dispatcher, TaskQueue};
use crate::state::{needs_refresh, revisit_interval, VisitState};
use crate::storage::{Entity, EntityKey, EntityStore, NodeRef, Redirection, Relation, Source};
use crate::{AtlasError, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Predicate of every wiki relation
pub const LINKS_TO: &str = "links_to";

/// How a single visit ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitOutcome {
    /// The requested entity was crawled recently; nothing was fetched
    Fresh,
    /// Fetch or parse failed; nothing was stamped
    Failed,
    NotFound,
    Administrative,
    /// The canonical entity behind a redirect was crawled recently
    CanonicalFresh,
    /// Children were probed and the entity stamped
    Completed { children: usize },
}

/// Counters of one crawl run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub dispatched: u64,
    pub duplicates: u64,
    pub fresh: u64,
    pub failed: u64,
    pub not_found: u64,
    pub administrative: u64,
    pub completed: u64,
    pub children_enqueued: u64,
}

impl CrawlSummary {
    fn record(&mut self, outcome: &VisitOutcome) {
        match outcome {
            VisitOutcome::Fresh | VisitOutcome::CanonicalFresh => self.fresh += 1,
            VisitOutcome::Failed => self.failed += 1,
            VisitOutcome::NotFound => self.not_found += 1,
            VisitOutcome::Administrative => self.administrative += 1,
            VisitOutcome::Completed { children } => {
                self.completed += 1;
                self.children_enqueued += *children as u64;
            }
        }
    }
}

/// Crawls the wiki by recursive link following
pub struct WikiCrawler<S: EntityStore, F: PageFetcher> {
    store: Arc<Mutex<S>>,
    fetcher: Arc<F>,
    rules: WikiRules,
    config: WikiConfig,
    summary: Mutex<CrawlSummary>,
}

impl<S, F> WikiCrawler<S, F>
where
    S: EntityStore + 'static,
    F: PageFetcher + 'static,
{
    /// Creates a crawler
    ///
    /// # Returns
    ///
    /// * `Ok(WikiCrawler)` - Ready to run
    /// * `Err(AtlasError)` - The base URL or a selector in `config` is invalid
    pub fn new(store: Arc<Mutex<S>>, fetcher: Arc<F>, config: WikiConfig) -> Result<Self> {
        Ok(Self {
            store,
            fetcher,
            rules: WikiRules::from_config(&config)?,
            config,
            summary: Mutex::new(CrawlSummary::default()),
        })
    }

    fn store(&self) -> Result<MutexGuard<'_, S>> {
        self.store
            .lock()
            .map_err(|_| AtlasError::Storage("entity store lock poisoned".to_string()))
    }

    /// Builds the seed list: configured seeds plus every stored wiki locator
    ///
    /// Seeds that are not article URLs are dropped with a warning.
    pub fn seeds(&self, configured: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut seeds = Vec::new();

        for seed in configured {
            match self.rules.locator().canonicalize(seed) {
                Ok(locator) => {
                    if seen.insert(locator.clone()) {
                        seeds.push(locator);
                    }
                }
                Err(e) => tracing::warn!("Ignoring seed {}: {}", seed, e),
            }
        }

        let stored = self.store()?.query_source(Source::Wiki)?;
        for locator in stored.into_iter().filter_map(|entity| entity.locator) {
            if seen.insert(locator.clone()) {
                seeds.push(locator);
            }
        }

        Ok(seeds)
    }

    /// Crawls from `seeds` until no new locator is reachable
    pub async fn run(self, seeds: Vec<String>) -> Result<CrawlSummary> {
        tracing::info!("Starting wiki crawl from {} seeds", seeds.len());
        let start_time = std::time::Instant::now();

        let (queue, rx) = ChannelQueue::channel();
        for seed in seeds {
            queue.enqueue(CrawlTask::new(seed));
        }

        let crawler = Arc::new(self);
        let dispatcher = Dispatcher::new(crawler.config.workers as usize, rx);

        let worker = crawler.clone();
        let stats: DispatchStats = dispatcher
            .run(move |task| {
                let crawler = worker.clone();
                let queue = queue.clone();
                async move {
                    let outcome = crawler.visit(&task.locator, &queue).await;
                    crawler.record(&outcome);
                }
            })
            .await;

        let mut summary = *crawler.summary.lock().unwrap_or_else(|e| e.into_inner());
        summary.dispatched = stats.dispatched;
        summary.duplicates = stats.duplicates;

        tracing::info!(
            "Wiki crawl completed in {:?}: {} visits, {} completed, {} fresh, {} not found, {} administrative, {} failed",
            start_time.elapsed(),
            summary.dispatched,
            summary.completed,
            summary.fresh,
            summary.not_found,
            summary.administrative,
            summary.failed
        );

        Ok(summary)
    }

    fn record(&self, outcome: &VisitOutcome) {
        self.summary
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(outcome);
    }

    /// Visits one locator, enqueueing its children on `queue`
    pub async fn visit(&self, locator: &str, queue: &dyn TaskQueue) -> VisitOutcome {
        match self.try_visit(locator, queue).await {
            Ok(outcome) => {
                tracing::debug!("Visited {}: {:?}", locator, outcome);
                outcome
            }
            Err(e) => {
                tracing::warn!("Visit of {} failed: {}", locator, e);
                VisitOutcome::Failed
            }
        }
    }

    async fn try_visit(&self, locator: &str, queue: &dyn TaskQueue) -> Result<VisitOutcome> {
        let requested = self.rules.locator().parse(locator)?;
        if !self.is_due(&requested.in_source(Source::Wiki))? {
            tracing::trace!("Skipping {}: crawled recently", requested);
            return Ok(VisitOutcome::Fresh);
        }

        let state = VisitState::Unvisited.transition(VisitState::Fetching)?;

        let page = match self.fetch(locator).await {
            Ok(page) => page,
            Err(e) => {
                let error = AtlasError::Network {
                    url: locator.to_string(),
                    source: e,
                };
                tracing::warn!("{}", error);
                state.transition(VisitState::Failed)?;
                return Ok(VisitOutcome::Failed);
            }
        };

        let article = match self.rules.classify(&page) {
            Ok(PageClass::Article(article)) => article,
            Ok(PageClass::NotFound) => {
                tracing::info!("No article at {}", locator);
                state.transition(VisitState::NotFound)?;
                return Ok(VisitOutcome::NotFound);
            }
            Ok(PageClass::Administrative(node)) => {
                tracing::info!("Skipping administrative page {}", node);
                state.transition(VisitState::Administrative)?;
                return Ok(VisitOutcome::Administrative);
            }
            Err(e) => {
                let error = AtlasError::HtmlParse {
                    url: page.final_url.clone(),
                    source: e,
                };
                tracing::warn!("{}", error);
                state.transition(VisitState::Failed)?;
                return Ok(VisitOutcome::Failed);
            }
        };

        let redirected = article.node != requested;
        let mut state = state.transition(if redirected {
            VisitState::Redirected
        } else {
            VisitState::Classified
        })?;

        let canonical = article.node.in_source(Source::Wiki);
        let entity = Entity::new(canonical.clone(), article.label.clone(), article.details.clone())
            .with_locator(self.rules.locator().build(&article.node));
        let outcome = self.store()?.upsert_entity(&entity)?;
        tracing::debug!("{:?} {}", outcome, canonical);

        if redirected {
            self.record_aliases(&requested, &article.node).await?;
            state = state.transition(VisitState::Classified)?;

            if !self.is_due(&canonical)? {
                tracing::trace!("Stopping at {}: crawled recently", canonical);
                return Ok(VisitOutcome::CanonicalFresh);
            }
        }

        let mut children = 0;
        for link in &article.links {
            let Some(child) = self.probe(link).await else {
                continue;
            };
            if child == article.node {
                continue;
            }

            let relation = Relation {
                source: Source::Wiki,
                predicate: LINKS_TO.to_string(),
                origin: article.node.clone(),
                destination: child.clone(),
                revision: None,
            };
            self.store()?.insert_relation_if_absent(&relation)?;

            queue.enqueue(CrawlTask::new(self.rules.locator().build(&child)));
            children += 1;
        }
        let state = state.transition(VisitState::ChildrenEnqueued)?;

        self.store()?.mark_crawled(&canonical, Utc::now())?;
        state.transition(VisitState::Completed)?;

        Ok(VisitOutcome::Completed { children })
    }

    fn is_due(&self, key: &EntityKey) -> Result<bool> {
        let last_crawled = self.store()?.get_entity(key)?.and_then(|e| e.last_crawled);
        Ok(needs_refresh(
            last_crawled,
            Utc::now(),
            revisit_interval(self.config.revisit_interval_days),
        ))
    }

    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, NetworkError> {
        with_retries(
            self.config.retry_limit,
            Duration::from_millis(self.config.retry_delay_ms),
            url,
            || self.fetcher.fetch(url),
        )
        .await
    }

    /// Fetches and classifies a child without persisting anything
    ///
    /// Returns the child's canonical key when it is a live article.
    async fn probe(&self, child: &NodeRef) -> Option<NodeRef> {
        let url = self.rules.locator().build(child);
        let page = match self.fetch(&url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::debug!("Skipping link {}: {}", child, e);
                return None;
            }
        };

        match self.rules.classify(&page) {
            Ok(PageClass::Article(article)) => Some(article.node),
            Ok(PageClass::NotFound) | Ok(PageClass::Administrative(_)) => {
                tracing::trace!("Skipping link {}: not an article", child);
                None
            }
            Err(e) => {
                tracing::debug!("Skipping link {}: {}", child, e);
                None
            }
        }
    }

    /// Points the requested key and every listed alias at `canonical`
    ///
    /// A failed alias lookup is logged; the requested key is recorded anyway.
    async fn record_aliases(&self, requested: &NodeRef, canonical: &NodeRef) -> Result<()> {
        let mut aliases = vec![requested.clone()];

        let related_url = self
            .config
            .related_url
            .replace("{namespace}", &canonical.namespace)
            .replace("{name}", &canonical.name);

        match self.fetch(&related_url).await {
            Ok(page) if page.status == 200 => {
                let listed = self
                    .rules
                    .extract_aliases(&page.body, &page.final_url, canonical);
                aliases.extend(listed.into_iter().filter(|alias| alias != requested));
            }
            Ok(page) => {
                tracing::warn!("Alias lookup for {} returned HTTP {}", canonical, page.status)
            }
            Err(e) => tracing::warn!("Alias lookup for {} failed: {}", canonical, e),
        }

        for alias in aliases {
            let redirection = Redirection {
                source: Source::Wiki,
                alias,
                target: canonical.clone(),
            };
            self.store()?.upsert_redirection(&redirection)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;

    const WIKI: &str = "https://tvtropes.org/pmwiki/pmwiki.php/";

    /// In-memory wiki: URL to page, with optional redirects
    #[derive(Default)]
    struct FakeWiki {
        pages: HashMap<String, (String, u16, String)>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeWiki {
        fn article(mut self, path: &str, title: &str, links: &[&str]) -> Self {
            let anchors: String = links
                .iter()
                .map(|l| format!(r#"<a href="/pmwiki/pmwiki.php/{}">x</a>"#, l))
                .collect();
            let body = format!(
                r#"<html><body><h1 class="entry-title">{}</h1>{}</body></html>"#,
                title, anchors
            );
            let url = format!("{}{}", WIKI, path);
            self.pages.insert(url.clone(), (url, 200, body));
            self
        }

        fn redirect(mut self, from: &str, to: &str) -> Self {
            let target = format!("{}{}", WIKI, to);
            let page = self.pages.get(&target).cloned().expect("redirect target");
            self.pages.insert(format!("{}{}", WIKI, from), page);
            self
        }

        fn raw(mut self, url: &str, status: u16, body: &str) -> Self {
            self.pages
                .insert(url.to_string(), (url.to_string(), status, body.to_string()));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeWiki {
        async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, NetworkError> {
            self.calls.lock().unwrap().push(url.to_string());
            let (final_url, status, body) = self
                .pages
                .get(url)
                .cloned()
                .ok_or(NetworkError::ConnectionReset)?;
            Ok(FetchedPage {
                requested_url: url.to_string(),
                final_url,
                status,
                body,
            })
        }
    }

    /// Records enqueued locators
    #[derive(Default)]
    struct RecordingQueue(Mutex<Vec<String>>);

    impl TaskQueue for RecordingQueue {
        fn enqueue(&self, task: CrawlTask) {
            self.0.lock().unwrap().push(task.locator);
        }
    }

    fn crawler(
        wiki: FakeWiki,
    ) -> (
        WikiCrawler<SqliteStore, FakeWiki>,
        Arc<Mutex<SqliteStore>>,
        Arc<FakeWiki>,
    ) {
        let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
        let fetcher = Arc::new(wiki);
        let config = WikiConfig {
            retry_delay_ms: 0,
            ..WikiConfig::default()
        };
        let crawler = WikiCrawler::new(store.clone(), fetcher.clone(), config).unwrap();
        (crawler, store, fetcher)
    }

    fn key(ns: &str, name: &str) -> EntityKey {
        EntityKey::new(Source::Wiki, ns, name)
    }

    #[tokio::test]
    async fn test_visit_records_article_links_and_stamp() {
        let wiki = FakeWiki::default()
            .article("Film/Alien", "Film / Alien", &["Main/ChestBurster", "Main/Missing"])
            .article("Main/ChestBurster", "Chest Burster", &[]);
        let (crawler, store, _) = crawler(wiki);
        let queue = RecordingQueue::default();

        let outcome = crawler.visit(&format!("{}Film/Alien", WIKI), &queue).await;
        assert_eq!(outcome, VisitOutcome::Completed { children: 1 });

        let store = store.lock().unwrap();
        let alien = store.get_entity(&key("Film", "Alien")).unwrap().unwrap();
        assert_eq!(alien.label, "Alien");
        assert!(alien.last_crawled.is_some());

        let relations = store.relations_from(&key("Film", "Alien")).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].destination, NodeRef::new("Main", "ChestBurster"));

        // Probing persists nothing
        assert!(store.get_entity(&key("Main", "ChestBurster")).unwrap().is_none());
        assert_eq!(
            *queue.0.lock().unwrap(),
            vec![format!("{}Main/ChestBurster", WIKI)]
        );
    }

    #[tokio::test]
    async fn test_fresh_entity_is_not_fetched() {
        let wiki = FakeWiki::default().article("Film/Alien", "Alien", &[]);
        let (crawler, store, fetcher) = crawler(wiki);
        {
            let mut store = store.lock().unwrap();
            let entity = Entity::new(
                key("Film", "Alien"),
                "Alien",
                crate::storage::EntityDetails::Work { medium: None },
            );
            store.upsert_entity(&entity).unwrap();
            store
                .mark_crawled(&entity.key, Utc::now() - ChronoDuration::days(1))
                .unwrap();
        }

        let outcome = crawler
            .visit(&format!("{}Film/Alien", WIKI), &RecordingQueue::default())
            .await;

        assert_eq!(outcome, VisitOutcome::Fresh);
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_records_aliases_not_entities() {
        let related = "https://tvtropes.org/pmwiki/relatedsearch.php?term=Film/Alien";
        let wiki = FakeWiki::default()
            .article("Film/Alien", "Alien", &[])
            .redirect("Film/AlienMovie", "Film/Alien")
            .raw(
                related,
                200,
                r#"<div id="redirects"><a href="/pmwiki/pmwiki.php/Film/Alien1979">x</a></div>"#,
            );
        let (crawler, store, _) = crawler(wiki);

        let outcome = crawler
            .visit(&format!("{}Film/AlienMovie", WIKI), &RecordingQueue::default())
            .await;
        assert_eq!(outcome, VisitOutcome::Completed { children: 0 });

        let store = store.lock().unwrap();
        assert!(store.get_entity(&key("Film", "AlienMovie")).unwrap().is_none());
        assert!(store.get_entity(&key("Film", "Alien")).unwrap().is_some());
        for alias in ["AlienMovie", "Alien1979"] {
            let redirection = store
                .get_redirection(Source::Wiki, &NodeRef::new("Film", alias))
                .unwrap()
                .unwrap();
            assert_eq!(redirection.target, NodeRef::new("Film", "Alien"));
        }
        assert_eq!(store.count_redirections(Source::Wiki).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_alias_lookup_failure_keeps_requested_alias() {
        let wiki = FakeWiki::default()
            .article("Film/Alien", "Alien", &[])
            .redirect("Film/AlienMovie", "Film/Alien");
        let (crawler, store, _) = crawler(wiki);

        let outcome = crawler
            .visit(&format!("{}Film/AlienMovie", WIKI), &RecordingQueue::default())
            .await;
        assert_eq!(outcome, VisitOutcome::Completed { children: 0 });
        assert_eq!(
            store.lock().unwrap().count_redirections(Source::Wiki).unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_skipped_pages_write_nothing() {
        let wiki = FakeWiki::default()
            .raw(&format!("{}Film/Gone", WIKI), 404, "")
            .raw(
                &format!("{}Administrivia/Rules", WIKI),
                200,
                r#"<h1 class="entry-title">Rules</h1>"#,
            );
        let (crawler, store, _) = crawler(wiki);
        let queue = RecordingQueue::default();

        assert_eq!(
            crawler.visit(&format!("{}Film/Gone", WIKI), &queue).await,
            VisitOutcome::NotFound
        );
        assert_eq!(
            crawler
                .visit(&format!("{}Administrivia/Rules", WIKI), &queue)
                .await,
            VisitOutcome::Administrative
        );
        assert!(store.lock().unwrap().query_source(Source::Wiki).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_retried_then_abandoned() {
        let (crawler, store, fetcher) = crawler(FakeWiki::default());

        let outcome = crawler
            .visit(&format!("{}Film/Alien", WIKI), &RecordingQueue::default())
            .await;

        assert_eq!(outcome, VisitOutcome::Failed);
        assert_eq!(fetcher.calls().len(), 3);
        assert!(store.lock().unwrap().query_source(Source::Wiki).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_title_is_failure() {
        let wiki = FakeWiki::default().raw(&format!("{}Film/Alien", WIKI), 200, "<p>x</p>");
        let (crawler, _, _) = crawler(wiki);
        let outcome = crawler
            .visit(&format!("{}Film/Alien", WIKI), &RecordingQueue::default())
            .await;
        assert_eq!(outcome, VisitOutcome::Failed);
    }

    #[tokio::test]
    async fn test_run_reaches_linked_articles() {
        let wiki = FakeWiki::default()
            .article("Film/Alien", "Alien", &["Film/Aliens"])
            .article("Film/Aliens", "Aliens", &["Film/Alien"]);
        let (crawler, store, _) = crawler(wiki);

        let seeds = crawler.seeds(&[format!("{}Film/Alien", WIKI)]).unwrap();
        let summary = crawler.run(seeds).await.unwrap();

        assert_eq!(summary.completed, 2);
        let store = store.lock().unwrap();
        assert_eq!(store.count_relations(Source::Wiki).unwrap(), 2);
        assert!(store
            .get_entity(&key("Film", "Aliens"))
            .unwrap()
            .unwrap()
            .last_crawled
            .is_some());
    }

    #[tokio::test]
    async fn test_seeds_include_stored_locators() {
        let (crawler, store, _) = crawler(FakeWiki::default());
        {
            let entity = Entity::new(
                key("Film", "Aliens"),
                "Aliens",
                crate::storage::EntityDetails::Work { medium: None },
            )
            .with_locator(format!("{}Film/Aliens", WIKI));
            store.lock().unwrap().upsert_entity(&entity).unwrap();
        }

        let seeds = crawler
            .seeds(&[
                format!("{}Film/Alien", WIKI),
                "https://www.tvtropes.org/pmwiki/pmwiki.php/Film/Aliens".to_string(),
                "https://example.com/".to_string(),
            ])
            .unwrap();

        assert_eq!(
            seeds,
            vec![format!("{}Film/Alien", WIKI), format!("{}Film/Aliens", WIKI)]
        );
    }
}
