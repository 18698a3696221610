//! End-to-end wiki crawls against a mock site

use crate::common::{temp_store, user_agent};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use trope_atlas::config::WikiConfig;
use trope_atlas::crawler::{HttpFetcher, WikiCrawler, LINKS_TO};
use trope_atlas::storage::{Entity, EntityDetails, NodeRef, SqliteStore};
use trope_atlas::{EntityKey, EntityStore, Source};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLES: &str = "/pmwiki/pmwiki.php";

fn wiki_config(base_url: &str) -> WikiConfig {
    WikiConfig {
        base_url: base_url.to_string(),
        related_url: format!(
            "{}/pmwiki/relatedsearch.php?term={{namespace}}/{{name}}",
            base_url
        ),
        workers: 2,
        retry_limit: 2,
        retry_delay_ms: 0,
        request_delay_ms: 0,
        timeout_secs: 5,
        ..WikiConfig::default()
    }
}

fn crawler(
    server: &MockServer,
    store: Arc<std::sync::Mutex<SqliteStore>>,
) -> WikiCrawler<SqliteStore, HttpFetcher> {
    let fetcher = HttpFetcher::new(&user_agent(), Duration::from_secs(5), Duration::ZERO)
        .expect("Failed to build fetcher");
    WikiCrawler::new(store, Arc::new(fetcher), wiki_config(&server.uri()))
        .expect("Failed to create crawler")
}

fn article_page(title: &str, links: &[&str]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|link| format!(r#"<li><a href="{}/{}">{}</a></li>"#, ARTICLES, link, link))
        .collect();
    ResponseTemplate::new(200)
        .set_body_string(format!(
            r#"<html><head><title>{}</title></head><body>
            <h1 class="entry-title">{}</h1><ul>{}</ul></body></html>"#,
            title, title, anchors
        ))
        .insert_header("content-type", "text/html")
}

async fn mount_article(server: &MockServer, node: &str, title: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", ARTICLES, node)))
        .respond_with(article_page(title, links))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_redirected_seed_records_aliases() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{}/Film/Alien1979", ARTICLES)))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("location", format!("{}/Film/Alien", ARTICLES).as_str()),
        )
        .mount(&server)
        .await;
    mount_article(&server, "Film/Alien", "Alien", &["Creator/RidleyScott"]).await;
    mount_article(&server, "Creator/RidleyScott", "Creator / Ridley Scott", &[]).await;

    Mock::given(method("GET"))
        .and(path("/pmwiki/relatedsearch.php"))
        .and(query_param("term", "Film/Alien"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body><div id="redirects">
            <a href="{0}/Film/AlienFilm">Alien Film</a>
            <a href="{0}/Film/Alien1979">Alien 1979</a>
            </div></body></html>"#,
            ARTICLES
        )))
        .mount(&server)
        .await;

    let (_dir, _path, store) = temp_store();
    let seed = format!("{}{}/Film/Alien1979", server.uri(), ARTICLES);
    let summary = crawler(&server, store.clone())
        .run(vec![seed])
        .await
        .expect("Crawl failed");

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 0);

    let store = store.lock().unwrap();
    let alien = store
        .get_entity(&EntityKey::new(Source::Wiki, "Film", "Alien"))
        .unwrap()
        .expect("canonical entity stored");
    assert_eq!(alien.label, "Alien");
    assert!(alien.last_crawled.is_some());
    assert!(store
        .get_entity(&EntityKey::new(Source::Wiki, "Film", "Alien1979"))
        .unwrap()
        .is_none());

    for alias in ["Alien1979", "AlienFilm"] {
        let redirection = store
            .get_redirection(Source::Wiki, &NodeRef::new("Film", alias))
            .unwrap()
            .expect("alias recorded");
        assert_eq!(redirection.target, NodeRef::new("Film", "Alien"));
    }

    let creator = store
        .get_entity(&EntityKey::new(Source::Wiki, "Creator", "RidleyScott"))
        .unwrap()
        .expect("linked creator crawled");
    assert_eq!(creator.label, "Ridley Scott");
    assert_eq!(creator.details, EntityDetails::Creator);

    let relations = store
        .relations_from(&EntityKey::new(Source::Wiki, "Film", "Alien"))
        .unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].predicate, LINKS_TO);
    assert_eq!(relations[0].destination, NodeRef::new("Creator", "RidleyScott"));
}

#[tokio::test]
async fn test_recently_crawled_article_is_not_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(article_page("Alien", &[]))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, _path, store) = temp_store();
    {
        let mut store = store.lock().unwrap();
        let key = EntityKey::new(Source::Wiki, "Film", "Alien");
        let entity = Entity::new(
            key.clone(),
            "Alien",
            EntityDetails::Work {
                medium: Some("Film".to_string()),
            },
        );
        store.upsert_entity(&entity).unwrap();
        store.mark_crawled(&key, Utc::now()).unwrap();
    }

    let seed = format!("{}{}/Film/Alien", server.uri(), ARTICLES);
    let summary = crawler(&server, store.clone())
        .run(vec![seed])
        .await
        .expect("Crawl failed");

    assert_eq!(summary.fresh, 1);
    assert_eq!(summary.completed, 0);
}

#[tokio::test]
async fn test_missing_and_administrative_pages_write_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Film/NoSuchFilm", ARTICLES)))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not here"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Film/Ghost", ARTICLES)))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body><p>We don't have an article named Film/Ghost, yet.</p></body></html>",
        ))
        .mount(&server)
        .await;
    mount_article(&server, "Administrivia/Rules", "Rules", &["Film/Alien"]).await;

    let (_dir, _path, store) = temp_store();
    let seeds = ["Film/NoSuchFilm", "Film/Ghost", "Administrivia/Rules"]
        .iter()
        .map(|node| format!("{}{}/{}", server.uri(), ARTICLES, node))
        .collect();
    let summary = crawler(&server, store.clone())
        .run(seeds)
        .await
        .expect("Crawl failed");

    assert_eq!(summary.not_found, 2);
    assert_eq!(summary.administrative, 1);

    let store = store.lock().unwrap();
    assert!(store.query_source(Source::Wiki).unwrap().is_empty());
    assert_eq!(store.count_relations(Source::Wiki).unwrap(), 0);
}

#[tokio::test]
async fn test_server_errors_fail_the_visit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Film/Alien", ARTICLES)))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let (_dir, _path, store) = temp_store();
    let seed = format!("{}{}/Film/Alien", server.uri(), ARTICLES);
    let summary = crawler(&server, store.clone())
        .run(vec![seed])
        .await
        .expect("Crawl failed");

    assert_eq!(summary.failed, 1);
    assert!(store.lock().unwrap().query_source(Source::Wiki).unwrap().is_empty());
}

#[tokio::test]
async fn test_stored_locators_seed_the_next_run() {
    let server = MockServer::start().await;
    mount_article(&server, "Film/Alien", "Alien", &[]).await;

    let (_dir, path, store) = temp_store();
    let seed = format!("{}{}/Film/Alien", server.uri(), ARTICLES);
    crawler(&server, store.clone())
        .run(vec![seed.clone()])
        .await
        .expect("Crawl failed");
    drop(store);

    let reopened = Arc::new(std::sync::Mutex::new(SqliteStore::new(&path).unwrap()));
    let seeds = crawler(&server, reopened).seeds(&[]).unwrap();
    assert_eq!(seeds, vec![seed]);
}
