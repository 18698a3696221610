//! Paginated ontology sync against a mock SPARQL endpoint

use crate::common::{temp_store, user_agent};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use trope_atlas::config::{ClassTarget, OntologyConfig, PropertyTarget};
use trope_atlas::crawler::{HttpFetcher, OntologySync, SparqlEndpoint};
use trope_atlas::storage::{NodeRef, SqliteStore};
use trope_atlas::{AtlasError, EntityKey, EntityStore, Source};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const FILM: &str = "http://dbpedia.org/ontology/Film";
const DIRECTOR: &str = "http://dbpedia.org/ontology/director";

fn number_after(text: &str, marker: &str) -> i64 {
    text.split(marker)
        .nth(1)
        .and_then(|rest| {
            rest.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .ok()
        })
        .unwrap_or(0)
}

fn sparql_query(request: &Request) -> String {
    request
        .url
        .query_pairs()
        .find(|(key, _)| key == "query")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

fn results(bindings: Vec<serde_json::Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "head": {"vars": []},
        "results": {"bindings": bindings}
    }))
}

fn literal(value: impl ToString) -> serde_json::Value {
    json!({"type": "literal", "value": value.to_string()})
}

/// Serves `films` Film resources with revisions 1..=films, and one director
/// triple per film
fn endpoint(films: i64) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
    move |request: &Request| {
        let query = sparql_query(request);
        let first = number_after(&query, "FILTER(?rev >= ").max(1);
        let matching = (films - first + 1).max(0);

        if query.contains("COUNT") {
            return results(vec![json!({ "count": literal(matching) })]);
        }

        let limit = number_after(&query, "LIMIT ");
        let offset = number_after(&query, "OFFSET ");
        let revisions = (first + offset..=films).take(limit as usize);
        let rows = if query.contains(DIRECTOR) {
            revisions
                .map(|rev| {
                    json!({
                        "s": {"type": "uri", "value": format!("http://dbpedia.org/resource/Film_{}", rev)},
                        "o": {"type": "uri", "value": format!("http://dbpedia.org/resource/Director_{}", rev % 3)},
                        "rev": literal(rev),
                    })
                })
                .collect()
        } else {
            revisions
                .map(|rev| {
                    json!({
                        "s": {"type": "uri", "value": format!("http://dbpedia.org/resource/Film_{}", rev)},
                        "label": {"type": "literal", "xml:lang": "en", "value": format!("Film {}", rev)},
                        "rev": literal(rev),
                    })
                })
                .collect()
        };
        results(rows)
    }
}

fn config(server: &MockServer, retry_limit: u32) -> OntologyConfig {
    OntologyConfig {
        endpoint: format!("{}/sparql", server.uri()),
        retry_limit,
        retry_delay_ms: 0,
        timeout_secs: 5,
        classes: vec![ClassTarget {
            name: "Film".to_string(),
            iri: FILM.to_string(),
        }],
        ..OntologyConfig::default()
    }
}

fn sync(
    server: &MockServer,
    store: Arc<std::sync::Mutex<SqliteStore>>,
    config: OntologyConfig,
) -> OntologySync<SqliteStore, SparqlEndpoint> {
    let http = HttpFetcher::new(&user_agent(), Duration::from_secs(5), Duration::ZERO)
        .expect("Failed to build fetcher");
    let endpoint = SparqlEndpoint::new(Arc::new(http), &format!("{}/sparql", server.uri()))
        .expect("Invalid endpoint");
    OntologySync::new(store, endpoint, config)
}

async fn page_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| sparql_query(request).contains("OFFSET"))
        .count()
}

#[tokio::test]
async fn test_pages_until_all_rows_are_stored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sparql"))
        .respond_with(endpoint(250))
        .mount(&server)
        .await;

    let (_dir, _path, store) = temp_store();
    let summaries = sync(&server, store.clone(), config(&server, 3))
        .run()
        .await
        .expect("Sync failed");

    assert_eq!(page_requests(&server).await, 3);
    assert_eq!(summaries[0].total, 250);
    assert_eq!(summaries[0].inserted, 250);

    let store = store.lock().unwrap();
    assert_eq!(store.query_all(Source::Ontology, "Film").unwrap().len(), 250);
    let film = store
        .get_entity(&EntityKey::new(
            Source::Ontology,
            "Film",
            "http://dbpedia.org/resource/Film_42",
        ))
        .unwrap()
        .expect("row stored");
    assert_eq!(film.label, "Film 42");
    assert_eq!(film.revision, Some(42));
}

#[tokio::test]
async fn test_second_run_refetches_only_the_watermark() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sparql"))
        .respond_with(endpoint(100))
        .mount(&server)
        .await;

    let (_dir, _path, store) = temp_store();
    let sync = sync(&server, store.clone(), config(&server, 3));
    sync.run().await.expect("First sync failed");
    let summaries = sync.run().await.expect("Second sync failed");

    assert_eq!(summaries[0].watermark, 100);
    assert_eq!(summaries[0].pages, 1);
    assert_eq!(summaries[0].inserted, 0);
    assert_eq!(summaries[0].existing, 1);
    assert_eq!(page_requests(&server).await, 2);
}

#[tokio::test]
async fn test_property_rows_become_relations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sparql"))
        .respond_with(endpoint(6))
        .mount(&server)
        .await;

    let mut config = config(&server, 3);
    config.properties = vec![PropertyTarget {
        name: "director".to_string(),
        iri: DIRECTOR.to_string(),
        domain: "Film".to_string(),
        range: "Person".to_string(),
    }];

    let (_dir, _path, store) = temp_store();
    let summaries = sync(&server, store.clone(), config)
        .run()
        .await
        .expect("Sync failed");

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[1].inserted, 6);

    let store = store.lock().unwrap();
    assert_eq!(store.count_relations(Source::Ontology).unwrap(), 6);
    assert_eq!(store.query_all(Source::Ontology, "Person").unwrap().len(), 3);
    assert_eq!(
        store.max_relation_revision(Source::Ontology, "director").unwrap(),
        Some(6)
    );
    let relations = store
        .relations_from(&EntityKey::new(
            Source::Ontology,
            "Film",
            "http://dbpedia.org/resource/Film_4",
        ))
        .unwrap();
    assert_eq!(
        relations[0].destination,
        NodeRef::new("Person", "http://dbpedia.org/resource/Director_1")
    );
}

#[tokio::test]
async fn test_unavailable_endpoint_is_retried_then_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sparql"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let (_dir, _path, store) = temp_store();
    let summaries = sync(&server, store.clone(), config(&server, 4))
        .run()
        .await
        .expect("Exhausted retries are not an error");

    assert_eq!(summaries[0].total, 0);
    assert_eq!(summaries[0].inserted, 0);
    assert!(store
        .lock()
        .unwrap()
        .query_all(Source::Ontology, "Film")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_rejected_query_aborts_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sparql"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Parse error"))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, _path, store) = temp_store();
    let error = sync(&server, store, config(&server, 4))
        .run()
        .await
        .expect_err("A 400 is permanent");

    assert!(matches!(error, AtlasError::Query { ref target, .. } if target == "Film"));
}
