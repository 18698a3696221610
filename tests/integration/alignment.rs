//! Alignment over a file-backed store filled the way both crawlers fill it

use crate::common::temp_store;
use trope_atlas::align::AlignmentEngine;
use trope_atlas::config::{AlignmentConfig, SimilarityMetric};
use trope_atlas::output::{format_statistics, load_statistics};
use trope_atlas::storage::{Entity, EntityDetails, SqliteStore};
use trope_atlas::{EntityKey, EntityStore, Source};

const RESOURCE: &str = "http://dbpedia.org/resource/";

fn fill(store: &mut SqliteStore) {
    for (name, label) in [
        ("Alien", "Alien"),
        ("BladeRunner", "Blade Runner"),
        ("TheThing1982", "The Thing (1982)"),
        ("Tenet", "Tenet"),
    ] {
        let entity = Entity::new(
            EntityKey::new(Source::Wiki, "Film", name),
            label,
            EntityDetails::Work {
                medium: Some("Film".to_string()),
            },
        );
        store.upsert_entity(&entity).unwrap();
    }

    for (rev, name) in ["Alien_(film)", "Blade_Runner", "The_Thing_(1982_film)", "Solaris"]
        .iter()
        .enumerate()
    {
        let iri = format!("{}{}", RESOURCE, name);
        let entity = Entity::new(
            EntityKey::new(Source::Ontology, "Film", iri.as_str()),
            iri.as_str(),
            EntityDetails::Resource {
                class_iri: "http://dbpedia.org/ontology/Film".to_string(),
            },
        )
        .with_revision(rev as i64 + 1);
        store.insert_entity_if_absent(&entity).unwrap();
    }
}

#[test]
fn test_alignment_links_both_sources() {
    let (_dir, _path, store) = temp_store();
    fill(&mut store.lock().unwrap());

    let report = AlignmentEngine::new(store.clone(), AlignmentConfig::default())
        .run()
        .expect("Alignment failed");

    assert_eq!(report.wiki_entities, 4);
    assert_eq!(report.ontology_entities, 4);
    assert_eq!(report.matches.len(), 3);
    assert_eq!(report.failures, 0);
    // three shared works plus Tenet and Solaris on their own
    assert_eq!(report.works_created, 5);
    assert_eq!(report.edges_created, 8);

    let store = store.lock().unwrap();
    let wiki = store
        .find_correspondence(&EntityKey::new(Source::Wiki, "Film", "TheThing1982"))
        .unwrap()
        .expect("wiki side linked");
    let ontology = store
        .find_correspondence(&EntityKey::new(
            Source::Ontology,
            "Film",
            format!("{}The_Thing_(1982_film)", RESOURCE),
        ))
        .unwrap()
        .expect("ontology side linked");
    assert_eq!(wiki.work_id, ontology.work_id);
    assert_eq!(store.correspondences_of(wiki.work_id).unwrap().len(), 2);

    let tenet = store
        .find_correspondence(&EntityKey::new(Source::Wiki, "Film", "Tenet"))
        .unwrap()
        .expect("singleton linked");
    assert_eq!(tenet.confidence, 1.0);
}

#[test]
fn test_realignment_is_idempotent() {
    let (_dir, path, store) = temp_store();
    fill(&mut store.lock().unwrap());
    let config = AlignmentConfig {
        metric: SimilarityMetric::JaroWinkler,
        ..AlignmentConfig::default()
    };

    AlignmentEngine::new(store.clone(), config.clone())
        .run()
        .expect("First alignment failed");
    let before = load_statistics(&*store.lock().unwrap()).unwrap();

    let report = AlignmentEngine::new(store.clone(), config)
        .run()
        .expect("Second alignment failed");
    assert_eq!(report.works_created, 0);
    assert_eq!(report.edges_created, 0);

    let reopened = SqliteStore::new(&path).unwrap();
    let after = load_statistics(&reopened).unwrap();
    assert_eq!(after.works, before.works);
    assert_eq!(after.correspondences, before.correspondences);
    assert!(format_statistics(&after).contains(&format!("  Works: {}", before.works)));
}
