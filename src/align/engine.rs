//! Alignment of wiki and ontology works against the internal catalog

use crate::align::matcher::{candidate_pairs, keyed, select_matches, KeyedEntity};
use crate::align::similarity::{similarity_for, Similarity};
use crate::config::AlignmentConfig;
use crate::storage::{CorrespondenceEdge, Entity, EntityKey, EntityStore, Source};
use crate::{AtlasError, Result};
use std::sync::{Arc, Mutex, MutexGuard};

/// One accepted wiki/ontology match
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub wiki: EntityKey,
    pub ontology: EntityKey,
    pub confidence: f64,
}

/// Counters of one alignment pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentReport {
    pub wiki_entities: usize,
    pub ontology_entities: usize,
    pub candidates: usize,
    pub matches: Vec<AlignedPair>,
    pub works_created: u64,
    pub edges_created: u64,
    /// Existing edges moved onto the work of their new match
    pub edges_moved: u64,
    /// Works deleted because a move left them without edges
    pub works_dropped: u64,
    pub failures: u64,
}

/// Store writes made while linking one pair
#[derive(Debug, Default)]
struct PairWrites {
    works_created: u64,
    edges_created: u64,
    edges_moved: u64,
    works_dropped: u64,
}

/// Links external entities to catalog works by label similarity
pub struct AlignmentEngine<S: EntityStore> {
    store: Arc<Mutex<S>>,
    config: AlignmentConfig,
    similarity: Box<dyn Similarity>,
}

impl<S: EntityStore> AlignmentEngine<S> {
    pub fn new(store: Arc<Mutex<S>>, config: AlignmentConfig) -> Self {
        let similarity = similarity_for(config.metric);
        Self {
            store,
            config,
            similarity,
        }
    }

    /// Replaces the configured similarity measure
    pub fn with_similarity(mut self, similarity: Box<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    fn store(&self) -> Result<MutexGuard<'_, S>> {
        self.store
            .lock()
            .map_err(|_| AtlasError::Storage("entity store lock poisoned".to_string()))
    }

    /// Runs one alignment pass
    ///
    /// Loading the entity lists is the only step that aborts the pass; a
    /// failed write for one pair or singleton is logged and counted.
    pub fn run(&self) -> Result<AlignmentReport> {
        let wiki = self.load(Source::Wiki, &self.config.wiki_namespaces)?;
        let ontology = self.load(Source::Ontology, &self.config.ontology_namespaces)?;
        tracing::info!(
            "Aligning {} wiki and {} ontology entities (threshold {})",
            wiki.len(),
            ontology.len(),
            self.config.threshold
        );

        let candidates = candidate_pairs(&wiki, &ontology, self.similarity.as_ref());
        let selected = select_matches(&candidates, self.config.threshold);

        let mut report = AlignmentReport {
            wiki_entities: wiki.len(),
            ontology_entities: ontology.len(),
            candidates: candidates.len(),
            ..AlignmentReport::default()
        };

        let mut wiki_matched = vec![false; wiki.len()];
        let mut ontology_matched = vec![false; ontology.len()];

        for pair in &selected {
            wiki_matched[pair.left] = true;
            ontology_matched[pair.right] = true;
            let (left, right) = (&wiki[pair.left].entity, &ontology[pair.right].entity);

            match self.materialize_pair(left, right, pair.score) {
                Ok(writes) => {
                    report.works_created += writes.works_created;
                    report.edges_created += writes.edges_created;
                    report.edges_moved += writes.edges_moved;
                    report.works_dropped += writes.works_dropped;
                }
                Err(e) => {
                    tracing::warn!("Failed to link {} and {}: {}", left.key, right.key, e);
                    report.failures += 1;
                }
            }
            report.matches.push(AlignedPair {
                wiki: left.key.clone(),
                ontology: right.key.clone(),
                confidence: pair.score,
            });
        }

        let leftovers =
            unmatched(&wiki, &wiki_matched).chain(unmatched(&ontology, &ontology_matched));
        for entity in leftovers {
            match self.materialize_singleton(entity) {
                Ok(true) => {
                    report.works_created += 1;
                    report.edges_created += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Failed to catalog {}: {}", entity.key, e);
                    report.failures += 1;
                }
            }
        }

        tracing::info!(
            "Alignment completed: {} matches, {} new works, {} new edges, {} moved, {} failures",
            report.matches.len(),
            report.works_created,
            report.edges_created,
            report.edges_moved,
            report.failures
        );
        Ok(report)
    }

    fn load(&self, source: Source, namespaces: &[String]) -> Result<Vec<KeyedEntity>> {
        let mut entities = Vec::new();
        for namespace in namespaces {
            entities.extend(self.store()?.query_all(source, namespace)?);
        }
        Ok(keyed(entities, &self.config.resource_prefix))
    }

    /// Links both sides of a match to one work
    ///
    /// With no edge on either side, the work and both edges are created in
    /// one store call. Otherwise the wiki side's work is kept, or the
    /// ontology side's when only it is linked. An edge on another work is
    /// moved onto the kept one, and that work is dropped once empty. Existing
    /// edges take the pair's score.
    fn materialize_pair(&self, wiki: &Entity, ontology: &Entity, score: f64) -> Result<PairWrites> {
        let mut store = self.store()?;
        let wiki_edge = store.find_correspondence(&wiki.key)?;
        let ontology_edge = store.find_correspondence(&ontology.key)?;

        let kept = wiki_edge
            .as_ref()
            .or(ontology_edge.as_ref())
            .map(|edge| edge.work_id);
        let Some(work_id) = kept else {
            let links = [(&wiki.key, score), (&ontology.key, score)];
            let work_id = store.create_work(&wiki.label, &links)?;
            tracing::debug!(
                "Linked {} and {} to new work {} ({:.3})",
                wiki.key,
                ontology.key,
                work_id,
                score
            );
            return Ok(PairWrites {
                works_created: 1,
                edges_created: 2,
                ..PairWrites::default()
            });
        };

        let mut writes = PairWrites::default();
        for (key, current) in [(&wiki.key, wiki_edge), (&ontology.key, ontology_edge)] {
            let edge = CorrespondenceEdge {
                work_id,
                external: key.clone(),
                confidence: score,
            };
            match current {
                None => {
                    if store.insert_correspondence_if_absent(&edge)? {
                        tracing::debug!("Linked {} to work {} ({:.3})", key, work_id, score);
                        writes.edges_created += 1;
                    }
                }
                Some(current) if current.work_id == work_id && current.confidence == score => {}
                Some(current) => {
                    if let Some(dropped) = store.relink_correspondence(&edge)? {
                        tracing::debug!("Dropped work {} after moving {}", dropped, key);
                        writes.works_dropped += 1;
                    }
                    if current.work_id != work_id {
                        tracing::debug!(
                            "Moved {} from work {} to {}",
                            key,
                            current.work_id,
                            work_id
                        );
                        writes.edges_moved += 1;
                    }
                }
            }
        }
        Ok(writes)
    }

    /// Gives an unlinked entity its own work; returns false if already linked
    fn materialize_singleton(&self, entity: &Entity) -> Result<bool> {
        let mut store = self.store()?;
        if store.find_correspondence(&entity.key)?.is_some() {
            return Ok(false);
        }

        store.create_work(&entity.label, &[(&entity.key, 1.0)])?;
        Ok(true)
    }
}

fn unmatched<'a>(
    entities: &'a [KeyedEntity],
    matched: &'a [bool],
) -> impl Iterator<Item = &'a Entity> + 'a {
    entities
        .iter()
        .zip(matched)
        .filter(|(_, matched)| !**matched)
        .map(|(keyed, _)| &keyed.entity)
}
