//! Paginated ontology sync
//!
//! For every configured class and property, rows at or above the stored
//! watermark are pulled page by page in ascending revision order and written
//! with insert-if-absent semantics. No watermark is persisted: the next run
//! derives it again from the committed rows.
//!
//! The watermark revision itself is requested again on every run. Several
//! rows can share one revision (all triples of one subject), and a run that
//! stopped between them must pick up the rest; the rows it already has come
//! back as existing.

use crate::config::{ClassTarget, OntologyConfig, PropertyTarget};
use crate::crawler::fetcher::{with_retries, NetworkError, OntologyEndpoint};
use crate::crawler::sparql::{self, Row};
use crate::storage::{Entity, EntityDetails, EntityKey, EntityStore, NodeRef, Relation, Source};
use crate::{AtlasError, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Class of resources reached through a property whose namespace is not a
/// configured class
const UNTYPED_CLASS_IRI: &str = "http://www.w3.org/2002/07/owl#Thing";

/// What happened to one result row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Inserted,
    Existing,
    Malformed,
}

/// Counters of one synchronised target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSummary {
    pub target: String,
    pub watermark: i64,
    /// Rows at or above the watermark according to the count query
    pub total: u64,
    pub pages: u64,
    pub retrieved: u64,
    pub inserted: u64,
    pub existing: u64,
    pub malformed: u64,
}

/// A synchronised class or property
#[derive(Debug, Clone, Copy)]
pub enum SyncTarget<'a> {
    Class(&'a ClassTarget),
    Property(&'a PropertyTarget),
}

impl SyncTarget<'_> {
    fn name(&self) -> &str {
        match self {
            Self::Class(class) => &class.name,
            Self::Property(property) => &property.name,
        }
    }
}

/// Synchronises configured ontology targets into the store
pub struct OntologySync<S: EntityStore, E: OntologyEndpoint> {
    store: Arc<Mutex<S>>,
    endpoint: E,
    config: OntologyConfig,
}

impl<S: EntityStore, E: OntologyEndpoint> OntologySync<S, E> {
    pub fn new(store: Arc<Mutex<S>>, endpoint: E, config: OntologyConfig) -> Self {
        Self {
            store,
            endpoint,
            config,
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, S>> {
        self.store
            .lock()
            .map_err(|_| AtlasError::Storage("entity store lock poisoned".to_string()))
    }

    /// Synchronises every class, then every property
    ///
    /// A non-transient query failure aborts the run.
    pub async fn run(&self) -> Result<Vec<TargetSummary>> {
        tracing::info!(
            "Starting ontology sync: {} classes, {} properties",
            self.config.classes.len(),
            self.config.properties.len()
        );

        let mut summaries = Vec::new();
        for class in &self.config.classes {
            summaries.push(self.sync(SyncTarget::Class(class)).await?);
        }
        for property in &self.config.properties {
            summaries.push(self.sync(SyncTarget::Property(property)).await?);
        }

        let inserted: u64 = summaries.iter().map(|s| s.inserted).sum();
        tracing::info!("Ontology sync completed: {} new rows", inserted);
        Ok(summaries)
    }

    /// Current watermark of a target: highest stored revision, or 0
    pub fn watermark(&self, target: SyncTarget<'_>) -> Result<i64> {
        let store = self.store()?;
        let max = match target {
            SyncTarget::Class(class) => store.max_entity_revision(Source::Ontology, &class.name)?,
            SyncTarget::Property(property) => {
                store.max_relation_revision(Source::Ontology, &property.name)?
            }
        };
        Ok(max.unwrap_or(0))
    }

    /// Pulls every row of `target` at or above its watermark
    ///
    /// # Pagination
    ///
    /// 1. A count query bounds the loop; a count of zero issues no page request
    /// 2. Pages of `page-size` rows are requested at increasing offsets
    /// 3. The loop stops after a short page or once `total` rows were retrieved
    ///
    /// A page whose retries are exhausted comes back empty and ends the loop.
    pub async fn sync(&self, target: SyncTarget<'_>) -> Result<TargetSummary> {
        let watermark = self.watermark(target)?;
        let mut summary = TargetSummary {
            target: target.name().to_string(),
            watermark,
            ..TargetSummary::default()
        };

        let count_rows = self.request(target, &self.count_query(target, watermark)).await?;
        summary.total = count_rows
            .first()
            .and_then(|row| row.get_i64("count"))
            .map(|count| count.max(0) as u64)
            .unwrap_or(0);

        if summary.total == 0 {
            tracing::info!("{}: nothing at or above revision {}", summary.target, watermark);
            return Ok(summary);
        }

        tracing::info!(
            "{}: {} rows at or above revision {}",
            summary.target,
            summary.total,
            watermark
        );

        let page_size = self.config.page_size.max(1);
        loop {
            let offset = summary.pages * u64::from(page_size);
            let query = self.page_query(target, watermark, page_size, offset);
            let rows = self.request(target, &query).await?;
            summary.pages += 1;
            summary.retrieved += rows.len() as u64;

            for row in &rows {
                match self.write_row(target, row)? {
                    RowOutcome::Inserted => summary.inserted += 1,
                    RowOutcome::Existing => summary.existing += 1,
                    RowOutcome::Malformed => {
                        tracing::warn!("{}: skipping malformed row {:?}", summary.target, row);
                        summary.malformed += 1;
                    }
                }
            }

            if summary.pages % 10 == 0 {
                tracing::info!(
                    "{}: {}/{} rows after {} pages",
                    summary.target,
                    summary.retrieved,
                    summary.total,
                    summary.pages
                );
            }

            if rows.len() < page_size as usize || summary.retrieved >= summary.total {
                break;
            }
        }

        tracing::info!(
            "{}: {} pages, {} inserted, {} already stored",
            summary.target,
            summary.pages,
            summary.inserted,
            summary.existing
        );
        Ok(summary)
    }

    /// Runs one query with retries
    ///
    /// Exhausted transient failures yield an empty result; permanent ones
    /// become `AtlasError::Query`.
    async fn request(&self, target: SyncTarget<'_>, query: &str) -> Result<Vec<Row>> {
        let outcome = with_retries(
            self.config.retry_limit,
            Duration::from_millis(self.config.retry_delay_ms),
            target.name(),
            || self.endpoint.query(query),
        )
        .await;

        match outcome {
            Ok(rows) => Ok(rows),
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    "{}: giving up after {} attempts: {}",
                    target.name(),
                    self.config.retry_limit,
                    e
                );
                Ok(Vec::new())
            }
            Err(e) => Err(query_error(target, e)),
        }
    }

    fn count_query(&self, target: SyncTarget<'_>, watermark: i64) -> String {
        let revision = &self.config.revision_predicate;
        match target {
            SyncTarget::Class(class) => sparql::class_count_query(&class.iri, revision, watermark),
            SyncTarget::Property(property) => {
                sparql::property_count_query(&property.iri, revision, watermark)
            }
        }
    }

    fn page_query(&self, target: SyncTarget<'_>, watermark: i64, limit: u32, offset: u64) -> String {
        let revision = &self.config.revision_predicate;
        let language = &self.config.label_language;
        match target {
            SyncTarget::Class(class) => {
                sparql::class_page_query(&class.iri, revision, language, watermark, limit, offset)
            }
            SyncTarget::Property(property) => sparql::property_page_query(
                &property.iri,
                revision,
                language,
                watermark,
                limit,
                offset,
            ),
        }
    }

    fn write_row(&self, target: SyncTarget<'_>, row: &Row) -> Result<RowOutcome> {
        match target {
            SyncTarget::Class(class) => self.write_class_row(class, row),
            SyncTarget::Property(property) => self.write_property_row(property, row),
        }
    }

    /// `?s ?label ?rev` becomes one resource entity in the class namespace
    fn write_class_row(&self, class: &ClassTarget, row: &Row) -> Result<RowOutcome> {
        let (Some(subject), Some(revision)) = (row.get("s"), row.get_i64("rev")) else {
            return Ok(RowOutcome::Malformed);
        };

        let entity = Entity::new(
            EntityKey::new(Source::Ontology, &class.name, subject),
            row.get("label").unwrap_or(subject),
            EntityDetails::Resource {
                class_iri: class.iri.clone(),
            },
        )
        .with_revision(revision);

        let inserted = self.store()?.insert_entity_if_absent(&entity)?;
        Ok(if inserted {
            RowOutcome::Inserted
        } else {
            RowOutcome::Existing
        })
    }

    /// `?s ?o ?rev` becomes both endpoint entities plus one relation
    ///
    /// Endpoint entities carry no revision so they never move a class
    /// watermark; the relation carries the subject's revision.
    fn write_property_row(&self, property: &PropertyTarget, row: &Row) -> Result<RowOutcome> {
        let (Some(subject), Some(object), Some(revision)) =
            (row.get("s"), row.get("o"), row.get_i64("rev"))
        else {
            return Ok(RowOutcome::Malformed);
        };

        for (namespace, iri, label) in [
            (&property.domain, subject, row.get("slabel")),
            (&property.range, object, row.get("olabel")),
        ] {
            let entity = Entity::new(
                EntityKey::new(Source::Ontology, namespace.as_str(), iri),
                label.unwrap_or(iri),
                EntityDetails::Resource {
                    class_iri: self.class_iri(namespace).to_string(),
                },
            );
            self.store()?.insert_entity_if_absent(&entity)?;
        }

        let relation = Relation {
            source: Source::Ontology,
            predicate: property.name.clone(),
            origin: NodeRef::new(property.domain.as_str(), subject),
            destination: NodeRef::new(property.range.as_str(), object),
            revision: Some(revision),
        };
        let inserted = self.store()?.insert_relation_if_absent(&relation)?;
        Ok(if inserted {
            RowOutcome::Inserted
        } else {
            RowOutcome::Existing
        })
    }

    fn class_iri(&self, namespace: &str) -> &str {
        self.config
            .classes
            .iter()
            .find(|class| class.name == namespace)
            .map(|class| class.iri.as_str())
            .unwrap_or(UNTYPED_CLASS_IRI)
    }
}

fn query_error(target: SyncTarget<'_>, source: NetworkError) -> AtlasError {
    AtlasError::Query {
        target: target.name().to_string(),
        source,
    }
}
