//! Storage traits and error types
//!
//! This module defines the trait interface for entity store backends and
//! associated error types.

use crate::storage::{
    CatalogWork, CorrespondenceEdge, Entity, EntityKey, Job, NodeRef, Redirection, Relation,
    RunRecord, RunStatus, Source, UpsertOutcome,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for entity store implementations
///
/// Every mutating operation is atomic on its own: one upsert, one insert or
/// one stamp per call. Callers never batch several logical writes into one
/// transaction, so a failure midway through a page leaves the writes made so
/// far in place. Duplicate natural keys are never errors; each operation
/// states how it resolves them.
pub trait EntityStore: Send {
    // ===== Entities =====

    /// Gets an entity by natural key
    fn get_entity(&self, key: &EntityKey) -> StorageResult<Option<Entity>>;

    /// Inserts an entity or updates the mutable fields of the existing row
    ///
    /// Label, details and locator are overwritten; the revision keeps the
    /// larger of the stored and the new value; `last_crawled` is untouched.
    fn upsert_entity(&mut self, entity: &Entity) -> StorageResult<UpsertOutcome>;

    /// Inserts an entity unless its key already exists
    ///
    /// Returns true if a row was created.
    fn insert_entity_if_absent(&mut self, entity: &Entity) -> StorageResult<bool>;

    /// Writes the completion stamp of a crawl
    fn mark_crawled(&mut self, key: &EntityKey, at: DateTime<Utc>) -> StorageResult<()>;

    /// Gets all entities of one namespace, ordered by name
    fn query_all(&self, source: Source, namespace: &str) -> StorageResult<Vec<Entity>>;

    /// Gets all entities of one source, ordered by namespace and name
    fn query_source(&self, source: Source) -> StorageResult<Vec<Entity>>;

    /// Highest entity revision stored for a namespace
    fn max_entity_revision(&self, source: Source, namespace: &str) -> StorageResult<Option<i64>>;

    // ===== Relations =====

    /// Inserts a relation; returns false when the same edge already exists
    fn insert_relation_if_absent(&mut self, relation: &Relation) -> StorageResult<bool>;

    /// Gets all relations leaving an entity
    fn relations_from(&self, origin: &EntityKey) -> StorageResult<Vec<Relation>>;

    /// Highest relation revision stored for a predicate
    fn max_relation_revision(&self, source: Source, predicate: &str)
        -> StorageResult<Option<i64>>;

    // ===== Redirections =====

    /// Points an alias at its canonical entity; a newer write replaces the target
    fn upsert_redirection(&mut self, redirection: &Redirection) -> StorageResult<UpsertOutcome>;

    /// Gets the redirection of an alias
    fn get_redirection(&self, source: Source, alias: &NodeRef)
        -> StorageResult<Option<Redirection>>;

    // ===== Catalog =====

    /// Creates a catalog work linked to `links` and returns its ID
    ///
    /// The work and its edges are written in one transaction. If any entity
    /// in `links` is already linked, or a confidence lies outside `[0, 1]`,
    /// nothing is written.
    fn create_work(&mut self, title: &str, links: &[(&EntityKey, f64)]) -> StorageResult<i64>;

    /// Gets a catalog work by ID
    fn get_work(&self, work_id: i64) -> StorageResult<Option<CatalogWork>>;

    /// Gets the correspondence edge of an external entity
    fn find_correspondence(&self, key: &EntityKey) -> StorageResult<Option<CorrespondenceEdge>>;

    /// Inserts an edge unless the external entity is already linked
    fn insert_correspondence_if_absent(
        &mut self,
        edge: &CorrespondenceEdge,
    ) -> StorageResult<bool>;

    /// Moves the existing edge of `edge.external` onto `edge.work_id` with
    /// the new confidence
    ///
    /// A work left without edges by the move is deleted in the same
    /// transaction, and its ID is returned.
    fn relink_correspondence(&mut self, edge: &CorrespondenceEdge) -> StorageResult<Option<i64>>;

    /// Gets all correspondence edges of a work
    fn correspondences_of(&self, work_id: i64) -> StorageResult<Vec<CorrespondenceEdge>>;

    // ===== Run Management =====

    /// Creates a new run for a job
    fn create_run(&mut self, job: Job, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Finishes a run with a terminal status
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Gets the most recent runs, newest first
    fn recent_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>>;

    // ===== Statistics =====

    /// Counts entities per namespace of a source
    fn count_entities_by_namespace(&self, source: Source) -> StorageResult<Vec<(String, u64)>>;

    /// Counts relations of a source
    fn count_relations(&self, source: Source) -> StorageResult<u64>;

    /// Counts redirections of a source
    fn count_redirections(&self, source: Source) -> StorageResult<u64>;

    /// Counts catalog works
    fn count_works(&self) -> StorageResult<u64>;

    /// Counts correspondence edges
    fn count_correspondences(&self) -> StorageResult<u64>;
}
