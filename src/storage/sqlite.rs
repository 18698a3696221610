//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the EntityStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{EntityStore, StorageError, StorageResult};
use crate::storage::{
    CatalogWork, CorrespondenceEdge, Entity, EntityDetails, EntityKey, Job, NodeRef, Redirection,
    Relation, RunRecord, RunStatus, Source, UpsertOutcome,
};
use crate::AtlasError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const ENTITY_COLUMNS: &str = "source, namespace, name, label, details, revision, locator, last_crawled";

const RUN_COLUMNS: &str = "id, job, started_at, finished_at, config_hash, status";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(AtlasError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, AtlasError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, AtlasError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn corrupt(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        Box::new(StorageError::Corrupt(message)),
    )
}

fn parse_source(column: usize, value: &str) -> rusqlite::Result<Source> {
    Source::from_db_string(value).ok_or_else(|| corrupt(column, format!("unknown source '{}'", value)))
}

fn parse_timestamp(column: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            s.parse::<DateTime<Utc>>()
                .map_err(|e| corrupt(column, format!("bad timestamp '{}': {}", s, e)))
        })
        .transpose()
}

fn check_confidence(key: &EntityKey, confidence: f64) -> StorageResult<()> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(StorageError::Corrupt(format!(
            "confidence {} outside [0, 1] for {}",
            confidence, key
        )))
    }
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let source = parse_source(0, &row.get::<_, String>(0)?)?;
    let details_json: String = row.get(4)?;
    let details: EntityDetails = serde_json::from_str(&details_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Entity {
        key: EntityKey {
            source,
            namespace: row.get(1)?,
            name: row.get(2)?,
        },
        label: row.get(3)?,
        details,
        revision: row.get(5)?,
        locator: row.get(6)?,
        last_crawled: parse_timestamp(7, row.get(7)?)?,
    })
}

fn relation_from_row(row: &Row<'_>) -> rusqlite::Result<Relation> {
    Ok(Relation {
        source: parse_source(0, &row.get::<_, String>(0)?)?,
        predicate: row.get(1)?,
        origin: NodeRef::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
        destination: NodeRef::new(row.get::<_, String>(4)?, row.get::<_, String>(5)?),
        revision: row.get(6)?,
    })
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<CorrespondenceEdge> {
    Ok(CorrespondenceEdge {
        work_id: row.get(0)?,
        external: EntityKey {
            source: parse_source(1, &row.get::<_, String>(1)?)?,
            namespace: row.get(2)?,
            name: row.get(3)?,
        },
        confidence: row.get(4)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let job: String = row.get(1)?;
    let status: String = row.get(5)?;
    Ok(RunRecord {
        id: row.get(0)?,
        job: Job::from_db_string(&job).ok_or_else(|| corrupt(1, format!("unknown job '{}'", job)))?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&status).unwrap_or(RunStatus::Failed),
    })
}

impl EntityStore for SqliteStore {
    // ===== Entities =====

    fn get_entity(&self, key: &EntityKey) -> StorageResult<Option<Entity>> {
        let sql = format!(
            "SELECT {} FROM entities WHERE source = ?1 AND namespace = ?2 AND name = ?3",
            ENTITY_COLUMNS
        );
        let entity = self
            .conn
            .query_row(
                &sql,
                params![key.source.to_db_string(), key.namespace, key.name],
                entity_from_row,
            )
            .optional()?;
        Ok(entity)
    }

    fn upsert_entity(&mut self, entity: &Entity) -> StorageResult<UpsertOutcome> {
        let details = serde_json::to_string(&entity.details)?;
        let key = &entity.key;
        let tx = self.conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM entities WHERE source = ?1 AND namespace = ?2 AND name = ?3",
                params![key.source.to_db_string(), key.namespace, key.name],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE entities SET label = ?1, kind = ?2, details = ?3,
                     locator = COALESCE(?4, locator),
                     revision = CASE
                         WHEN revision IS NULL THEN ?5
                         WHEN ?5 IS NULL THEN revision
                         ELSE MAX(revision, ?5)
                     END
                     WHERE id = ?6",
                    params![
                        entity.label,
                        entity.details.kind(),
                        details,
                        entity.locator,
                        entity.revision,
                        id
                    ],
                )?;
                UpsertOutcome::Updated
            }
            None => {
                tx.execute(
                    "INSERT INTO entities
                     (source, namespace, name, label, kind, details, revision, locator, last_crawled, first_seen)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        key.source.to_db_string(),
                        key.namespace,
                        key.name,
                        entity.label,
                        entity.details.kind(),
                        details,
                        entity.revision,
                        entity.locator,
                        entity.last_crawled.map(|t| t.to_rfc3339()),
                        Utc::now().to_rfc3339()
                    ],
                )?;
                UpsertOutcome::Created
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn insert_entity_if_absent(&mut self, entity: &Entity) -> StorageResult<bool> {
        let details = serde_json::to_string(&entity.details)?;
        let key = &entity.key;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO entities
             (source, namespace, name, label, kind, details, revision, locator, last_crawled, first_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                key.source.to_db_string(),
                key.namespace,
                key.name,
                entity.label,
                entity.details.kind(),
                details,
                entity.revision,
                entity.locator,
                entity.last_crawled.map(|t| t.to_rfc3339()),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }

    fn mark_crawled(&mut self, key: &EntityKey, at: DateTime<Utc>) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE entities SET last_crawled = ?1 WHERE source = ?2 AND namespace = ?3 AND name = ?4",
            params![
                at.to_rfc3339(),
                key.source.to_db_string(),
                key.namespace,
                key.name
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::EntityNotFound(key.to_string()));
        }
        Ok(())
    }

    fn query_all(&self, source: Source, namespace: &str) -> StorageResult<Vec<Entity>> {
        let sql = format!(
            "SELECT {} FROM entities WHERE source = ?1 AND namespace = ?2 ORDER BY name",
            ENTITY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entities = stmt
            .query_map(params![source.to_db_string(), namespace], entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    fn query_source(&self, source: Source) -> StorageResult<Vec<Entity>> {
        let sql = format!(
            "SELECT {} FROM entities WHERE source = ?1 ORDER BY namespace, name",
            ENTITY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entities = stmt
            .query_map(params![source.to_db_string()], entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    fn max_entity_revision(&self, source: Source, namespace: &str) -> StorageResult<Option<i64>> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(revision) FROM entities WHERE source = ?1 AND namespace = ?2",
            params![source.to_db_string(), namespace],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    // ===== Relations =====

    fn insert_relation_if_absent(&mut self, relation: &Relation) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO relations
             (source, predicate, origin_namespace, origin_name, destination_namespace, destination_name, revision, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                relation.source.to_db_string(),
                relation.predicate,
                relation.origin.namespace,
                relation.origin.name,
                relation.destination.namespace,
                relation.destination.name,
                relation.revision,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }

    fn relations_from(&self, origin: &EntityKey) -> StorageResult<Vec<Relation>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, predicate, origin_namespace, origin_name, destination_namespace, destination_name, revision
             FROM relations WHERE source = ?1 AND origin_namespace = ?2 AND origin_name = ?3
             ORDER BY id",
        )?;
        let relations = stmt
            .query_map(
                params![origin.source.to_db_string(), origin.namespace, origin.name],
                relation_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(relations)
    }

    fn max_relation_revision(
        &self,
        source: Source,
        predicate: &str,
    ) -> StorageResult<Option<i64>> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(revision) FROM relations WHERE source = ?1 AND predicate = ?2",
            params![source.to_db_string(), predicate],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    // ===== Redirections =====

    fn upsert_redirection(&mut self, redirection: &Redirection) -> StorageResult<UpsertOutcome> {
        let source = redirection.source.to_db_string();
        let tx = self.conn.transaction()?;

        let existed: Option<i64> = tx
            .query_row(
                "SELECT id FROM redirections WHERE source = ?1 AND alias_namespace = ?2 AND alias_name = ?3",
                params![source, redirection.alias.namespace, redirection.alias.name],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            "INSERT INTO redirections
             (source, alias_namespace, alias_name, target_namespace, target_name, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(source, alias_namespace, alias_name) DO UPDATE SET
                 target_namespace = excluded.target_namespace,
                 target_name = excluded.target_name,
                 updated_at = excluded.updated_at",
            params![
                source,
                redirection.alias.namespace,
                redirection.alias.name,
                redirection.target.namespace,
                redirection.target.name,
                Utc::now().to_rfc3339()
            ],
        )?;

        tx.commit()?;
        Ok(if existed.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    fn get_redirection(
        &self,
        source: Source,
        alias: &NodeRef,
    ) -> StorageResult<Option<Redirection>> {
        let redirection = self
            .conn
            .query_row(
                "SELECT target_namespace, target_name FROM redirections
                 WHERE source = ?1 AND alias_namespace = ?2 AND alias_name = ?3",
                params![source.to_db_string(), alias.namespace, alias.name],
                |row| {
                    Ok(Redirection {
                        source,
                        alias: alias.clone(),
                        target: NodeRef::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                    })
                },
            )
            .optional()?;
        Ok(redirection)
    }

    // ===== Catalog =====

    fn create_work(&mut self, title: &str, links: &[(&EntityKey, f64)]) -> StorageResult<i64> {
        for (key, confidence) in links {
            check_confidence(key, *confidence)?;
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO works (title, created_at) VALUES (?1, ?2)",
            params![title, now],
        )?;
        let work_id = tx.last_insert_rowid();

        // A plain INSERT so an already-linked entity aborts the whole work
        for (key, confidence) in links {
            tx.execute(
                "INSERT INTO correspondences
                 (work_id, source, namespace, name, confidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    work_id,
                    key.source.to_db_string(),
                    key.namespace,
                    key.name,
                    confidence,
                    now
                ],
            )?;
        }

        tx.commit()?;
        Ok(work_id)
    }

    fn get_work(&self, work_id: i64) -> StorageResult<Option<CatalogWork>> {
        let work = self
            .conn
            .query_row(
                "SELECT id, title, created_at FROM works WHERE id = ?1",
                params![work_id],
                |row| {
                    Ok(CatalogWork {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(work)
    }

    fn find_correspondence(&self, key: &EntityKey) -> StorageResult<Option<CorrespondenceEdge>> {
        let edge = self
            .conn
            .query_row(
                "SELECT work_id, source, namespace, name, confidence FROM correspondences
                 WHERE source = ?1 AND namespace = ?2 AND name = ?3",
                params![key.source.to_db_string(), key.namespace, key.name],
                edge_from_row,
            )
            .optional()?;
        Ok(edge)
    }

    fn insert_correspondence_if_absent(
        &mut self,
        edge: &CorrespondenceEdge,
    ) -> StorageResult<bool> {
        // OR IGNORE would also swallow the CHECK constraint
        check_confidence(&edge.external, edge.confidence)?;

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO correspondences
             (work_id, source, namespace, name, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                edge.work_id,
                edge.external.source.to_db_string(),
                edge.external.namespace,
                edge.external.name,
                edge.confidence,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }

    fn relink_correspondence(&mut self, edge: &CorrespondenceEdge) -> StorageResult<Option<i64>> {
        check_confidence(&edge.external, edge.confidence)?;
        let key = &edge.external;

        let tx = self.conn.transaction()?;
        let previous: Option<i64> = tx
            .query_row(
                "SELECT work_id FROM correspondences
                 WHERE source = ?1 AND namespace = ?2 AND name = ?3",
                params![key.source.to_db_string(), key.namespace, key.name],
                |row| row.get(0),
            )
            .optional()?;
        let previous = previous
            .ok_or_else(|| StorageError::EntityNotFound(format!("no correspondence for {}", key)))?;

        tx.execute(
            "UPDATE correspondences SET work_id = ?1, confidence = ?2
             WHERE source = ?3 AND namespace = ?4 AND name = ?5",
            params![
                edge.work_id,
                edge.confidence,
                key.source.to_db_string(),
                key.namespace,
                key.name
            ],
        )?;

        let mut dropped = None;
        if previous != edge.work_id {
            let remaining: i64 = tx.query_row(
                "SELECT COUNT(*) FROM correspondences WHERE work_id = ?1",
                params![previous],
                |row| row.get(0),
            )?;
            if remaining == 0 {
                tx.execute("DELETE FROM works WHERE id = ?1", params![previous])?;
                dropped = Some(previous);
            }
        }

        tx.commit()?;
        Ok(dropped)
    }

    fn correspondences_of(&self, work_id: i64) -> StorageResult<Vec<CorrespondenceEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT work_id, source, namespace, name, confidence FROM correspondences
             WHERE work_id = ?1 ORDER BY id",
        )?;
        let edges = stmt
            .query_map(params![work_id], edge_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    // ===== Run Management =====

    fn create_run(&mut self, job: Job, config_hash: &str) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (job, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                job.to_db_string(),
                Utc::now().to_rfc3339(),
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), Utc::now().to_rfc3339(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn recent_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT ?1", RUN_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![limit], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    // ===== Statistics =====

    fn count_entities_by_namespace(&self, source: Source) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT namespace, COUNT(*) FROM entities WHERE source = ?1
             GROUP BY namespace ORDER BY namespace",
        )?;
        let counts = stmt
            .query_map(params![source.to_db_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    fn count_relations(&self, source: Source) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM relations WHERE source = ?1",
            params![source.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_redirections(&self, source: Source) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM redirections WHERE source = ?1",
            params![source.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_works(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM works", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_correspondences(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM correspondences", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
