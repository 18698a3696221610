//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Trope-Atlas database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track job runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Entities of both external sources
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    namespace TEXT NOT NULL,
    name TEXT NOT NULL,
    label TEXT NOT NULL,
    kind TEXT NOT NULL,
    details TEXT NOT NULL,
    revision INTEGER,
    locator TEXT,
    last_crawled TEXT,
    first_seen TEXT NOT NULL,
    UNIQUE(source, namespace, name)
);

CREATE INDEX IF NOT EXISTS idx_entities_source_namespace ON entities(source, namespace);

-- Directed edges between entities of one source; targets may not exist yet
CREATE TABLE IF NOT EXISTS relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    predicate TEXT NOT NULL,
    origin_namespace TEXT NOT NULL,
    origin_name TEXT NOT NULL,
    destination_namespace TEXT NOT NULL,
    destination_name TEXT NOT NULL,
    revision INTEGER,
    discovered_at TEXT NOT NULL,
    UNIQUE(source, predicate, origin_namespace, origin_name, destination_namespace, destination_name)
);

CREATE INDEX IF NOT EXISTS idx_relations_origin ON relations(source, origin_namespace, origin_name);
CREATE INDEX IF NOT EXISTS idx_relations_predicate ON relations(source, predicate);

-- Alias keys resolved to canonical entities
CREATE TABLE IF NOT EXISTS redirections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    alias_namespace TEXT NOT NULL,
    alias_name TEXT NOT NULL,
    target_namespace TEXT NOT NULL,
    target_name TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(source, alias_namespace, alias_name)
);

-- Internal catalog
CREATE TABLE IF NOT EXISTS works (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- One edge per external entity
CREATE TABLE IF NOT EXISTS correspondences (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    work_id INTEGER NOT NULL REFERENCES works(id),
    source TEXT NOT NULL,
    namespace TEXT NOT NULL,
    name TEXT NOT NULL,
    confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    created_at TEXT NOT NULL,
    UNIQUE(source, namespace, name)
);

CREATE INDEX IF NOT EXISTS idx_correspondences_work ON correspondences(work_id);
"#;

/// Initializes the database schema
///
/// Safe to call on an existing database: every statement is `IF NOT EXISTS`.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
