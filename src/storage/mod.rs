//! Storage module for persisting crawl and alignment data
//!
//! This module owns every piece of state that outlives a job invocation:
//! - Entities of both external sources, keyed by natural key
//! - Relations and redirections between entities of one source
//! - Catalog works and the correspondence edges produced by alignment
//! - Job run history

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{EntityStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External source an entity was crawled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    /// Link-following crawl of the wiki
    Wiki,
    /// Paginated sync of the ontology endpoint
    Ontology,
}

impl Source {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Wiki => "wiki",
            Self::Ontology => "ontology",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "wiki" => Some(Self::Wiki),
            "ontology" => Some(Self::Ontology),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Namespace-qualified name of an entity within one source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub namespace: String,
    pub name: String,
}

impl NodeRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Qualifies this reference with its source
    pub fn in_source(&self, source: Source) -> EntityKey {
        EntityKey {
            source,
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Natural key of an entity: unique within `(source, namespace)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub source: Source,
    pub namespace: String,
    pub name: String,
}

impl EntityKey {
    pub fn new(source: Source, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Drops the source, keeping the namespace-qualified name
    pub fn node(&self) -> NodeRef {
        NodeRef::new(self.namespace.clone(), self.name.clone())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.source, self.namespace, self.name)
    }
}

/// Kind-specific entity payload
///
/// The variant name is persisted in the `kind` column; the payload is stored
/// as JSON next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityDetails {
    /// A creative work; `medium` is the wiki namespace it was found in
    Work { medium: Option<String> },
    /// A person or team credited for works
    Creator,
    /// A trope article
    Trope,
    /// An ontology resource typed by `class_iri`
    Resource { class_iri: String },
}

impl EntityDetails {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Work { .. } => "work",
            Self::Creator => "creator",
            Self::Trope => "trope",
            Self::Resource { .. } => "resource",
        }
    }
}

/// An entity record with its crawl metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub key: EntityKey,
    pub label: String,
    /// Source revision marker; the store never lets it decrease
    pub revision: Option<i64>,
    /// Completion stamp of the last full crawl
    pub last_crawled: Option<DateTime<Utc>>,
    /// URL the entity was resolved from
    pub locator: Option<String>,
    pub details: EntityDetails,
}

impl Entity {
    /// Builds a never-crawled entity
    pub fn new(key: EntityKey, label: impl Into<String>, details: EntityDetails) -> Self {
        Self {
            key,
            label: label.into(),
            revision: None,
            last_crawled: None,
            locator: None,
            details,
        }
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }
}

/// Directed edge between two entities of the same source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub source: Source,
    pub predicate: String,
    pub origin: NodeRef,
    pub destination: NodeRef,
    pub revision: Option<i64>,
}

/// Alias key pointing at a canonical entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub source: Source,
    pub alias: NodeRef,
    pub target: NodeRef,
}

/// Result of an insert-or-update on a natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// An entry of the internal catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogWork {
    pub id: i64,
    pub title: String,
    pub created_at: String,
}

/// Link between a catalog work and one external entity
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceEdge {
    pub work_id: i64,
    pub external: EntityKey,
    /// Similarity confidence within [0, 1]
    pub confidence: f64,
}

/// Background job recorded in the run history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    Wiki,
    Ontology,
    Align,
}

impl Job {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Wiki => "wiki",
            Self::Ontology => "ontology",
            Self::Align => "align",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "wiki" => Some(Self::Wiki),
            "ontology" => Some(Self::Ontology),
            "align" => Some(Self::Align),
            _ => None,
        }
    }
}

/// Represents a job run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub job: Job,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
