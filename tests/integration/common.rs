use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use trope_atlas::config::UserAgentConfig;
use trope_atlas::SqliteStore;

pub fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

/// A file-backed store; keep the directory alive for the test's duration
pub fn temp_store() -> (TempDir, PathBuf, Arc<Mutex<SqliteStore>>) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("atlas.db");
    let store = SqliteStore::new(&path).expect("Failed to open store");
    (dir, path, Arc::new(Mutex::new(store)))
}
