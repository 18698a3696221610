//! Statistics generation from the entity store
//!
//! This module provides functionality for extracting and displaying
//! store statistics for the `--stats` mode of the binary.

use crate::storage::{EntityStore, RunRecord, Source};
use crate::Result;
use std::fmt::Write;

/// Number of runs shown in the run history
const RECENT_RUNS: u32 = 10;

/// Counters of one external source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatistics {
    pub source: Source,

    /// Entity count per namespace, ordered by namespace
    pub entities_by_namespace: Vec<(String, u64)>,

    pub relations: u64,
    pub redirections: u64,
}

impl SourceStatistics {
    pub fn total_entities(&self) -> u64 {
        self.entities_by_namespace.iter().map(|(_, n)| n).sum()
    }
}

/// Store statistics summary
#[derive(Debug, Clone)]
pub struct AtlasStatistics {
    pub sources: Vec<SourceStatistics>,

    /// Catalog works
    pub works: u64,

    /// Correspondence edges between works and external entities
    pub correspondences: u64,

    /// Latest job runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from the store
///
/// # Arguments
///
/// * `store` - The store to query
///
/// # Returns
///
/// * `Ok(AtlasStatistics)` - Successfully loaded statistics
/// * `Err(AtlasError)` - Failed to query statistics
pub fn load_statistics(store: &dyn EntityStore) -> Result<AtlasStatistics> {
    let mut sources = Vec::new();
    for source in [Source::Wiki, Source::Ontology] {
        sources.push(SourceStatistics {
            source,
            entities_by_namespace: store.count_entities_by_namespace(source)?,
            relations: store.count_relations(source)?,
            redirections: store.count_redirections(source)?,
        });
    }

    Ok(AtlasStatistics {
        sources,
        works: store.count_works()?,
        correspondences: store.count_correspondences()?,
        recent_runs: store.recent_runs(RECENT_RUNS)?,
    })
}

/// Renders statistics as the text printed by [`print_statistics`]
pub fn format_statistics(stats: &AtlasStatistics) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = render(&mut out, stats);
    out
}

fn render(out: &mut String, stats: &AtlasStatistics) -> std::fmt::Result {
    writeln!(out, "=== Atlas Statistics ===\n")?;

    for source in &stats.sources {
        writeln!(out, "Source {}:", source.source)?;
        writeln!(out, "  Entities: {}", source.total_entities())?;
        for (namespace, count) in &source.entities_by_namespace {
            writeln!(out, "    {}: {}", namespace, count)?;
        }
        writeln!(out, "  Relations: {}", source.relations)?;
        writeln!(out, "  Redirections: {}", source.redirections)?;
        writeln!(out)?;
    }

    writeln!(out, "Catalog:")?;
    writeln!(out, "  Works: {}", stats.works)?;
    writeln!(out, "  Correspondence edges: {}", stats.correspondences)?;
    writeln!(out)?;

    if !stats.recent_runs.is_empty() {
        writeln!(out, "Recent Runs:")?;
        for run in &stats.recent_runs {
            writeln!(
                out,
                "  #{} {} {} started {} finished {}",
                run.id,
                run.job.to_db_string(),
                run.status.to_db_string(),
                run.started_at,
                run.finished_at.as_deref().unwrap_or("-")
            )?;
        }
    }
    Ok(())
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &AtlasStatistics) {
    print!("{}", format_statistics(stats));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Entity, EntityDetails, EntityKey, Job, RunStatus, SqliteStore};

    #[test]
    fn test_load_statistics() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        for (namespace, name) in [("Film", "Alien"), ("Film", "Heat"), ("Creator", "RidleyScott")] {
            let entity = Entity::new(
                EntityKey::new(Source::Wiki, namespace, name),
                name,
                EntityDetails::Creator,
            );
            store.upsert_entity(&entity).unwrap();
        }
        let run = store.create_run(Job::Wiki, "abc").unwrap();
        store.finish_run(run, RunStatus::Completed).unwrap();

        let stats = load_statistics(&store).unwrap();

        assert_eq!(stats.sources[0].source, Source::Wiki);
        assert_eq!(stats.sources[0].total_entities(), 3);
        assert_eq!(
            stats.sources[0].entities_by_namespace,
            vec![("Creator".to_string(), 1), ("Film".to_string(), 2)]
        );
        assert_eq!(stats.sources[1].total_entities(), 0);
        assert_eq!(stats.recent_runs.len(), 1);
    }

    #[test]
    fn test_format_statistics() {
        let stats = AtlasStatistics {
            sources: vec![SourceStatistics {
                source: Source::Ontology,
                entities_by_namespace: vec![("Film".to_string(), 250)],
                relations: 40,
                redirections: 0,
            }],
            works: 12,
            correspondences: 20,
            recent_runs: vec![],
        };

        let text = format_statistics(&stats);
        assert!(text.contains("Source ontology:"));
        assert!(text.contains("    Film: 250"));
        assert!(text.contains("  Relations: 40"));
        assert!(text.contains("  Correspondence edges: 20"));
        assert!(!text.contains("Recent Runs"));
    }
}
