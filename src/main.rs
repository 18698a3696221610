//! Trope-Atlas main entry point
//!
//! This is the command-line interface for the Trope-Atlas aggregator.

use anyhow::{anyhow, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use trope_atlas::align::AlignmentEngine;
use trope_atlas::config::{load_config_with_hash, Config};
use trope_atlas::crawler::{HttpFetcher, OntologySync, SparqlEndpoint, WikiCrawler};
use trope_atlas::storage::{EntityStore, Job, RunStatus, SqliteStore};

type SharedStore = Arc<Mutex<SqliteStore>>;

/// Trope-Atlas: a fan-wiki ontology aggregator
///
/// Trope-Atlas crawls a trope wiki by following links between articles,
/// synchronises an ontology endpoint page by page, and aligns both sources
/// against an internal catalog of works. Without job flags all three jobs
/// run in that order.
#[derive(Parser, Debug)]
#[command(name = "trope-atlas")]
#[command(version)]
#[command(about = "A fan-wiki ontology aggregator", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Run the link-following wiki crawl
    #[arg(long)]
    wiki: bool,

    /// Run the paginated ontology sync
    #[arg(long)]
    ontology: bool,

    /// Run the alignment pass
    #[arg(long)]
    align: bool,

    /// Extra wiki seed URL (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would run without running it
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    /// Selected jobs in execution order
    fn jobs(&self) -> Vec<Job> {
        let all = !(self.wiki || self.ontology || self.align);
        [
            (Job::Wiki, self.wiki),
            (Job::Ontology, self.ontology),
            (Job::Align, self.align),
        ]
        .into_iter()
        .filter(|(_, selected)| all || *selected)
        .map(|(job, _)| job)
        .collect()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e).context("invalid configuration");
        }
    };

    if cli.dry_run {
        handle_dry_run(&config, &cli);
        return Ok(());
    }
    if cli.stats {
        return handle_stats(&config);
    }

    let store = open_store(&config)?;
    for job in cli.jobs() {
        if let Err(e) = run_job(&store, &config, &config_hash, job, &cli.seeds).await {
            tracing::error!("{} job failed: {:#}", job.to_db_string(), e);
            return Err(e);
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trope_atlas=info,warn"),
            1 => EnvFilter::new("trope_atlas=debug,info"),
            2 => EnvFilter::new("trope_atlas=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_store(config: &Config) -> anyhow::Result<SharedStore> {
    let path = Path::new(&config.store.database_path);
    let store = SqliteStore::new(path)
        .with_context(|| format!("failed to open entity store {}", path.display()))?;
    Ok(Arc::new(Mutex::new(store)))
}

fn lock(store: &SharedStore) -> anyhow::Result<std::sync::MutexGuard<'_, SqliteStore>> {
    store
        .lock()
        .map_err(|_| anyhow!("entity store lock poisoned"))
}

/// Runs one job inside a run record that ends completed or failed
async fn run_job(
    store: &SharedStore,
    config: &Config,
    config_hash: &str,
    job: Job,
    extra_seeds: &[String],
) -> anyhow::Result<()> {
    let run_id = lock(store)?.create_run(job, config_hash)?;
    tracing::info!("Starting {} run {}", job.to_db_string(), run_id);

    let result = match job {
        Job::Wiki => run_wiki(store, config, extra_seeds).await,
        Job::Ontology => run_ontology(store, config).await,
        Job::Align => run_align(store, config),
    };

    let status = if result.is_ok() {
        RunStatus::Completed
    } else {
        RunStatus::Failed
    };
    lock(store)?.finish_run(run_id, status)?;
    result
}

async fn run_wiki(store: &SharedStore, config: &Config, extra_seeds: &[String]) -> anyhow::Result<()> {
    let wiki = &config.wiki;
    let fetcher = HttpFetcher::new(
        &config.user_agent,
        Duration::from_secs(wiki.timeout_secs),
        Duration::from_millis(wiki.request_delay_ms),
    )
    .context("failed to build HTTP client")?;

    let crawler = WikiCrawler::new(store.clone(), Arc::new(fetcher), wiki.clone())?;
    let mut configured = wiki.seeds.clone();
    configured.extend_from_slice(extra_seeds);
    let seeds = crawler.seeds(&configured)?;
    if seeds.is_empty() {
        tracing::warn!("No wiki seeds configured or stored; nothing to crawl");
        return Ok(());
    }

    let summary = crawler.run(seeds).await?;
    println!(
        "Wiki crawl: {} visits, {} completed, {} fresh, {} failed",
        summary.dispatched, summary.completed, summary.fresh, summary.failed
    );
    Ok(())
}

async fn run_ontology(store: &SharedStore, config: &Config) -> anyhow::Result<()> {
    let ontology = &config.ontology;
    let http = HttpFetcher::new(
        &config.user_agent,
        Duration::from_secs(ontology.timeout_secs),
        Duration::ZERO,
    )
    .context("failed to build HTTP client")?;
    let endpoint = SparqlEndpoint::new(Arc::new(http), &ontology.endpoint)
        .with_context(|| format!("invalid ontology endpoint {}", ontology.endpoint))?;

    let summaries = OntologySync::new(store.clone(), endpoint, ontology.clone())
        .run()
        .await?;
    for summary in &summaries {
        println!(
            "Ontology {}: watermark {}, {} pages, {} new, {} existing, {} malformed",
            summary.target,
            summary.watermark,
            summary.pages,
            summary.inserted,
            summary.existing,
            summary.malformed
        );
    }
    Ok(())
}

fn run_align(store: &SharedStore, config: &Config) -> anyhow::Result<()> {
    let report = AlignmentEngine::new(store.clone(), config.alignment.clone()).run()?;
    println!(
        "Alignment: {} matches, {} new works, {} new edges, {} moved edges, {} failures",
        report.matches.len(),
        report.works_created,
        report.edges_created,
        report.edges_moved,
        report.failures
    );
    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would run
fn handle_dry_run(config: &Config, cli: &Cli) {
    println!("=== Trope-Atlas Dry Run ===\n");

    println!("User Agent: {}", config.user_agent.header_value());
    println!("Database: {}", config.store.database_path);

    println!("\nWiki:");
    println!("  Base URL: {}{}", config.wiki.base_url, config.wiki.article_path);
    println!("  Revisit interval: {} days", config.wiki.revisit_interval_days);
    println!("  Workers: {}", config.wiki.workers);
    println!("  Seeds ({}):", config.wiki.seeds.len() + cli.seeds.len());
    for seed in config.wiki.seeds.iter().chain(&cli.seeds) {
        println!("    * {}", seed);
    }

    println!("\nOntology:");
    println!("  Endpoint: {}", config.ontology.endpoint);
    println!("  Page size: {}", config.ontology.page_size);
    for class in &config.ontology.classes {
        println!("  - class {} <{}>", class.name, class.iri);
    }
    for property in &config.ontology.properties {
        println!(
            "  - property {} <{}> ({} -> {})",
            property.name, property.iri, property.domain, property.range
        );
    }

    println!("\nAlignment:");
    println!("  Threshold: {}", config.alignment.threshold);
    println!("  Metric: {:?}", config.alignment.metric);

    let jobs: Vec<&str> = cli.jobs().iter().map(|job| job.to_db_string()).collect();
    println!("\n✓ Configuration is valid");
    println!("✓ Would run: {}", jobs.join(", "));
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use trope_atlas::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.store.database_path);

    let store = SqliteStore::new(Path::new(&config.store.database_path))
        .context("failed to open entity store")?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}
