//! One-shot reconciliation run, invoked by the scheduler.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use coursesync::cache::HttpCacheEvictor;
use coursesync::config::SyncConfig;
use coursesync::db::SqliteCatalogStore;
use coursesync::logging;
use coursesync::source::BanwebClient;
use coursesync::terms::{CalendarTermPolicy, ExplicitTerms, Term, TermPolicy};
use coursesync::BatchDriver;

#[derive(Parser, Debug)]
#[command(name = "coursesync")]
#[command(about = "Reconcile stored course sections against the registrar")]
#[command(version)]
struct Args {
    /// JSON config file; defaults apply when omitted
    #[arg(short, long, env = "COURSESYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the configured sqlite database path
    #[arg(short, long, env = "COURSESYNC_DATABASE")]
    database: Option<String>,

    /// Term to process, e.g. `fall-2024` or `202408`. Repeatable; replaces
    /// the current and next term.
    #[arg(short, long = "term")]
    terms: Vec<Term>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SyncConfig::default(),
    };
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let store = SqliteCatalogStore::open(&config.database_path)
        .with_context(|| format!("Failed to open catalog at {}", config.database_path))?;
    let source = BanwebClient::with_config(config.source.clone())
        .context("Failed to build registrar client")?;
    let cache = HttpCacheEvictor::with_config(&config.cache)
        .context("Failed to build cache invalidation client")?;

    let policy: Box<dyn TermPolicy> = if args.terms.is_empty() {
        Box::new(CalendarTermPolicy::today())
    } else {
        Box::new(ExplicitTerms::new(args.terms))
    };

    let driver = BatchDriver::from_config(
        &config,
        Arc::new(store),
        Arc::new(source),
        Arc::new(cache),
    );

    tokio::select! {
        result = driver.run(policy.as_ref()) => {
            let summary = result.context("Reconciliation run failed")?;
            info!(
                run_id = %summary.run_id,
                sections = summary.sections_seen,
                updated = summary.sections_updated,
                "Done"
            );
            Ok(())
        }
        _ = signal::ctrl_c() => {
            warn!("Interrupted, abandoning run");
            bail!("interrupted");
        }
    }
}
