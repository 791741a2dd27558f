mod cli;
mod engine;

use crate::cli::{CacheCommand, Cli, Command, OutputArgs};
use crate::engine::{Engine, report};
use clap::Parser;
use futures::StreamExt;
use miette::{IntoDiagnostic, Result};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use tsundoku_catalog::{SearchFilters, SyncEvent, SyncOutcome};
use tsundoku_config::Config;
use tsundoku_model::{FullRecord, UpdateKind};
use tsundoku_remote::{decode_pointer, normalize_path, raw_url};

const LOG_ENV: &str = "TSUNDOKU_LOG";
const DEFAULT_LOG: &str = "info,tsundoku=debug";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn print_json(value: &(impl serde::Serialize + ?Sized)) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn print_records(records: &[FullRecord]) {
    for record in records {
        println!("{:<32} {:<8} {}", record.id, record.work_type.as_str(), record.title);
    }
}

async fn sync(engine: &Engine, output: OutputArgs) -> Result<()> {
    engine.require_index()?;
    let syncer = engine.syncer();
    let mut events = Box::pin(syncer.sync_events());
    let mut outcome: Option<SyncOutcome> = None;
    while let Some(event) = events.next().await {
        match event.map_err(report)? {
            SyncEvent::Started => tracing::debug!("Sync started"),
            SyncEvent::IndexFetched { version, entries } => tracing::info!(%version, entries, "Index fetched"),
            SyncEvent::Unchanged { version } => tracing::info!(%version, "Catalog is up to date"),
            SyncEvent::NetworkDegraded { batch, failed } => {
                tracing::warn!(batch = batch + 1, failed, "Works unreachable, continuing without them");
            },
            SyncEvent::BatchResolved { index, batches, records } => {
                tracing::info!(batch = index + 1, of = batches, records = records.len(), "Resolved batch");
            },
            SyncEvent::Complete(done) => outcome = Some(done),
        }
    }
    let Some(outcome) = outcome else {
        miette::bail!("sync ended without completing");
    };
    if output.json {
        return print_json(&outcome);
    }
    println!(
        "catalog {}: {} works, {} failed, {} updates{}",
        outcome.version,
        outcome.records.len(),
        outcome.failures.len(),
        outcome.updates.len(),
        if outcome.updated { "" } else { " (unchanged)" },
    );
    for update in &outcome.updates {
        match update.kind {
            UpdateKind::NewWork => println!("  new     {}", update.work.title),
            UpdateKind::NewChapters => {
                println!("  updated {} (+{} chapters)", update.work.title, update.new_chapters.len());
            },
        }
    }
    Ok(())
}

fn decode(config: &Config, url: &str) -> Result<()> {
    let decoded = decode_pointer(url).map_err(report)?;
    let normalized = normalize_path(&decoded);
    println!("pointer:  {decoded}");
    println!("path:     {normalized}");
    println!("document: {}", raw_url(&config.catalog.raw_host, &normalized));
    Ok(())
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Decode { url } => decode(&config, &url),
        Command::Sync(output) => sync(&Engine::open(config).await?, output).await,
        Command::Page { page, output } => {
            let pages = Engine::open(config).await?.pages().await?;
            let total = pages.total_pages().await;
            if !pages.go_to_page(page).await {
                miette::bail!("page {page} is out of range (1..={total})");
            }
            let records = pages.page_data(page).await.unwrap_or_default();
            if output.json {
                return print_json(&records[..]);
            }
            println!("page {page} of {total}");
            print_records(&records);
            Ok(())
        },
        Command::Search { query, work_type, limit, output } => {
            let pages = Engine::open(config).await?.pages().await?;
            let filters = SearchFilters { work_type: work_type.map(|t| t.parse().unwrap_or_default()), limit };
            let found = pages.search(&query, &filters).await;
            if output.json {
                return print_json(&found);
            }
            for entry in &found {
                println!("{:<32} {:<8} {}", entry.id, entry.work_type.as_str(), entry.title);
            }
            Ok(())
        },
        Command::Find { id } => match Engine::open(config).await?.pages().await?.find_manga_page(&id).await {
            Some(page) => {
                println!("{page}");
                Ok(())
            },
            None => miette::bail!("{id} is not in the catalog"),
        },
        Command::Cache { action } => {
            let engine = Engine::open(config).await?;
            match action {
                CacheCommand::Stats => print_json(&engine.cache.stats().await.map_err(report)?),
                CacheCommand::Cleanup => {
                    let evicted = engine.cache.cleanup().await.map_err(report)?;
                    print_json(&Value::from(evicted))
                },
                CacheCommand::Clear => {
                    let removed = engine.cache.clear().await.map_err(report)?;
                    print_json(&Value::from(removed))
                },
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).map_err(report)?;
    run(cli.command, config).await
}
