use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use linkstat::analytics::{Classifier, CountryTable, StatisticsAggregator};
use linkstat::codec;
use linkstat::config::{Config, DatabaseBackend};
use linkstat::models::{ClickEvent, ShortLink, Statistics};
use linkstat::pagination::Page;
use linkstat::storage::{MemoryStorage, SqliteStorage, Storage, StorageError};

#[derive(Parser)]
#[command(name = "linkstat")]
#[command(about = "Short link store and click statistics aggregator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one aggregation pass over all links
    Aggregate,
    /// Run aggregation periodically until interrupted
    Watch {
        /// Seconds between runs (defaults to AGGREGATION_INTERVAL_SECS)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Store a new short link
    Shorten {
        /// Target URL
        url: String,
    },
    /// Record a click on a short link
    Click {
        /// Short code
        id: String,
        /// Remote address of the visitor
        #[arg(long, default_value = "")]
        addr: String,
        /// Referrer header
        #[arg(long, default_value = "")]
        referrer: String,
        /// User-Agent header
        #[arg(long, default_value = "")]
        user_agent: String,
    },
    /// Print the statistics of a short link as JSON
    Stats {
        /// Short code
        id: String,
    },
    /// Delete a short link with its click log and statistics
    Delete {
        /// Short code
        id: String,
    },
    /// Print the number of stored links
    Count,
    /// List short links, newest first
    Links {
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },
}

async fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(
                SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory storage; nothing will be persisted");
            Arc::new(MemoryStorage::new())
        }
    };

    storage.init().await?;
    Ok(storage)
}

fn build_aggregator(config: &Config, storage: Arc<dyn Storage>) -> Result<StatisticsAggregator> {
    let countries = match config.geoip.ranges_path.as_deref() {
        Some(path) => {
            let table = CountryTable::from_path(path)?;
            info!("Loaded {} country ranges from {}", table.len(), path);
            table
        }
        None => CountryTable::builtin(),
    };

    Ok(StatisticsAggregator::new_with_config(
        storage,
        Classifier::new(countries),
        config.aggregation.link_page_size,
        config.aggregation.event_page_size,
    ))
}

fn check_id(id: &str) -> Result<()> {
    if !codec::is_valid_id(id) {
        bail!("'{}' is not a valid short code", id);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let storage = open_storage(&config).await?;

    match cli.command {
        Commands::Aggregate => {
            let aggregator = build_aggregator(&config, storage)?;
            let summary = aggregator.run().await;
            if !summary.completed {
                bail!("aggregation aborted after {} links", summary.links_visited);
            }
            println!(
                "✓ Visited {} links, updated {}, counted {} new clicks",
                summary.links_visited, summary.links_updated, summary.events_folded
            );
        }
        Commands::Watch { interval_secs } => {
            let every = interval_secs.unwrap_or(config.aggregation.interval_secs).max(1);
            let aggregator = Arc::new(build_aggregator(&config, storage)?);
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            info!("Running aggregation every {}s, press Ctrl-C to stop", every);
            let handle = aggregator.spawn_periodic(Duration::from_secs(every), shutdown_rx);

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutdown signal received, waiting for the current run...");
            if shutdown_tx.send(true).is_err() {
                warn!("Aggregation task already stopped");
            }
            handle.await?;
        }
        Commands::Shorten { url } => {
            let mut link = ShortLink::new(url);
            let id = storage.put_link(&mut link).await?;
            println!("✓ {} -> {}", id, link.target);
        }
        Commands::Click {
            id,
            addr,
            referrer,
            user_agent,
        } => {
            check_id(&id)?;
            match storage.get_link(&id).await {
                Ok(_) => {}
                Err(StorageError::NotFound) => bail!("short code '{}' not found", id),
                Err(e) => return Err(e.into()),
            }
            storage
                .append_click_event(&ClickEvent::new(&id, addr, referrer, user_agent))
                .await?;
            let total = storage.count_click_events(&id).await?;
            println!("✓ Recorded click on '{}' ({} logged)", id, total);
        }
        Commands::Stats { id } => {
            check_id(&id)?;
            let stats = match storage.get_statistics(&id).await {
                Ok(stats) => stats,
                Err(StorageError::NotFound) => {
                    // Not aggregated yet; only a known link gets empty statistics.
                    storage
                        .get_link(&id)
                        .await
                        .with_context(|| format!("short code '{}' not found", id))?;
                    Statistics::new(id.as_str())
                }
                Err(e) => return Err(e.into()),
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Delete { id } => {
            check_id(&id)?;
            match storage.get_link(&id).await {
                Ok(_) => {}
                Err(StorageError::NotFound) => bail!("short code '{}' not found", id),
                Err(e) => return Err(e.into()),
            }
            storage.delete_link(&id).await?;
            println!("✓ Deleted '{}'", id);
        }
        Commands::Count => {
            println!("{}", storage.count_links().await?);
        }
        Commands::Links { limit, offset } => {
            let page = Page::clamped(limit, offset);
            let links = storage.list_links(page.limit, page.offset).await?;
            let total = storage.count_links().await?;
            if links.is_empty() {
                println!("No links found.");
            } else {
                println!("{:<12} {:>8} {:<25} {}", "ID", "Clicks", "Created", "Target");
                println!("{}", "-".repeat(80));
                let count = links.len() as i64;
                for link in links {
                    println!(
                        "{:<12} {:>8} {:<25} {}",
                        link.id,
                        link.clicks,
                        link.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        link.target
                    );
                }
                println!(
                    "Showing {}-{} of {} links",
                    page.offset + 1,
                    page.offset + count,
                    total
                );
            }
        }
    }

    Ok(())
}
