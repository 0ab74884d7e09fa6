//! Incremental click log aggregation
//!
//! Walks every link, pages through its click log oldest-first and folds
//! events newer than the statistics watermark into the breakdown maps.
//! The watermark makes a run idempotent and resumable: events at or
//! before `Statistics::last_updated` were counted by an earlier run and
//! are skipped.
//!
//! A run is a sequential batch job. Two runs against the same storage at
//! the same time can double count, so callers must not overlap them;
//! [`StatisticsAggregator::spawn_periodic`] runs them back to back in a
//! single task.

use anyhow::Context;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::analytics::classifier::{Classification, Classifier};
use crate::models::{ShortLink, Statistics};
use crate::storage::{Storage, StorageError};

/// Default number of links and click events fetched per page.
pub const DEFAULT_PAGE_SIZE: i64 = 1000;

/// Outcome of one aggregation run, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationSummary {
    /// Links whose click log was walked
    pub links_visited: usize,
    /// Links whose link record and statistics were written back
    pub links_updated: usize,
    /// Events counted by this run
    pub events_folded: u64,
    /// Events skipped because they were at or before the watermark
    pub events_skipped: u64,
    /// False when the run was aborted by a storage failure
    pub completed: bool,
}

/// Folds click logs into per-link statistics.
pub struct StatisticsAggregator {
    storage: Arc<dyn Storage>,
    classifier: Classifier,
    link_page_size: i64,
    event_page_size: i64,
}

impl StatisticsAggregator {
    /// Create an aggregator with configurable page sizes (minimum 1).
    pub fn new_with_config(
        storage: Arc<dyn Storage>,
        classifier: Classifier,
        link_page_size: i64,
        event_page_size: i64,
    ) -> Self {
        Self {
            storage,
            classifier,
            link_page_size: link_page_size.max(1),
            event_page_size: event_page_size.max(1),
        }
    }

    /// Create an aggregator with the built-in country table and default page sizes.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::new_with_config(
            storage,
            Classifier::default(),
            DEFAULT_PAGE_SIZE,
            DEFAULT_PAGE_SIZE,
        )
    }

    /// Run one aggregation pass over every link.
    ///
    /// Storage failures abort the run and are logged; links written before
    /// the failure keep their updates. Nothing is retried: the next run
    /// picks up where the persisted watermarks left off.
    pub async fn run(&self) -> AggregationSummary {
        let started = Instant::now();
        let mut summary = AggregationSummary::default();

        match self.run_inner(&mut summary).await {
            Ok(()) => {
                summary.completed = true;
                info!(
                    links = summary.links_visited,
                    updated = summary.links_updated,
                    folded = summary.events_folded,
                    skipped = summary.events_skipped,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Aggregation run finished"
                );
            }
            Err(e) => {
                error!(
                    links = summary.links_visited,
                    updated = summary.links_updated,
                    "Aggregation run aborted: {:#}",
                    e
                );
            }
        }

        summary
    }

    async fn run_inner(&self, summary: &mut AggregationSummary) -> anyhow::Result<()> {
        if let Ok(total) = self.storage.count_links().await {
            debug!("Aggregating statistics for {} links", total);
        }

        let mut offset = 0;
        loop {
            let links = self
                .storage
                .list_links(self.link_page_size, offset)
                .await
                .with_context(|| format!("listing links at offset {}", offset))?;

            if links.is_empty() {
                break;
            }
            offset += links.len() as i64;

            for link in links {
                summary.links_visited += 1;
                self.aggregate_link(link, summary).await?;
            }
        }

        Ok(())
    }

    async fn aggregate_link(
        &self,
        mut link: ShortLink,
        summary: &mut AggregationSummary,
    ) -> anyhow::Result<()> {
        let (mut stats, created) = match self.storage.get_statistics(&link.id).await {
            Ok(stats) => (stats, false),
            Err(StorageError::NotFound) => (Statistics::new(link.id.clone()), true),
            Err(e) => {
                return Err(e).with_context(|| format!("loading statistics for {}", link.id));
            }
        };

        let watermark = stats.last_updated;
        let mut high_water = watermark;
        let mut folded = 0u64;

        let mut offset = 0;
        loop {
            let events = self
                .storage
                .list_click_events(&link.id, self.event_page_size, offset)
                .await
                .with_context(|| {
                    format!("listing click events for {} at offset {}", link.id, offset)
                })?;

            if events.is_empty() {
                break;
            }
            offset += events.len() as i64;

            // Skip and keep going: an old event does not mean the rest of
            // the page is old too.
            for event in &events {
                if event.occurred_at <= watermark {
                    summary.events_skipped += 1;
                    continue;
                }

                fold(&mut stats, self.classifier.classify(event));
                high_water = high_water.max(event.occurred_at);
                folded += 1;
            }
        }

        // Existing statistics with nothing new stay untouched. A first touch
        // still persists the zero-valued record.
        if folded == 0 && !created {
            return Ok(());
        }

        stats.last_updated = high_water;
        // The link count always mirrors the statistics, including after a
        // refold.
        link.clicks = stats.clicks;

        self.storage
            .put_link(&mut link)
            .await
            .with_context(|| format!("saving link {}", link.id))?;
        self.storage
            .put_statistics(&stats)
            .await
            .with_context(|| format!("saving statistics for {}", link.id))?;

        debug!(
            link = %link.id,
            folded,
            clicks = stats.clicks,
            "Updated statistics"
        );
        summary.events_folded += folded;
        summary.links_updated += 1;

        Ok(())
    }

    /// Run aggregation every `every` until `shutdown` turns true.
    ///
    /// The first run starts immediately. Runs happen one after another in
    /// the spawned task and never overlap; a shutdown signal received
    /// during a run takes effect once that run finishes.
    pub fn spawn_periodic(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    _ = interval.tick() => {
                        self.run().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            // Sender dropped; nobody can stop us any other way.
                            break;
                        }
                    }
                }
            }

            info!("Aggregation task shutting down");
        })
    }
}

fn fold(stats: &mut Statistics, classified: Classification) {
    *stats.referrers.entry(classified.referrer).or_insert(0) += 1;
    *stats.browsers.entry(classified.browser).or_insert(0) += 1;
    *stats.countries.entry(classified.country).or_insert(0) += 1;
    *stats.platforms.entry(classified.platform).or_insert(0) += 1;
    *stats.hours.entry(classified.hour).or_insert(0) += 1;
    stats.clicks += 1;
}
