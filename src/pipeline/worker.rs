//! Per-worker loop. A worker owns one scraper (one browser) for its whole
//! life, pulls items off the shared queue until it is empty, and emits
//! exactly one performance record per item it processed.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc::Sender;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::core::types::{
    record_timestamp, PerformanceRecord, ProductRecord, RunStatus, SinkMessage, WorkItem,
};
use crate::pipeline::orchestrator::{PipelineConfig, RunMode};
use crate::scraping::{humanize, CatalogScraper};

pub type WorkQueue = Arc<Mutex<VecDeque<WorkItem>>>;

pub async fn run_worker<S: CatalogScraper>(
    worker_id: usize,
    mut scraper: S,
    queue: WorkQueue,
    result_tx: Sender<SinkMessage<Vec<ProductRecord>>>,
    perf_tx: Sender<SinkMessage<PerformanceRecord>>,
    cfg: PipelineConfig,
) {
    // Staggered startup so N browsers do not hit the storefront in lockstep.
    let stagger = humanize::jitter_ms(cfg.stagger_ms.0, cfg.stagger_ms.1);
    tokio::time::sleep(stagger).await;

    if let Err(e) = scraper.start().await {
        // This worker retires; queued items remain for its siblings.
        error!(worker_id, "scraper start failed, worker retiring: {:#}", e);
        return;
    }
    info!(worker_id, "worker up");

    loop {
        let item = { queue.lock().await.pop_front() };
        let Some(item) = item else { break };

        let pincode = item.pincode().to_string();
        let start_time = record_timestamp();
        let started = std::time::Instant::now();
        info!(worker_id, pincode = %pincode, "processing item");

        let outcome = process_item(&mut scraper, &item, &result_tx, cfg.mode).await;

        let (status, categories_scraped, products_found, error_message) = match outcome {
            Ok((categories, products)) => (RunStatus::Success, categories, products, String::new()),
            Err(e) => {
                warn!(worker_id, pincode = %pincode, "item failed: {:#}", e);
                (RunStatus::Failed, 0, 0, format!("{:#}", e))
            }
        };

        let perf = PerformanceRecord {
            pincode,
            status,
            categories_scraped,
            products_found,
            start_time,
            end_time: record_timestamp(),
            duration_seconds: started.elapsed().as_secs_f64(),
            error_message,
        };
        if perf_tx.send(SinkMessage::Data(perf)).await.is_err() {
            warn!(worker_id, "performance sink closed early");
        }

        // Cooldown between items keeps per-session request cadence human.
        let cooldown = humanize::jitter_ms(cfg.cooldown_ms.0, cfg.cooldown_ms.1);
        tokio::time::sleep(cooldown).await;
    }

    scraper.stop().await;
    info!(worker_id, "worker done");
}

/// Process one item. Per-category failures are logged and skipped; an error
/// from the location or discovery phase fails the whole item.
async fn process_item<S: CatalogScraper>(
    scraper: &mut S,
    item: &WorkItem,
    result_tx: &Sender<SinkMessage<Vec<ProductRecord>>>,
    mode: RunMode,
) -> Result<(usize, usize)> {
    match item {
        WorkItem::Assortment { pincode } => {
            let session = scraper.set_location(pincode).await?;
            // Location-scoped content finishes hydrating shortly after selection.
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;

            let categories = scraper.discover_categories().await?;
            let mut scraped = 0usize;
            let mut products = 0usize;
            for url in &categories {
                match scraper.scrape_category_fast(url, pincode, &session).await {
                    Ok(records) => {
                        scraped += 1;
                        products += records.len();
                        forward(result_tx, records, mode).await;
                    }
                    Err(e) => warn!(url = %url, "category scrape failed, continuing: {:#}", e),
                }
                humanize::pause(500, 1500).await;
            }
            Ok((scraped, products))
        }
        WorkItem::Availability { url, pincode } => {
            let session = scraper.set_location(pincode).await?;
            let records = scraper.scrape_availability(url, pincode, &session).await?;
            let found = records.len();
            forward(result_tx, records, mode).await;
            Ok((0, found))
        }
    }
}

async fn forward(
    result_tx: &Sender<SinkMessage<Vec<ProductRecord>>>,
    records: Vec<ProductRecord>,
    mode: RunMode,
) {
    if records.is_empty() || mode == RunMode::DryRun {
        return;
    }
    if result_tx.send(SinkMessage::Data(records)).await.is_err() {
        warn!("result sink closed early, batch dropped");
    }
}
