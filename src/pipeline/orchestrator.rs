//! Pipeline fan-out.
//!
//! Sizes the worker pool to `min(max_workers, items)`, hands every worker its
//! own scraper from a factory, and joins workers before sending each sink its
//! shutdown sentinel exactly once.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use crate::core::config;
use crate::core::types::{PerformanceRecord, ProductRecord, SinkMessage, WorkItem};
use crate::pipeline::sinks::{self, RecordSink};
use crate::pipeline::worker;
use crate::scraping::CatalogScraper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Full catalog sweep per pincode.
    Assortment,
    /// Product-URL stock checks.
    Availability,
    /// Assortment flow with results discarded; metrics only.
    DryRun,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: RunMode,
    pub max_workers: usize,
    /// Randomized startup delay range per worker, ms.
    pub stagger_ms: (u64, u64),
    /// Randomized cooldown range between items, ms.
    pub cooldown_ms: (u64, u64),
}

impl PipelineConfig {
    pub fn for_mode(mode: RunMode) -> Self {
        Self {
            mode,
            max_workers: config::max_workers(),
            stagger_ms: (2_000, 5_000),
            cooldown_ms: (5_000, 10_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub items_total: usize,
    pub workers_spawned: usize,
    pub products_written: usize,
    pub performance_rows: usize,
}

/// Run the pipeline to completion.
///
/// `make_scraper` is called once per worker on the orchestrator task; each
/// worker exclusively owns the instance it receives.
pub async fn run<S, F, RS, PS>(
    items: Vec<WorkItem>,
    cfg: PipelineConfig,
    make_scraper: F,
    result_sink: RS,
    perf_sink: PS,
) -> Result<PipelineSummary>
where
    S: CatalogScraper + 'static,
    F: Fn() -> S,
    RS: RecordSink<ProductRecord> + 'static,
    PS: RecordSink<PerformanceRecord> + 'static,
{
    let items_total = items.len();
    let worker_count = cfg.max_workers.min(items_total);
    info!(
        items = items_total,
        workers = worker_count,
        mode = ?cfg.mode,
        "pipeline starting"
    );

    let queue: worker::WorkQueue = Arc::new(Mutex::new(VecDeque::from(items)));
    let (result_tx, result_rx) = mpsc::channel::<SinkMessage<Vec<ProductRecord>>>(64);
    let (perf_tx, perf_rx) = mpsc::channel::<SinkMessage<PerformanceRecord>>(64);

    let result_task = tokio::spawn(sinks::drain_products(result_rx, result_sink));
    let perf_task = tokio::spawn(sinks::drain_performance(perf_rx, perf_sink));

    let mut workers = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let scraper = make_scraper();
        workers.push(tokio::spawn(worker::run_worker(
            worker_id,
            scraper,
            queue.clone(),
            result_tx.clone(),
            perf_tx.clone(),
            cfg.clone(),
        )));
    }

    for handle in workers {
        if let Err(e) = handle.await {
            error!("worker task failed: {}", e);
        }
    }

    // All producers are gone; one sentinel per channel shuts the sinks down.
    let _ = result_tx.send(SinkMessage::EndOfStream).await;
    let _ = perf_tx.send(SinkMessage::EndOfStream).await;

    let products_written = result_task.await.unwrap_or_else(|e| {
        error!("product sink task failed: {}", e);
        0
    });
    let performance_rows = perf_task.await.unwrap_or_else(|e| {
        error!("performance sink task failed: {}", e);
        0
    });

    let summary = PipelineSummary {
        items_total,
        workers_spawned: worker_count,
        products_written,
        performance_rows,
    };
    info!(?summary, "pipeline complete");
    Ok(summary)
}
