use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use chrono::Local;
use tracing::info;

use aisle_scout::core::config;
use aisle_scout::pipeline::orchestrator::{self, PipelineConfig, RunMode};
use aisle_scout::pipeline::sinks::CsvSink;
use aisle_scout::{input, PerformanceRecord, ProductRecord, StoreScraper, WorkItem};

fn usage() -> ! {
    eprintln!("usage: aisle-scout <assortment|availability|dry-run> <work-list.csv>");
    std::process::exit(2);
}

fn output_path(prefix: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    config::output_dir().join(format!("{}_{}.csv", prefix, stamp))
}

fn load_items(mode: RunMode, path: &Path) -> Result<Vec<WorkItem>> {
    match mode {
        RunMode::Assortment | RunMode::DryRun => Ok(input::load_pincodes(path)?
            .into_iter()
            .map(|pincode| WorkItem::Assortment { pincode })
            .collect()),
        RunMode::Availability => input::load_availability_items(path),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        usage();
    }
    let mode = match args[1].as_str() {
        "assortment" => RunMode::Assortment,
        "availability" => RunMode::Availability,
        "dry-run" => RunMode::DryRun,
        other => return Err(anyhow!("unknown mode {:?}", other)),
    };
    let work_list = PathBuf::from(&args[2]);

    let items = load_items(mode, &work_list)?;
    if items.is_empty() {
        return Err(anyhow!("no work items in {}", work_list.display()));
    }

    let prefix = match mode {
        RunMode::Assortment => "assortment",
        RunMode::Availability => "availability",
        RunMode::DryRun => "dry_run",
    };
    let result_sink = CsvSink::<ProductRecord>::create(&output_path(prefix))?;
    let perf_sink = CsvSink::<PerformanceRecord>::create(&output_path("performance"))?;

    let cfg = PipelineConfig::for_mode(mode);
    let summary =
        orchestrator::run(items, cfg, StoreScraper::new, result_sink, perf_sink).await?;

    info!(
        items = summary.items_total,
        workers = summary.workers_spawned,
        products = summary.products_written,
        metrics = summary.performance_rows,
        "run finished"
    );
    Ok(())
}
