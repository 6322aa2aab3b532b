use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use aisle_scout::pipeline::orchestrator::{self, PipelineConfig, RunMode};
use aisle_scout::pipeline::sinks::RecordSink;
use aisle_scout::{
    Availability, CatalogScraper, PerformanceRecord, ProductRecord, RunStatus, SessionContext,
    WorkItem,
};

fn fast_config(mode: RunMode, max_workers: usize) -> PipelineConfig {
    PipelineConfig {
        mode,
        max_workers,
        stagger_ms: (1, 2),
        cooldown_ms: (1, 2),
    }
}

fn product_for(pincode: &str) -> ProductRecord {
    ProductRecord {
        category: "Dairy".into(),
        subcategory: "Milk".into(),
        item_name: "Toned Milk".into(),
        brand: "Amul".into(),
        mrp: "65.0".into(),
        price: "54.0".into(),
        pack_size: "500 ml".into(),
        delivery_eta: "8 mins".into(),
        availability: Availability::InStock,
        inventory: "10".into(),
        store_id: "store-1".into(),
        base_product_id: format!("card-{}", pincode),
        shelf_life_in_hours: "48".into(),
        timestamp: "2025-01-01 00:00:00".into(),
        pincode_input: pincode.into(),
        clicked_label: "Bengaluru".into(),
    }
}

/// Browser-free scraper double: serves one category with one product per
/// item, and fails location setup for a designated pincode.
struct FakeScraper {
    fail_pincode: Option<String>,
}

#[async_trait]
impl CatalogScraper for FakeScraper {
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    async fn stop(&mut self) {}

    async fn set_location(&mut self, pincode: &str) -> Result<SessionContext> {
        if self.fail_pincode.as_deref() == Some(pincode) {
            return Err(anyhow!("storefront navigation timed out"));
        }
        Ok(SessionContext {
            delivery_eta: "8 mins".into(),
            store_id: "store-1".into(),
            clicked_location_label: "Bengaluru".into(),
        })
    }

    async fn discover_categories(&mut self) -> Result<Vec<String>> {
        Ok(vec!["https://example.com/cn/dairy/milk/cid/1".into()])
    }

    async fn scrape_category_fast(
        &mut self,
        _url: &str,
        pincode: &str,
        _session: &SessionContext,
    ) -> Result<Vec<ProductRecord>> {
        Ok(vec![product_for(pincode)])
    }

    async fn scrape_category(
        &mut self,
        url: &str,
        pincode: &str,
        session: &SessionContext,
    ) -> Result<Vec<ProductRecord>> {
        self.scrape_category_fast(url, pincode, session).await
    }

    async fn scrape_availability(
        &mut self,
        _url: &str,
        pincode: &str,
        _session: &SessionContext,
    ) -> Result<Vec<ProductRecord>> {
        Ok(vec![product_for(pincode)])
    }
}

/// In-memory sink shared with the test body. The drain flushes once per
/// delivered batch, so the flush count is the batch count.
struct VecSink<T> {
    items: Arc<Mutex<Vec<T>>>,
    batches: Arc<AtomicUsize>,
}

impl<T> VecSink<T> {
    fn new() -> (Self, Arc<Mutex<Vec<T>>>) {
        let (sink, items, _) = Self::new_counting();
        (sink, items)
    }

    fn new_counting() -> (Self, Arc<Mutex<Vec<T>>>, Arc<AtomicUsize>) {
        let items = Arc::new(Mutex::new(Vec::new()));
        let batches = Arc::new(AtomicUsize::new(0));
        (
            Self {
                items: items.clone(),
                batches: batches.clone(),
            },
            items,
            batches,
        )
    }
}

impl<T: Send> RecordSink<T> for VecSink<T> {
    fn accept(&mut self, record: T) -> Result<()> {
        self.items.lock().unwrap().push(record);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn failed_item_yields_failed_metric_and_no_products() {
    let items = vec![
        WorkItem::Assortment {
            pincode: "560001".into(),
        },
        WorkItem::Assortment {
            pincode: "110001".into(),
        },
    ];
    let (result_sink, products, batches) = VecSink::<ProductRecord>::new_counting();
    let (perf_sink, metrics) = VecSink::<PerformanceRecord>::new();

    let summary = orchestrator::run(
        items,
        fast_config(RunMode::Assortment, 2),
        || FakeScraper {
            fail_pincode: Some("110001".into()),
        },
        result_sink,
        perf_sink,
    )
    .await
    .unwrap();

    assert_eq!(summary.performance_rows, 2);
    assert_eq!(summary.products_written, 1);

    let metrics = metrics.lock().unwrap();
    assert_eq!(metrics.len(), 2);
    let ok = metrics.iter().find(|m| m.pincode == "560001").unwrap();
    assert_eq!(ok.status, RunStatus::Success);
    assert_eq!(ok.categories_scraped, 1);
    assert_eq!(ok.products_found, 1);
    assert!(ok.error_message.is_empty());

    let failed = metrics.iter().find(|m| m.pincode == "110001").unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.products_found, 0);
    assert!(failed.error_message.contains("timed out"));

    let products = products.lock().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].pincode_input, "560001");
    // Only the surviving item delivered a batch; the failed one sent nothing.
    assert_eq!(batches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn worker_pool_never_exceeds_item_count() {
    let items = vec![
        WorkItem::Assortment {
            pincode: "560001".into(),
        },
        WorkItem::Assortment {
            pincode: "560002".into(),
        },
    ];
    let (result_sink, _products) = VecSink::<ProductRecord>::new();
    let (perf_sink, _metrics) = VecSink::<PerformanceRecord>::new();

    let instantiated = Arc::new(AtomicUsize::new(0));
    let counter = instantiated.clone();

    let summary = orchestrator::run(
        items,
        fast_config(RunMode::Assortment, 3),
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            FakeScraper { fail_pincode: None }
        },
        result_sink,
        perf_sink,
    )
    .await
    .unwrap();

    assert_eq!(summary.workers_spawned, 2);
    assert_eq!(instantiated.load(Ordering::SeqCst), 2);
    assert_eq!(summary.performance_rows, 2);
}

#[tokio::test]
async fn dry_run_keeps_metrics_but_discards_products() {
    let items = vec![WorkItem::Assortment {
        pincode: "560001".into(),
    }];
    let (result_sink, products) = VecSink::<ProductRecord>::new();
    let (perf_sink, metrics) = VecSink::<PerformanceRecord>::new();

    let summary = orchestrator::run(
        items,
        fast_config(RunMode::DryRun, 1),
        || FakeScraper { fail_pincode: None },
        result_sink,
        perf_sink,
    )
    .await
    .unwrap();

    assert_eq!(summary.products_written, 0);
    assert!(products.lock().unwrap().is_empty());

    let metrics = metrics.lock().unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].status, RunStatus::Success);
    assert_eq!(metrics[0].products_found, 1);
}

#[tokio::test]
async fn availability_items_emit_single_product_checks() {
    let items = vec![WorkItem::Availability {
        url: "https://example.com/pn/toned-milk/pvid/u1".into(),
        pincode: "560001".into(),
    }];
    let (result_sink, products) = VecSink::<ProductRecord>::new();
    let (perf_sink, metrics) = VecSink::<PerformanceRecord>::new();

    let summary = orchestrator::run(
        items,
        fast_config(RunMode::Availability, 1),
        || FakeScraper { fail_pincode: None },
        result_sink,
        perf_sink,
    )
    .await
    .unwrap();

    assert_eq!(summary.products_written, 1);
    assert_eq!(products.lock().unwrap().len(), 1);

    let metrics = metrics.lock().unwrap();
    assert_eq!(metrics[0].categories_scraped, 0);
    assert_eq!(metrics[0].products_found, 1);
}

#[tokio::test]
async fn empty_work_list_still_closes_sinks() {
    let (result_sink, _products) = VecSink::<ProductRecord>::new();
    let (perf_sink, _metrics) = VecSink::<PerformanceRecord>::new();

    let summary = orchestrator::run(
        Vec::new(),
        fast_config(RunMode::Assortment, 4),
        || FakeScraper { fail_pincode: None },
        result_sink,
        perf_sink,
    )
    .await
    .unwrap();

    assert_eq!(summary.workers_spawned, 0);
    assert_eq!(summary.performance_rows, 0);
    assert_eq!(summary.products_written, 0);
}
