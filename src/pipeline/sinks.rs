//! Sentinel-terminated sink tasks.
//!
//! Each output feed is a single-consumer mpsc channel drained by one task.
//! Workers only ever send `Data`; the orchestrator sends `EndOfStream` exactly
//! once, after all workers are joined. CSV output is schema-on-first-write
//! and flushed per batch so a crash loses at most one batch.

use std::fs::File;
use std::marker::PhantomData;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc::Receiver;
use tracing::{error, info};

use crate::core::types::{PerformanceRecord, ProductRecord, SinkMessage};

/// Destination for one record type. Implementations must tolerate being
/// flushed repeatedly.
pub trait RecordSink<T>: Send {
    fn accept(&mut self, record: T) -> Result<()>;
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// CSV file sink; the header row comes from the record's serde names on the
/// first write.
pub struct CsvSink<T: Serialize> {
    writer: csv::Writer<File>,
    _record: PhantomData<T>,
}

impl<T: Serialize> CsvSink<T> {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating output dir {}", parent.display()))?;
            }
        }
        let writer = csv::Writer::from_path(path)
            .with_context(|| format!("opening sink {}", path.display()))?;
        info!("sink open: {}", path.display());
        Ok(Self {
            writer,
            _record: PhantomData,
        })
    }
}

impl<T: Serialize + Send> RecordSink<T> for CsvSink<T> {
    fn accept(&mut self, record: T) -> Result<()> {
        self.writer.serialize(record)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Drain product batches until the sentinel. Returns rows written.
pub async fn drain_products<S>(
    mut rx: Receiver<SinkMessage<Vec<ProductRecord>>>,
    mut sink: S,
) -> usize
where
    S: RecordSink<ProductRecord>,
{
    let mut written = 0usize;
    while let Some(message) = rx.recv().await {
        match message {
            SinkMessage::Data(batch) => {
                for record in batch {
                    match sink.accept(record) {
                        Ok(()) => written += 1,
                        Err(e) => error!("product sink write failed: {:#}", e),
                    }
                }
                if let Err(e) = sink.flush() {
                    error!("product sink flush failed: {:#}", e);
                }
            }
            SinkMessage::EndOfStream => break,
        }
    }
    info!(rows = written, "product sink closed");
    written
}

/// Drain performance records until the sentinel. Returns rows written.
pub async fn drain_performance<S>(
    mut rx: Receiver<SinkMessage<PerformanceRecord>>,
    mut sink: S,
) -> usize
where
    S: RecordSink<PerformanceRecord>,
{
    let mut written = 0usize;
    while let Some(message) = rx.recv().await {
        match message {
            SinkMessage::Data(record) => {
                match sink.accept(record) {
                    Ok(()) => written += 1,
                    Err(e) => error!("performance sink write failed: {:#}", e),
                }
                if let Err(e) = sink.flush() {
                    error!("performance sink flush failed: {:#}", e);
                }
            }
            SinkMessage::EndOfStream => break,
        }
    }
    info!(rows = written, "performance sink closed");
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Availability, RunStatus};
    use tokio::sync::mpsc;

    fn sample_record(id: &str) -> ProductRecord {
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
            store_id: "s1".into(),
            base_product_id: id.into(),
            shelf_life_in_hours: "48".into(),
            timestamp: "2025-01-01 00:00:00".into(),
            pincode_input: "560001".into(),
            clicked_label: "Bengaluru".into(),
        }
    }

    #[tokio::test]
    async fn csv_sink_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.csv");
        let sink = CsvSink::<ProductRecord>::create(&path).unwrap();

        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(drain_products(rx, sink));
        tx.send(SinkMessage::Data(vec![sample_record("a"), sample_record("b")]))
            .await
            .unwrap();
        tx.send(SinkMessage::EndOfStream).await.unwrap();
        assert_eq!(task.await.unwrap(), 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("Category,Subcategory,Item Name,Brand,Mrp,Price"));
        assert!(header.contains("Weight/pack_size"));
        assert_eq!(lines.count(), 2);
        assert!(contents.contains("In Stock"));
    }

    #[tokio::test]
    async fn performance_sink_stops_on_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.csv");
        let sink = CsvSink::<PerformanceRecord>::create(&path).unwrap();

        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(drain_performance(rx, sink));
        tx.send(SinkMessage::Data(PerformanceRecord {
            pincode: "560001".into(),
            status: RunStatus::Success,
            categories_scraped: 3,
            products_found: 120,
            start_time: "2025-01-01 00:00:00".into(),
            end_time: "2025-01-01 00:02:00".into(),
            duration_seconds: 120.0,
            error_message: String::new(),
        }))
        .await
        .unwrap();
        tx.send(SinkMessage::EndOfStream).await.unwrap();
        // Messages after the sentinel must not be consumed.
        assert_eq!(task.await.unwrap(), 1);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("Pincode,Status,Categories_Scraped,Products_Found"));
        assert!(contents.contains("Success"));
    }
}
