pub mod core;
pub mod input;
pub mod pipeline;
pub mod scraping;

// --- Primary core exports ---
pub use core::types;
pub use core::types::*;
pub use pipeline::orchestrator::{PipelineConfig, PipelineSummary, RunMode};
pub use pipeline::sinks::{CsvSink, RecordSink};
pub use scraping::{CatalogScraper, StoreScraper};
