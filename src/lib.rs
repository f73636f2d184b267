// Batch analytics over traffic-incident exports.
//
// Raw rows go through validation, deduplication and enrichment, then a set
// of independent views (per-comuna, per-type, hourly, daily, composite
// keys, severity distribution, hotspots) is computed from the enriched set.
// Per-comuna risk scores and the safety index derived from them complete
// the run. Every view is handed to a [`output::ResultSink`].

pub mod aggregate;
pub mod config;
pub mod dedup;
pub mod enrich;
pub mod error;
pub mod hotspots;
pub mod loader;
pub mod output;
pub mod pipeline;
pub mod reports;
pub mod risk;
pub mod types;
pub mod util;

pub use config::PipelineConfig;
pub use error::{ConfigError, PipelineError, SinkError};
pub use output::{CsvDirSink, MemorySink, ResultSink, ViewName};
pub use pipeline::{analyze, run, run_records, AnalysisResults, RunReport};
