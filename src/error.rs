use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a batch run.
///
/// Record-level problems are never surfaced here; they are counted in
/// [`crate::loader::LoadReport`] and the run carries on.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An input file could not be opened or read.
    #[error("Source unreadable: {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The input selection did not resolve to any file.
    #[error("No input files found in {0:?}")]
    NoInput(Vec<PathBuf>),

    /// Walking an input directory failed.
    #[error("Failed to list input directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Writing a view to the result sink failed.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// The configuration file could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by a [`crate::output::ResultSink`].
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value parsed but makes no sense (e.g. medium threshold above high).
    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}
