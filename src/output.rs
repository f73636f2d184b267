// Result sinks: the CSV directory layout and an in-memory sink.

use crate::error::SinkError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

/// Where a view is written: `<category>/<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewName {
    pub category: &'static str,
    pub name: &'static str,
}

impl ViewName {
    pub const fn new(category: &'static str, name: &'static str) -> Self {
        ViewName { category, name }
    }
}

impl std::fmt::Display for ViewName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

/// Receives each finished view and persists it verbatim, in the order and
/// column layout given.
pub trait ResultSink {
    fn write_view<T: Serialize>(&mut self, view: ViewName, rows: &[T]) -> Result<(), SinkError>;

    /// Side documents (run report, summary) that are not tabular.
    fn write_document<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), SinkError>;
}

fn write_rows<W: std::io::Write, T: Serialize>(
    wtr: W,
    rows: &[T],
    headers: bool,
) -> Result<W, SinkError> {
    let mut wtr = csv::WriterBuilder::new().has_headers(headers).from_writer(wtr);
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    wtr.into_inner().map_err(|e| SinkError::Io(e.into_error()))
}

/// Writes `<root>/<category>/<view>.csv` and `<root>/<name>.json`.
#[derive(Debug, Clone)]
pub struct CsvDirSink {
    root: PathBuf,
    headers: bool,
}

impl CsvDirSink {
    pub fn new(root: impl Into<PathBuf>, headers: bool) -> Self {
        CsvDirSink { root: root.into(), headers }
    }

    pub fn view_path(&self, view: ViewName) -> PathBuf {
        self.root.join(view.category).join(format!("{}.csv", view.name))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResultSink for CsvDirSink {
    fn write_view<T: Serialize>(&mut self, view: ViewName, rows: &[T]) -> Result<(), SinkError> {
        let path = self.view_path(view);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(&path)?;
        write_rows(file, rows, self.headers)?;
        log::debug!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }

    fn write_document<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.root)?;
        write_json(&self.root.join(format!("{}.json", name)), value)
    }
}

/// Keeps every view as CSV text in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub headers: bool,
    pub views: BTreeMap<String, String>,
    pub documents: BTreeMap<String, serde_json::Value>,
}

impl MemorySink {
    pub fn new(headers: bool) -> Self {
        MemorySink { headers, ..MemorySink::default() }
    }

    /// Data lines of a view (header excluded).
    pub fn lines(&self, view: ViewName) -> Vec<&str> {
        self.views
            .get(&view.to_string())
            .map(|text| text.lines().skip(usize::from(self.headers)).collect())
            .unwrap_or_default()
    }
}

impl ResultSink for MemorySink {
    fn write_view<T: Serialize>(&mut self, view: ViewName, rows: &[T]) -> Result<(), SinkError> {
        let buf = write_rows(Vec::new(), rows, self.headers)?;
        self.views.insert(view.to_string(), String::from_utf8_lossy(&buf).into_owned());
        Ok(())
    }

    fn write_document<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), SinkError> {
        self.documents.insert(name.to_string(), serde_json::to_value(value)?);
        Ok(())
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SinkError> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn preview_table<T>(title: &str, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{} ({} rows)\n", title, rows.len());
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}
