//! Catalog snapshot loading.
//!
//! `JsonCatalog` reads the sync jobs' dumps: one JSON array file, one JSON-lines
//! file, or a directory of per-brand `*.json` / `*.jsonl` files. Records that do
//! not parse are skipped and listed in the [`CatalogReport`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::traits::CatalogStore;
use crate::types::Product;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    Malformed(String),
    DuplicateId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub source: String,
    /// 1-based line for JSON-lines, 0-based element for arrays.
    pub position: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogReport {
    pub files_read: usize,
    pub loaded: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Products in catalog order plus what was dropped on the way in.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub products: Vec<Product>,
    pub report: CatalogReport,
}

impl CatalogSnapshot {
    /// Builds a snapshot keeping the first occurrence of every identifier.
    pub fn from_records(records: Vec<(String, usize, Product)>, files_read: usize) -> Self {
        let mut seen = HashSet::new();
        let mut snapshot = CatalogSnapshot { products: Vec::new(), report: CatalogReport { files_read, ..Default::default() } };
        for (source, position, product) in records {
            if seen.insert(product.product_id.clone()) {
                snapshot.products.push(product);
            } else {
                snapshot.report.skipped.push(SkippedRecord { source, position, reason: SkipReason::DuplicateId(product.product_id) });
            }
        }
        snapshot.report.loaded = snapshot.products.len();
        snapshot
    }
}

pub struct JsonCatalog {
    path: PathBuf,
}

impl JsonCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }

    fn list_files(&self) -> Vec<PathBuf> {
        if self.path.is_file() { return vec![self.path.clone()]; }
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.path).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            if matches!(path.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) { files.push(path.to_path_buf()); }
        }
        files.sort();
        files
    }

    fn read_file(path: &Path, records: &mut Vec<(String, usize, Product)>, skipped: &mut Vec<SkippedRecord>) -> Result<()> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => {
                let bytes = fs::read(path).map_err(|e| Error::Catalog(format!("{}: {}", path.display(), e)))?;
                String::from_utf8_lossy(&bytes).to_string()
            }
        };
        let source = path.display().to_string();
        let mut push = |position: usize, parsed: std::result::Result<Product, String>| match parsed {
            Ok(product) => records.push((source.clone(), position, product)),
            Err(reason) => skipped.push(SkippedRecord { source: source.clone(), position, reason: SkipReason::Malformed(reason) }),
        };

        let is_lines = path.extension().and_then(|s| s.to_str()) == Some("jsonl");
        if !is_lines {
            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Array(items)) => {
                    for (i, item) in items.into_iter().enumerate() { push(i, serde_json::from_value(item).map_err(|e| e.to_string())); }
                    return Ok(());
                }
                Ok(item @ Value::Object(_)) => {
                    push(0, serde_json::from_value(item).map_err(|e| e.to_string()));
                    return Ok(());
                }
                // fall through and treat it as JSON-lines
                _ => {}
            }
        }
        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() { continue; }
            push(i + 1, serde_json::from_str(line).map_err(|e| e.to_string()));
        }
        Ok(())
    }
}

impl CatalogStore for JsonCatalog {
    fn list_all_products(&self) -> Result<CatalogSnapshot> {
        if !self.path.exists() {
            return Err(Error::Catalog(format!("catalog path {} does not exist", self.path.display())));
        }
        let files = self.list_files();
        let mut records = Vec::new();
        let mut skipped = Vec::new();
        for file in &files {
            tracing::debug!(file = %file.display(), "reading catalog file");
            Self::read_file(file, &mut records, &mut skipped)?;
        }
        let mut snapshot = CatalogSnapshot::from_records(records, files.len());
        skipped.append(&mut snapshot.report.skipped);
        snapshot.report.skipped = skipped;
        if !snapshot.report.skipped.is_empty() {
            tracing::warn!(skipped = snapshot.report.skipped.len(), "some catalog records were skipped");
        }
        tracing::info!(products = snapshot.products.len(), files = files.len(), "catalog snapshot loaded");
        Ok(snapshot)
    }
}

/// Fixed product list, used for fixtures and embedding callers.
#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    products: Vec<Product>,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self { Self { products } }
}

impl CatalogStore for InMemoryCatalog {
    fn list_all_products(&self) -> Result<CatalogSnapshot> {
        let records = self.products.iter().cloned().enumerate().map(|(i, p)| ("memory".to_string(), i, p)).collect();
        Ok(CatalogSnapshot::from_records(records, 0))
    }
}
