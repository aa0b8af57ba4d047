use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::StoreError;
use crate::store::VectorStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Loaded { rows: usize, dim: usize },
    Missing,
    Corrupt { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: FileStatus,
}

/// Outcome of loading the configured store files, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub files: Vec<FileReport>,
    pub rows: usize,
    /// Ids seen more than once across the concatenated files, sorted.
    pub duplicate_ids: Vec<String>,
}

impl LoadReport {
    pub fn loaded_files(&self) -> usize {
        self.files.iter().filter(|f| matches!(f.status, FileStatus::Loaded { .. })).count()
    }

    pub fn skipped_files(&self) -> usize { self.files.len() - self.loaded_files() }
}

/// Loads and concatenates every readable file. Missing and corrupt files are
/// skipped with a warning; a file whose dimension differs from the first
/// loaded file counts as corrupt. Rows are re-normalized. Duplicate ids are
/// reported, not removed. Returns `None` when no file loaded.
pub fn load_stores<P: AsRef<Path>>(paths: &[P]) -> (Option<VectorStore>, LoadReport) {
    let mut report = LoadReport::default();
    let mut merged: Option<VectorStore> = None;

    for path in paths {
        let path = path.as_ref();
        let status = if !path.exists() {
            tracing::warn!(path = %path.display(), "vector store file missing, skipping");
            FileStatus::Missing
        } else {
            match VectorStore::read(path).and_then(|store| append(&mut merged, store)) {
                Ok((rows, dim)) => {
                    tracing::info!(path = %path.display(), rows, dim, "vector store loaded");
                    FileStatus::Loaded { rows, dim }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "vector store unreadable, skipping");
                    FileStatus::Corrupt { reason: e.to_string() }
                }
            }
        };
        report.files.push(FileReport { path: path.to_path_buf(), status });
    }

    let Some(mut store) = merged else { return (None, report) };
    store.normalize_rows();
    report.rows = store.len();
    report.duplicate_ids = duplicate_ids(store.product_ids());
    if !report.duplicate_ids.is_empty() {
        tracing::warn!(count = report.duplicate_ids.len(), "duplicate product ids across vector stores");
    }
    (Some(store), report)
}

fn append(merged: &mut Option<VectorStore>, store: VectorStore) -> Result<(usize, usize), StoreError> {
    let shape = (store.len(), store.dim());
    match merged {
        Some(existing) => existing.extend(store)?,
        None => *merged = Some(store),
    }
    Ok(shape)
}

pub(crate) fn duplicate_ids(ids: &[String]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for id in ids { *counts.entry(id.as_str()).or_insert(0) += 1; }
    let mut dupes: Vec<String> = counts.into_iter().filter(|(_, n)| *n > 1).map(|(id, _)| id.to_string()).collect();
    dupes.sort();
    dupes
}
