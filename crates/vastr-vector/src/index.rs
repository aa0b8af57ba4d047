use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vastr_core::types::ProductId;

use crate::error::{Result, StoreError};
use crate::loader::{load_stores, LoadReport};
use crate::store::VectorStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMatch {
    pub product_id: ProductId,
    pub similarity: f32,
}

/// Exact dot-product search over unit-normalized image embeddings.
pub struct ImageIndex {
    store: VectorStore,
    first_row: HashMap<ProductId, usize>,
}

impl ImageIndex {
    /// Wraps `store`, re-normalizing its rows.
    pub fn new(mut store: VectorStore) -> Self {
        store.normalize_rows();
        let mut first_row = HashMap::with_capacity(store.len());
        for (i, id) in store.product_ids().iter().enumerate() { first_row.entry(id.clone()).or_insert(i); }
        Self { store, first_row }
    }

    /// Loads the configured files in order. The index is empty (not ready)
    /// when none of them could be read.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> (Self, LoadReport) {
        let (store, report) = load_stores(paths);
        let store = store.unwrap_or_else(VectorStore::empty);
        (Self::new(store), report)
    }

    pub fn empty() -> Self { Self::new(VectorStore::empty()) }

    pub fn is_ready(&self) -> bool { !self.store.is_empty() }

    pub fn len(&self) -> usize { self.store.len() }

    pub fn is_empty(&self) -> bool { self.store.is_empty() }

    pub fn dim(&self) -> usize { self.store.dim() }

    /// Stored embedding of `product_id` (its first row when repeated).
    pub fn vector_for(&self, product_id: &str) -> Option<&[f32]> {
        self.first_row.get(product_id).map(|&i| self.store.row(i))
    }

    /// The `limit` most similar rows, similarity descending, ties by stored order.
    pub fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<ImageMatch>> {
        if !self.is_ready() { return Err(StoreError::NotReady); }
        if vector.len() != self.dim() {
            return Err(StoreError::DimensionMismatch { expected: self.dim(), found: vector.len() });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(StoreError::Invalid("query embedding has non-finite values".into()));
        }
        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| (i, self.store.row(i).iter().zip(vector).map(|(a, b)| a * b).sum::<f32>()))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(limit);
        Ok(scored
            .into_iter()
            .map(|(i, similarity)| ImageMatch { product_id: self.store.product_ids()[i].clone(), similarity })
            .collect())
    }
}
