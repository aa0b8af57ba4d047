//! Explicit de-duplicating merge of vector stores.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::store::VectorStore;

/// Which embedding survives when an id appears more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    #[default]
    FirstWins,
    LastWins,
    /// Fail unless every repeat carries the same vector.
    RejectOnConflict,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MergePolicy::FirstWins => "first-wins",
            MergePolicy::LastWins => "last-wins",
            MergePolicy::RejectOnConflict => "reject-on-conflict",
        })
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "first-wins" | "first" => Ok(MergePolicy::FirstWins),
            "last-wins" | "last" => Ok(MergePolicy::LastWins),
            "reject-on-conflict" | "reject" => Ok(MergePolicy::RejectOnConflict),
            other => Err(format!("unknown merge policy {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub store: VectorStore,
    /// Rows dropped as repeats.
    pub dropped: usize,
    /// Ids that had repeats, in first-seen order.
    pub duplicated: Vec<String>,
}

/// Concatenates `stores` in order keeping one row per id. Ids keep the
/// position of their first appearance; `policy` picks which vector they keep.
/// Repeats inside a single store are treated the same as across stores.
pub fn merge_stores(stores: &[VectorStore], policy: MergePolicy) -> Result<MergeOutcome> {
    let dim = stores.iter().find(|s| !s.is_empty()).map_or(0, VectorStore::dim);
    let mut order: Vec<String> = Vec::new();
    let mut chosen: HashMap<&str, &[f32]> = HashMap::new();
    let mut duplicated: Vec<String> = Vec::new();
    let mut dropped = 0usize;

    for store in stores.iter().filter(|s| !s.is_empty()) {
        if store.dim() != dim {
            return Err(StoreError::DimensionMismatch { expected: dim, found: store.dim() });
        }
        for (id, row) in store.rows() {
            match chosen.get_mut(id.as_str()) {
                None => {
                    chosen.insert(id.as_str(), row);
                    order.push(id.clone());
                }
                Some(current) => {
                    dropped += 1;
                    if !duplicated.contains(id) { duplicated.push(id.clone()); }
                    match policy {
                        MergePolicy::FirstWins => {}
                        MergePolicy::LastWins => *current = row,
                        MergePolicy::RejectOnConflict if *current != row => return Err(StoreError::Conflict(id.clone())),
                        MergePolicy::RejectOnConflict => {}
                    }
                }
            }
        }
    }

    let rows: Vec<Vec<f32>> = order.iter().map(|id| chosen.get(id.as_str()).map(|r| r.to_vec()).unwrap_or_default()).collect();
    let store = if rows.is_empty() { VectorStore::empty() } else { VectorStore::from_rows(order, rows)? };
    if dropped > 0 {
        tracing::info!(%policy, dropped, ids = duplicated.len(), "merged duplicate product ids");
    }
    Ok(MergeOutcome { store, dropped, duplicated })
}
