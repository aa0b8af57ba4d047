//! Vector store files. The primary format is a NumPy `.npz` archive with an
//! `embeddings` matrix `[N, D]` and the aligned `product_ids` array. A
//! `.safetensors` file with one F32 `embeddings` tensor and the ids as a JSON
//! array in the `product_ids` metadata entry is also accepted.

use std::collections::HashMap;
use std::path::Path;

use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use serde::{Deserialize, Serialize};
use vastr_core::types::ProductId;

use crate::error::{Result, StoreError};
use crate::npz;

pub const EMBEDDINGS_TENSOR: &str = "embeddings";
pub const PRODUCT_IDS_KEY: &str = "product_ids";
pub const CREATED_AT_KEY: &str = "created_at";
pub const VERSION_KEY: &str = "version";
pub const SOURCE_FILES_KEY: &str = "source_files";

/// Smallest norm a row is divided by.
pub const MIN_NORM: f32 = 1e-10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub created_at: Option<String>,
    pub version: Option<String>,
    pub source_files: Vec<String>,
}

impl StoreMetadata {
    /// Metadata for a store written now from `sources`.
    pub fn stamped(sources: Vec<String>) -> Self {
        Self {
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            source_files: sources,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFormat {
    #[default]
    Npz,
    Safetensors,
}

impl StoreFormat {
    /// `.safetensors` files are safetensors, everything else is npz.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("safetensors") => Self::Safetensors,
            _ => Self::Npz,
        }
    }

    pub fn sniff(bytes: &[u8]) -> Self {
        if npz::is_npz(bytes) { Self::Npz } else { Self::Safetensors }
    }
}

/// Row-major embeddings aligned with product ids.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStore {
    product_ids: Vec<ProductId>,
    data: Vec<f32>,
    dim: usize,
    pub metadata: StoreMetadata,
}

impl VectorStore {
    pub fn empty() -> Self {
        Self { product_ids: Vec::new(), data: Vec::new(), dim: 0, metadata: StoreMetadata::default() }
    }

    pub fn from_flat(product_ids: Vec<ProductId>, data: Vec<f32>, dim: usize) -> Result<Self> {
        if dim == 0 && !product_ids.is_empty() {
            return Err(StoreError::Invalid("zero embedding dimension".into()));
        }
        if product_ids.len() * dim != data.len() {
            return Err(StoreError::Invalid(format!(
                "{} ids but {} values for dimension {}", product_ids.len(), data.len(), dim
            )));
        }
        if let Some(pos) = data.iter().position(|x| !x.is_finite()) {
            let row = product_ids.get(pos / dim.max(1)).map_or("?", String::as_str);
            return Err(StoreError::Invalid(format!("non-finite value in embedding of {row}")));
        }
        Ok(Self { product_ids, data, dim, metadata: StoreMetadata::default() })
    }

    pub fn from_rows(product_ids: Vec<ProductId>, rows: Vec<Vec<f32>>) -> Result<Self> {
        if product_ids.len() != rows.len() {
            return Err(StoreError::Invalid(format!("{} ids for {} rows", product_ids.len(), rows.len())));
        }
        let dim = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != dim) {
            return Err(StoreError::DimensionMismatch { expected: dim, found: bad.len() });
        }
        Self::from_flat(product_ids, rows.concat(), dim)
    }

    pub fn len(&self) -> usize { self.product_ids.len() }

    pub fn is_empty(&self) -> bool { self.product_ids.is_empty() }

    pub fn dim(&self) -> usize { self.dim }

    pub fn product_ids(&self) -> &[ProductId] { &self.product_ids }

    pub fn row(&self, i: usize) -> &[f32] { &self.data[i * self.dim..(i + 1) * self.dim] }

    pub fn rows(&self) -> impl Iterator<Item = (&ProductId, &[f32])> {
        self.product_ids.iter().zip(self.data.chunks_exact(self.dim.max(1)))
    }

    /// Appends `other`; both must share a dimension unless one is empty.
    pub fn extend(&mut self, other: VectorStore) -> Result<()> {
        if other.is_empty() { return Ok(()); }
        if self.is_empty() {
            self.dim = other.dim;
        } else if other.dim != self.dim {
            return Err(StoreError::DimensionMismatch { expected: self.dim, found: other.dim });
        }
        self.product_ids.extend(other.product_ids);
        self.data.extend(other.data);
        Ok(())
    }

    /// Scales every row to unit L2 norm, dividing by at least [`MIN_NORM`].
    pub fn normalize_rows(&mut self) {
        if self.dim == 0 { return; }
        for row in self.data.chunks_exact_mut(self.dim) {
            let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt().max(MIN_NORM);
            for x in row.iter_mut() { *x /= norm; }
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
        Self::from_bytes(&bytes).map_err(|e| match e {
            StoreError::Invalid(reason) => StoreError::Format { path: path.to_path_buf(), reason },
            other => other,
        })
    }

    /// Parses either format, told apart by the leading bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match StoreFormat::sniff(bytes) {
            StoreFormat::Npz => npz::from_npz(bytes),
            StoreFormat::Safetensors => Self::from_safetensors(bytes),
        }
    }

    pub fn to_bytes(&self, format: StoreFormat) -> Result<Vec<u8>> {
        match format {
            StoreFormat::Npz => npz::to_npz(self),
            StoreFormat::Safetensors => self.to_safetensors(),
        }
    }

    fn from_safetensors(bytes: &[u8]) -> Result<Self> {
        let invalid = |e: safetensors::SafeTensorError| StoreError::Invalid(e.to_string());
        let (_, header) = SafeTensors::read_metadata(bytes).map_err(invalid)?;
        let info: HashMap<String, String> = header.metadata().clone().unwrap_or_default();
        let ids_json = info
            .get(PRODUCT_IDS_KEY)
            .ok_or_else(|| StoreError::Invalid(format!("missing {PRODUCT_IDS_KEY} metadata")))?;
        let product_ids: Vec<ProductId> =
            serde_json::from_str(ids_json).map_err(|e| StoreError::Invalid(format!("{PRODUCT_IDS_KEY}: {e}")))?;

        let tensors = SafeTensors::deserialize(bytes).map_err(invalid)?;
        let view = tensors.tensor(EMBEDDINGS_TENSOR).map_err(invalid)?;
        if view.dtype() != Dtype::F32 {
            return Err(StoreError::Invalid(format!("{EMBEDDINGS_TENSOR} must be F32, found {:?}", view.dtype())));
        }
        let (rows, dim) = match view.shape() {
            [rows, dim] => (*rows, *dim),
            other => return Err(StoreError::Invalid(format!("{EMBEDDINGS_TENSOR} must be 2-D, found {other:?}"))),
        };
        if rows != product_ids.len() {
            return Err(StoreError::Invalid(format!("{rows} rows but {} product ids", product_ids.len())));
        }
        let data: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let mut store = Self::from_flat(product_ids, data, dim)?;
        store.metadata = StoreMetadata {
            created_at: info.get(CREATED_AT_KEY).cloned(),
            version: info.get(VERSION_KEY).cloned(),
            source_files: info
                .get(SOURCE_FILES_KEY)
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default(),
        };
        Ok(store)
    }

    fn to_safetensors(&self) -> Result<Vec<u8>> {
        let raw: Vec<u8> = self.data.iter().flat_map(|x| x.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F32, vec![self.len(), self.dim], &raw)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        let json = |v: &[String]| serde_json::to_string(v).map_err(|e| StoreError::Invalid(e.to_string()));
        let mut info = HashMap::new();
        info.insert(PRODUCT_IDS_KEY.to_string(), json(&self.product_ids)?);
        if let Some(created_at) = &self.metadata.created_at { info.insert(CREATED_AT_KEY.to_string(), created_at.clone()); }
        if let Some(version) = &self.metadata.version { info.insert(VERSION_KEY.to_string(), version.clone()); }
        if !self.metadata.source_files.is_empty() {
            info.insert(SOURCE_FILES_KEY.to_string(), json(&self.metadata.source_files)?);
        }
        safetensors::serialize([(EMBEDDINGS_TENSOR, view)], &Some(info)).map_err(|e| StoreError::Invalid(e.to_string()))
    }

    /// Writes in the format named by the extension of `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes(StoreFormat::for_path(path))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }
        std::fs::write(path, bytes).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
        tracing::info!(path = %path.display(), rows = self.len(), dim = self.dim, "vector store written");
        Ok(())
    }
}
