//! vastr-vector
//!
//! Image embedding stores on disk, the load-time concatenation of several
//! stores, the explicit de-duplicating merge, and the exact similarity index
//! used by image search.

pub mod error;
pub mod index;
pub mod loader;
pub mod merge;
mod npz;
pub mod store;

pub use error::StoreError;
pub use index::{ImageIndex, ImageMatch};
pub use loader::{load_stores, FileReport, FileStatus, LoadReport};
pub use merge::{merge_stores, MergeOutcome, MergePolicy};
pub use store::{StoreFormat, StoreMetadata, VectorStore};
