//! vastr-text
//!
//! Lexical side of product search: text normalization, query expansion, the
//! per-product searchable document, a tantivy BM25 index and a sparse TF-IDF
//! cosine index. Both indices address products by their position in the
//! snapshot they were built from.

pub mod document;
pub mod expand;
pub mod index;
pub mod normalize;
pub mod stop_words;
pub mod tantivy_utils;
pub mod tfidf;

pub use document::{build_documents, SearchableDocument};
pub use expand::QueryExpander;
pub use index::Bm25Index;
pub use normalize::{normalize, normalize_opt, tokens};
pub use tfidf::{TfidfIndex, DEFAULT_MAX_FEATURES};

/// A product position in the indexed snapshot and its raw index score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedHit {
    pub position: usize,
    pub score: f32,
}

/// Score descending, then position ascending.
pub fn sort_hits(hits: &mut [RankedHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.position.cmp(&b.position)));
}
