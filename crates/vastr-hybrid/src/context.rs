use std::collections::HashMap;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use vastr_core::catalog::{CatalogReport, CatalogSnapshot};
use vastr_core::config::SearchSettings;
use vastr_core::traits::CatalogStore;
use vastr_core::types::{Product, ProductId};
use vastr_text::{build_documents, Bm25Index, QueryExpander, TfidfIndex};

/// Everything a text query reads: the catalog snapshot and both indices built
/// over it. Immutable once built; a reload builds a new one.
pub struct SearchContext {
    products: Vec<Product>,
    by_id: HashMap<ProductId, usize>,
    pub(crate) bm25: Bm25Index,
    pub(crate) tfidf: TfidfIndex,
    pub(crate) expander: QueryExpander,
    settings: SearchSettings,
    report: CatalogReport,
    built_at: DateTime<Utc>,
}

impl SearchContext {
    pub fn build(snapshot: CatalogSnapshot, settings: &SearchSettings) -> Result<Self> {
        let start = Instant::now();
        let CatalogSnapshot { products, report } = snapshot;
        let documents = build_documents(&products);
        let bm25 = Bm25Index::build(&documents)?;
        let tfidf = TfidfIndex::fit(&documents, settings.max_features);
        let by_id = products.iter().enumerate().map(|(i, p)| (p.product_id.clone(), i)).collect();
        tracing::info!(
            products = products.len(),
            features = tfidf.vocabulary_len(),
            skipped = report.skipped.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search context built"
        );
        if products.is_empty() { tracing::warn!("catalog snapshot is empty; text search will report no products indexed"); }
        Ok(Self {
            products,
            by_id,
            bm25,
            tfidf,
            expander: QueryExpander::new(),
            settings: settings.clone(),
            report,
            built_at: Utc::now(),
        })
    }

    pub fn from_store(store: &dyn CatalogStore, settings: &SearchSettings) -> Result<Self> {
        let snapshot = store.list_all_products()?;
        Self::build(snapshot, settings)
    }

    pub fn from_products(products: Vec<Product>, settings: &SearchSettings) -> Result<Self> {
        let records = products.into_iter().enumerate().map(|(i, p)| ("memory".to_string(), i, p)).collect();
        Self::build(CatalogSnapshot::from_records(records, 0), settings)
    }

    pub fn products(&self) -> &[Product] { &self.products }

    pub fn product(&self, id: &str) -> Option<&Product> { self.by_id.get(id).map(|&i| &self.products[i]) }

    pub fn len(&self) -> usize { self.products.len() }

    pub fn is_empty(&self) -> bool { self.products.is_empty() }

    pub fn vocabulary_len(&self) -> usize { self.tfidf.vocabulary_len() }

    pub fn settings(&self) -> &SearchSettings { &self.settings }

    pub fn report(&self) -> &CatalogReport { &self.report }

    pub fn built_at(&self) -> DateTime<Utc> { self.built_at }
}
