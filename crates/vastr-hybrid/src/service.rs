//! Request-facing search service.
//!
//! Text and image search are gated independently: either can be unavailable
//! while the other keeps serving. Queries clone the current `Arc` and run
//! without holding a lock; `reload` builds a new text context off-lock and
//! swaps it in.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vastr_core::catalog::CatalogReport;
use vastr_core::config::{expand_path, Settings};
use vastr_core::traits::CatalogStore;
use vastr_core::types::{ProductId, ScoredProduct, SearchFilters, SearchInsights};
use vastr_embed::{get_default_embedder, ImageEmbedder, ImageExtractor, ImageInput};
use vastr_vector::{ImageIndex, LoadReport};

use crate::card::ProductCard;
use crate::context::SearchContext;
use crate::insights::compute_insights;
use crate::ranker::hybrid_search;

pub const SUGGEST_DEFAULT_LIMIT: usize = 5;
pub const SUGGEST_MAX_LIMIT: usize = 10;
pub const SUGGEST_MIN_CHARS: usize = 2;
pub const SIMILAR_DEFAULT_LIMIT: usize = 10;
pub const SIMILAR_MAX_LIMIT: usize = 50;
pub const SIMILAR_BM25_WEIGHT: f32 = 0.3;
pub const SIMILAR_COSINE_WEIGHT: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TextSearch,
    ImageSearch,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::TextSearch => "text search",
            Capability::ImageSearch => "image search",
        })
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{capability} not ready: {reason}")]
    Unavailable { capability: Capability, reason: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("failed to process image: {0}")]
    ImageProcessing(String),
}

impl ServiceError {
    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Unavailable { .. } => 503,
            ServiceError::InvalidInput(_) => 400,
            ServiceError::NotFound(_) => 404,
            ServiceError::ImageProcessing(_) => 500,
        }
    }
}

enum Slot<T> {
    Ready(Arc<T>),
    Unavailable(String),
}

impl<T> Slot<T> {
    fn get(&self, capability: Capability) -> Result<Arc<T>, ServiceError> {
        match self {
            Slot::Ready(v) => Ok(Arc::clone(v)),
            Slot::Unavailable(reason) => Err(ServiceError::Unavailable { capability, reason: reason.clone() }),
        }
    }

    fn reason(&self) -> Option<String> {
        match self {
            Slot::Ready(_) => None,
            Slot::Unavailable(reason) => Some(reason.clone()),
        }
    }
}

/// Loaded image index plus the extractor that produces its query vectors.
pub struct ImageSearch {
    index: ImageIndex,
    extractor: ImageExtractor,
    report: LoadReport,
}

impl ImageSearch {
    pub fn new(index: ImageIndex, extractor: ImageExtractor, report: LoadReport) -> Result<Self, String> {
        if !index.is_ready() { return Err("no image embeddings loaded".to_string()); }
        if index.dim() != extractor.dim() {
            return Err(format!("store dimension {} does not match encoder dimension {}", index.dim(), extractor.dim()));
        }
        Ok(Self { index, extractor, report })
    }

    pub fn index(&self) -> &ImageIndex { &self.index }

    pub fn report(&self) -> &LoadReport { &self.report }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub bm25_weight: Option<f32>,
    pub cosine_weight: Option<f32>,
    pub filters: SearchFilters,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self { Self { query: query.into(), ..Default::default() } }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn weights(mut self, bm25: f32, cosine: f32) -> Self {
        self.bm25_weight = Some(bm25);
        self.cosine_weight = Some(cosine);
        self
    }

    pub fn filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Found,
    NoMatches,
    NoProductsIndexed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub status: SearchStatus,
    pub query: String,
    pub expanded_query: String,
    pub total_results: usize,
    pub filters_applied: SearchFilters,
    pub products: Vec<ScoredProduct>,
    pub insights: SearchInsights,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestResponse {
    pub query: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarResponse {
    pub target_product_id: ProductId,
    pub target_product_title: String,
    pub similar_products: Vec<ScoredProduct>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageHit {
    pub product_id: ProductId,
    pub similarity: f32,
    /// `None` when the id is not in the current catalog snapshot.
    pub product: Option<ProductCard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageSearchResponse {
    pub total_results: usize,
    pub results: Vec<ImageHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub products_indexed: usize,
    pub vocabulary_size: usize,
    pub catalog_skipped: usize,
    pub built_at: Option<String>,
    pub text_ready: bool,
    pub text_unavailable_reason: Option<String>,
    pub image_rows: usize,
    pub image_store_files_loaded: usize,
    pub image_ready: bool,
    pub image_unavailable_reason: Option<String>,
}

pub struct SearchService {
    catalog: Arc<dyn CatalogStore>,
    settings: Settings,
    text: RwLock<Slot<SearchContext>>,
    image: RwLock<Slot<ImageSearch>>,
}

impl SearchService {
    /// Builds the text context. Image search starts unavailable until
    /// [`load_image`](Self::load_image) or [`attach_image`](Self::attach_image).
    pub fn new(catalog: Arc<dyn CatalogStore>, settings: Settings) -> Self {
        let text = match SearchContext::from_store(catalog.as_ref(), &settings.search) {
            Ok(ctx) => Slot::Ready(Arc::new(ctx)),
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "text search unavailable");
                Slot::Unavailable(format!("index build failed: {e:#}"))
            }
        };
        Self {
            catalog,
            settings,
            text: RwLock::new(text),
            image: RwLock::new(Slot::Unavailable("image index not loaded".to_string())),
        }
    }

    /// [`new`](Self::new) plus image initialization from the configured model and store files.
    pub fn start(catalog: Arc<dyn CatalogStore>, settings: Settings) -> Self {
        let service = Self::new(catalog, settings);
        match get_default_embedder(&service.settings.image) {
            Ok(embedder) => {
                if let Err(e) = service.load_image(embedder) { tracing::warn!(error = %e, "image search disabled"); }
            }
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "image model failed to load");
                *service.image.write() = Slot::Unavailable(format!("model not loaded: {e:#}"));
            }
        }
        service
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    /// Loads the configured store files for `embedder`. Fails, leaving image
    /// search unavailable, when no file could be loaded.
    pub fn load_image(&self, embedder: Arc<dyn ImageEmbedder>) -> Result<LoadReport, ServiceError> {
        let paths: Vec<_> = self.settings.image.store_files.iter().map(expand_path).collect();
        let (index, report) = ImageIndex::from_files(&paths);
        tracing::info!(files = report.loaded_files(), skipped = report.skipped_files(), rows = report.rows, "image stores loaded");
        let extractor = ImageExtractor::new(embedder, &self.settings.image);
        self.install_image(ImageSearch::new(index, extractor, report.clone()))?;
        Ok(report)
    }

    pub fn attach_image(&self, index: ImageIndex, embedder: Arc<dyn ImageEmbedder>) -> Result<(), ServiceError> {
        let extractor = ImageExtractor::new(embedder, &self.settings.image);
        self.install_image(ImageSearch::new(index, extractor, LoadReport::default()))
    }

    fn install_image(&self, image: Result<ImageSearch, String>) -> Result<(), ServiceError> {
        match image {
            Ok(image) => {
                *self.image.write() = Slot::Ready(Arc::new(image));
                Ok(())
            }
            Err(reason) => {
                *self.image.write() = Slot::Unavailable(reason.clone());
                Err(ServiceError::Unavailable { capability: Capability::ImageSearch, reason })
            }
        }
    }

    /// Rebuilds the text context from the catalog and swaps it in. On failure
    /// the previous context keeps serving.
    pub fn reload(&self) -> anyhow::Result<CatalogReport> {
        let ctx = SearchContext::from_store(self.catalog.as_ref(), &self.settings.search)?;
        let report = ctx.report().clone();
        *self.text.write() = Slot::Ready(Arc::new(ctx));
        tracing::info!(loaded = report.loaded, "text search context swapped");
        Ok(report)
    }

    pub fn text_context(&self) -> Result<Arc<SearchContext>, ServiceError> {
        self.text.read().get(Capability::TextSearch)
    }

    fn image_search_state(&self) -> Result<Arc<ImageSearch>, ServiceError> {
        self.image.read().get(Capability::ImageSearch)
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ServiceError> {
        let ctx = self.text_context()?;
        let s = &self.settings.search;
        let limit = resolve_limit(request.limit, s.default_limit, s.max_limit)?;
        let bm25_weight = resolve_weight("bm25_weight", request.bm25_weight, s.bm25_weight)?;
        let cosine_weight = resolve_weight("cosine_weight", request.cosine_weight, s.cosine_weight)?;
        let filters = &request.filters;
        if let (Some(min), Some(max)) = (filters.min_price, filters.max_price) {
            if min > max { return Err(ServiceError::InvalidInput(format!("min_price {min} exceeds max_price {max}"))); }
        }

        let query = request.query.trim();
        let ranking = if query.is_empty() {
            None
        } else {
            Some(hybrid_search(&ctx, query, limit, bm25_weight, cosine_weight, filters).map_err(|e| {
                tracing::error!(error = %format!("{e:#}"), "text search failed");
                ServiceError::Unavailable { capability: Capability::TextSearch, reason: format!("query failed: {e:#}") }
            })?)
        };
        let (expanded_query, products) = ranking.map(|r| (r.expanded_query, r.products)).unwrap_or_default();
        let status = if ctx.is_empty() {
            SearchStatus::NoProductsIndexed
        } else if products.is_empty() {
            SearchStatus::NoMatches
        } else {
            SearchStatus::Found
        };
        Ok(SearchResponse {
            status,
            query: request.query.clone(),
            expanded_query,
            total_results: products.len(),
            filters_applied: filters.clone(),
            insights: compute_insights(&products),
            products,
        })
    }

    pub fn image_search(&self, input: &ImageInput, limit: Option<usize>) -> Result<ImageSearchResponse, ServiceError> {
        let image = self.image_search_state()?;
        let limit = resolve_limit(limit, self.settings.image.default_limit, self.settings.search.max_limit)?;
        let vector = image.extractor.extract(input).map_err(|e| ServiceError::ImageProcessing(e.to_string()))?;
        let matches = image.index.query(&vector, limit).map_err(|e| ServiceError::ImageProcessing(e.to_string()))?;

        let ctx = self.text_context().ok();
        let results: Vec<ImageHit> = matches
            .into_iter()
            .map(|m| {
                let product = ctx.as_ref().and_then(|c| c.product(&m.product_id)).map(ProductCard::from_product);
                if product.is_none() { tracing::warn!(product_id = %m.product_id, "image hit not in catalog snapshot"); }
                ImageHit { product_id: m.product_id, similarity: m.similarity, product }
            })
            .collect();
        Ok(ImageSearchResponse { total_results: results.len(), results })
    }

    /// [`image_search`](Self::image_search) on the blocking pool.
    pub async fn image_search_async(self: &Arc<Self>, input: ImageInput, limit: Option<usize>) -> Result<ImageSearchResponse, ServiceError> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.image_search(&input, limit))
            .await
            .map_err(|e| ServiceError::ImageProcessing(format!("extraction task failed: {e}")))?
    }

    /// Titles containing `fragment` (case-insensitive), their brand-prefixed
    /// forms and matching product types, sorted.
    pub fn suggest(&self, fragment: &str, limit: Option<usize>) -> Result<SuggestResponse, ServiceError> {
        let fragment_trimmed = fragment.trim();
        if fragment_trimmed.chars().count() < SUGGEST_MIN_CHARS {
            return Err(ServiceError::InvalidInput(format!("query must be at least {SUGGEST_MIN_CHARS} characters")));
        }
        let limit = resolve_limit(limit, SUGGEST_DEFAULT_LIMIT, SUGGEST_MAX_LIMIT)?;
        let ctx = self.text_context()?;
        let needle = fragment_trimmed.to_lowercase();
        let mut found: BTreeSet<String> = BTreeSet::new();
        for p in ctx.products() {
            if p.title.to_lowercase().contains(&needle) {
                found.insert(p.title.clone());
                if !p.brand_name.is_empty() { found.insert(format!("{} {}", p.brand_name, p.title)); }
                if !p.product_type.is_empty() && p.product_type.to_lowercase().contains(&needle) {
                    found.insert(p.product_type.clone());
                }
            }
            if found.len() >= limit * 3 { break; }
        }
        Ok(SuggestResponse { query: fragment.to_string(), suggestions: found.into_iter().take(limit).collect() })
    }

    /// Products ranked against the target's title and type, target excluded.
    pub fn similar(&self, product_id: &str, limit: Option<usize>) -> Result<SimilarResponse, ServiceError> {
        let limit = resolve_limit(limit, SIMILAR_DEFAULT_LIMIT, SIMILAR_MAX_LIMIT)?;
        let ctx = self.text_context()?;
        let target = ctx.product(product_id).ok_or_else(|| ServiceError::NotFound(format!("product {product_id}")))?;
        let query = format!("{} {}", target.title, target.product_type);
        let ranking = hybrid_search(&ctx, &query, limit + 1, SIMILAR_BM25_WEIGHT, SIMILAR_COSINE_WEIGHT, &SearchFilters::default())
            .map_err(|e| ServiceError::Unavailable { capability: Capability::TextSearch, reason: format!("query failed: {e:#}") })?;
        let similar_products: Vec<ScoredProduct> =
            ranking.products.into_iter().filter(|p| p.product.product_id != product_id).take(limit).collect();
        Ok(SimilarResponse {
            target_product_id: product_id.to_string(),
            target_product_title: target.title.clone(),
            similar_products,
        })
    }

    pub fn stats(&self) -> ServiceStats {
        let text = self.text.read();
        let image = self.image.read();
        let (products_indexed, vocabulary_size, catalog_skipped, built_at) = match &*text {
            Slot::Ready(ctx) => (ctx.len(), ctx.vocabulary_len(), ctx.report().skipped.len(), Some(ctx.built_at().to_rfc3339())),
            Slot::Unavailable(_) => (0, 0, 0, None),
        };
        let (image_rows, image_store_files_loaded) = match &*image {
            Slot::Ready(img) => (img.index.len(), img.report.loaded_files()),
            Slot::Unavailable(_) => (0, 0),
        };
        ServiceStats {
            products_indexed,
            vocabulary_size,
            catalog_skipped,
            built_at,
            text_ready: text.reason().is_none(),
            text_unavailable_reason: text.reason(),
            image_rows,
            image_store_files_loaded,
            image_ready: image.reason().is_none(),
            image_unavailable_reason: image.reason(),
        }
    }
}

/// `0` is rejected; anything above `max` is capped.
fn resolve_limit(requested: Option<usize>, default: usize, max: usize) -> Result<usize, ServiceError> {
    match requested {
        Some(0) => Err(ServiceError::InvalidInput("limit must be at least 1".to_string())),
        Some(n) => Ok(n.min(max)),
        None => Ok(default.min(max)),
    }
}

fn resolve_weight(name: &str, requested: Option<f32>, default: f32) -> Result<f32, ServiceError> {
    let w = requested.unwrap_or(default);
    if !w.is_finite() || !(0.0..=1.0).contains(&w) {
        return Err(ServiceError::InvalidInput(format!("{name} must be within [0, 1], got {w}")));
    }
    Ok(w)
}
