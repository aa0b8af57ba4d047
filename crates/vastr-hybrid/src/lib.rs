//! vastr-hybrid
//!
//! Fuses the BM25 and TF-IDF rankings of `vastr-text` into one product
//! ranking, computes result insights, and exposes text search, image search,
//! suggestions and similar-product lookup through [`SearchService`].

pub mod card;
pub mod context;
pub mod insights;
pub mod ranker;
pub mod service;

pub use card::{card_image_url, ProductCard, PLACEHOLDER_IMAGE};
pub use context::SearchContext;
pub use insights::compute_insights;
pub use ranker::{hybrid_search, normalize_by_max, Ranking};
pub use service::{
    Capability, ImageHit, ImageSearch, ImageSearchResponse, SearchRequest, SearchResponse, SearchService, SearchStatus,
    ServiceError, ServiceStats, SimilarResponse, SuggestResponse,
};
