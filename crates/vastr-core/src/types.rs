//! Domain types shared by the text, image and hybrid engines.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::de;

pub type ProductId = String;

fn default_currency() -> String {
    "PKR".to_string()
}

/// Source URL of one product image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub src: String,
}

/// A catalog product as produced by the retailer sync jobs.
///
/// Only `product_id` is required. Every other field falls back to a default
/// (empty text, zero price, not available) so one sparse record never fails
/// a whole snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(alias = "id", deserialize_with = "de::id")]
    pub product_id: ProductId,
    #[serde(default, deserialize_with = "de::string")]
    pub title: String,
    #[serde(default, deserialize_with = "de::string")]
    pub brand_name: String,
    #[serde(default, deserialize_with = "de::string")]
    pub brand_id: String,
    #[serde(default, deserialize_with = "de::string")]
    pub product_type: String,
    #[serde(default, deserialize_with = "de::string")]
    pub vendor: String,
    #[serde(default, deserialize_with = "de::tags")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "de::string")]
    pub description: String,
    #[serde(default, deserialize_with = "de::price")]
    pub price_min: f64,
    #[serde(default, deserialize_with = "de::price")]
    pub price_max: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, deserialize_with = "de::flag")]
    pub available: bool,
    #[serde(default, deserialize_with = "de::string")]
    pub url: String,
    #[serde(default, deserialize_with = "de::images")]
    pub images: Vec<ImageDescriptor>,
}

impl Product {
    pub fn new(product_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            title: title.into(),
            brand_name: String::new(),
            brand_id: String::new(),
            product_type: String::new(),
            vendor: String::new(),
            tags: Vec::new(),
            description: String::new(),
            price_min: 0.0,
            price_max: 0.0,
            currency: default_currency(),
            available: false,
            url: String::new(),
            images: Vec::new(),
        }
    }
}

/// Post-ranking filters. `None`/`false` means the filter is inactive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    pub available_only: bool,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.brand_id.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
            && self.product_type.is_none()
            && !self.available_only
    }

    /// Price bounds are inclusive and compare against `price_min`.
    pub fn accepts(&self, product: &Product) -> bool {
        if let Some(brand) = &self.brand_id {
            if &product.brand_id != brand { return false; }
        }
        if let Some(min) = self.min_price {
            if product.price_min < min { return false; }
        }
        if let Some(max) = self.max_price {
            if product.price_min > max { return false; }
        }
        if let Some(ptype) = &self.product_type {
            if &product.product_type != ptype { return false; }
        }
        if self.available_only && !product.available { return false; }
        true
    }
}

/// A ranked product with its fused score and both normalized components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredProduct {
    #[serde(flatten)]
    pub product: Product,
    pub search_score: f32,
    pub bm25_score: f32,
    pub cosine_score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

/// Result-set statistics for the UI facets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchInsights {
    pub brands: HashMap<String, usize>,
    pub price_range: Option<PriceRange>,
    pub product_types: HashMap<String, usize>,
}
