//! Per-product searchable text. Field importance is expressed by repetition.

use vastr_core::types::Product;

use crate::normalize::normalize;

pub const TITLE_REPEAT: usize = 3;
pub const PRODUCT_TYPE_REPEAT: usize = 2;
pub const DESCRIPTION_CHARS: usize = 200;

/// Weighted, normalized text of one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchableDocument {
    pub text: String,
}

impl SearchableDocument {
    pub fn from_product(product: &Product) -> Self {
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(std::iter::repeat(product.title.as_str()).take(TITLE_REPEAT));
        parts.extend(std::iter::repeat(product.product_type.as_str()).take(PRODUCT_TYPE_REPEAT));
        parts.push(&product.brand_name);
        parts.extend(product.tags.iter().map(String::as_str));
        let description = truncate_chars(&product.description, DESCRIPTION_CHARS);
        parts.push(description);
        parts.push(&product.vendor);

        let joined = parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join(" ");
        Self { text: normalize(&joined) }
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.text.split_whitespace()
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub fn build_documents(products: &[Product]) -> Vec<SearchableDocument> {
    products.iter().map(SearchableDocument::from_product).collect()
}
