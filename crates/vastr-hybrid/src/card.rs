use serde::{Deserialize, Serialize};
use vastr_core::types::Product;

pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/400x600/cccccc/666666?text=No+Image";
const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Compact product summary shown next to image search hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCard {
    pub name: String,
    pub price: i64,
    pub image: String,
    pub link: String,
}

impl ProductCard {
    pub fn from_product(p: &Product) -> Self {
        let title = if p.title.is_empty() { "Unnamed Product" } else { p.title.as_str() };
        let name = if p.brand_name.is_empty() { title.to_string() } else { format!("{} - {}", p.brand_name, title) };
        let image = p.images.first().and_then(|img| card_image_url(&img.src)).unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());
        let link = if p.url.is_empty() { "#".to_string() } else { p.url.clone() };
        Self { name, price: p.price_min.trunc() as i64, image, link }
    }
}

/// Shopify CDN links often lack an extension; `.jpg` is appended then. Only http(s) URLs are kept.
pub fn card_image_url(src: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() { return None; }
    let lower = src.to_ascii_lowercase();
    let url = if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) { src.to_string() } else { format!("{src}.jpg") };
    (url.starts_with("http://") || url.starts_with("https://")).then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vastr_core::types::ImageDescriptor;

    #[test]
    fn image_urls_get_extension_and_scheme_checked() {
        assert_eq!(card_image_url(" https://cdn.shopify.com/a/b "), Some("https://cdn.shopify.com/a/b.jpg".into()));
        assert_eq!(card_image_url("https://x/y.WEBP"), Some("https://x/y.WEBP".into()));
        assert_eq!(card_image_url("//cdn.shopify.com/a.png"), None);
        assert_eq!(card_image_url(""), None);
    }

    #[test]
    fn card_fields() {
        let mut p = Product::new("7", "Lawn Suit");
        p.brand_name = "Nishat".into();
        p.price_min = 4999.9;
        let card = ProductCard::from_product(&p);
        assert_eq!(card.name, "Nishat - Lawn Suit");
        assert_eq!(card.price, 4999);
        assert_eq!(card.image, PLACEHOLDER_IMAGE);
        assert_eq!(card.link, "#");

        p.brand_name.clear();
        p.images = vec![ImageDescriptor { src: "http://img/1".into() }];
        let card = ProductCard::from_product(&p);
        assert_eq!(card.name, "Lawn Suit");
        assert_eq!(card.image, "http://img/1.jpg");
    }
}
