//! Lenient deserializers for catalog records.
//!
//! Retailer dumps are not consistent about field shapes: ids arrive as Shopify
//! integers or strings, tags as lists or comma-separated strings, images as
//! `{ "src": .. }` objects or bare URLs, and any of them may be `null`.

use serde::{Deserialize, Deserializer};

use crate::types::ImageDescriptor;

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Str(String),
    Int(i64),
    Float(f64),
}

impl StringOrNumber {
    fn into_string(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
        }
    }
}

pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(StringOrNumber::deserialize(d)?.into_string())
}

pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(d)?.map(StringOrNumber::into_string).unwrap_or_default())
}

pub fn price<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = Option::<StringOrNumber>::deserialize(d)?;
    Ok(match value {
        Some(StringOrNumber::Int(i)) => i as f64,
        Some(StringOrNumber::Float(f)) if f.is_finite() => f,
        Some(StringOrNumber::Str(s)) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    })
}

pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(false))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Tags {
    List(Vec<Option<String>>),
    Joined(String),
}

pub fn tags<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let tags = match Option::<Tags>::deserialize(d)? {
        None => Vec::new(),
        Some(Tags::List(list)) => list.into_iter().flatten().collect(),
        Some(Tags::Joined(s)) => s.split(',').map(str::to_string).collect(),
    };
    Ok(tags.into_iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImageEntry {
    Url(String),
    Object { src: Option<String> },
}

pub fn images<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ImageDescriptor>, D::Error> {
    let entries = Option::<Vec<Option<ImageEntry>>>::deserialize(d)?.unwrap_or_default();
    Ok(entries
        .into_iter()
        .flatten()
        .filter_map(|e| match e {
            ImageEntry::Url(src) => Some(src),
            ImageEntry::Object { src } => src,
        })
        .map(|src| ImageDescriptor { src })
        .collect())
}

#[cfg(test)]
mod tests {
    use crate::types::Product;

    #[test]
    fn accepts_loose_shapes() {
        let raw = r#"{
            "product_id": 8492810567879,
            "title": null,
            "tags": "lawn, summer,,embroidered",
            "price_min": "4000",
            "price_max": null,
            "available": null,
            "images": [{"src": "https://cdn.example/a"}, "https://cdn.example/b", {"alt": "x"}]
        }"#;
        let p: Product = serde_json::from_str(raw).unwrap();
        assert_eq!(p.product_id, "8492810567879");
        assert_eq!(p.title, "");
        assert_eq!(p.tags, vec!["lawn", "summer", "embroidered"]);
        assert_eq!(p.price_min, 4000.0);
        assert_eq!(p.price_max, 0.0);
        assert!(!p.available);
        assert_eq!(p.images.len(), 2);
        assert_eq!(p.currency, "PKR");
    }
}
