use vastr_core::types::{PriceRange, ScoredProduct, SearchInsights};

const UNKNOWN: &str = "Unknown";

fn label(value: &str) -> String {
    if value.is_empty() { UNKNOWN.to_string() } else { value.to_string() }
}

/// Facet counts and price span of a result list. Zero prices are ignored.
pub fn compute_insights(results: &[ScoredProduct]) -> SearchInsights {
    let mut insights = SearchInsights::default();
    for r in results {
        let p = &r.product;
        *insights.brands.entry(label(&p.brand_name)).or_insert(0) += 1;
        *insights.product_types.entry(label(&p.product_type)).or_insert(0) += 1;
        if p.price_min > 0.0 {
            let range = insights.price_range.get_or_insert(PriceRange { min: p.price_min, max: p.price_min });
            range.min = range.min.min(p.price_min);
            range.max = range.max.max(p.price_min);
        }
    }
    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use vastr_core::types::Product;

    fn scored(brand: &str, ptype: &str, price: f64) -> ScoredProduct {
        let mut p = Product::new("x", "t");
        p.brand_name = brand.into();
        p.product_type = ptype.into();
        p.price_min = price;
        ScoredProduct { product: p, search_score: 0.0, bm25_score: 0.0, cosine_score: 0.0 }
    }

    #[test]
    fn counts_and_price_span() {
        let insights = compute_insights(&[
            scored("Khaadi", "Kurta", 3000.0),
            scored("Khaadi", "", 0.0),
            scored("", "Kurta", 1200.0),
        ]);
        assert_eq!(insights.brands["Khaadi"], 2);
        assert_eq!(insights.brands["Unknown"], 1);
        assert_eq!(insights.product_types["Kurta"], 2);
        assert_eq!(insights.product_types["Unknown"], 1);
        assert_eq!(insights.price_range, Some(PriceRange { min: 1200.0, max: 3000.0 }));
    }

    #[test]
    fn unpriced_results_have_no_range() {
        assert_eq!(compute_insights(&[scored("A", "B", 0.0)]).price_range, None);
        assert_eq!(compute_insights(&[]), SearchInsights::default());
    }
}
