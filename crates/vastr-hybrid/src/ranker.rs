//! Weighted fusion of BM25 and TF-IDF cosine rankings.
//!
//! Each index yields at most `candidate_k` hits. Each hit set is divided by
//! its own maximum, so the best hit of either index scores exactly 1.0. The
//! fused score is `bm25_weight * bm25 + cosine_weight * cosine` with a missing
//! component counting as 0. Filters run after the global ranking and only
//! remove candidates.

use std::collections::HashMap;

use anyhow::Result;
use vastr_core::types::{ScoredProduct, SearchFilters};
use vastr_text::{normalize, tokens, RankedHit};

use crate::context::SearchContext;

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// Query text after optional expansion, before normalization.
    pub expanded_query: String,
    pub products: Vec<ScoredProduct>,
}

/// Position -> score / max score. Empty when there are no hits or the max is not positive.
pub fn normalize_by_max(hits: &[RankedHit]) -> HashMap<usize, f32> {
    let max = hits.iter().map(|h| h.score).fold(0f32, f32::max);
    if max <= 0.0 { return HashMap::new(); }
    hits.iter().map(|h| (h.position, h.score / max)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    position: usize,
    fused: f32,
    bm25: f32,
    cosine: f32,
}

/// Union in BM25 rank order, then cosine-only positions in cosine rank
/// order. The stable sort keeps that order among equal fused scores.
fn fuse(bm25_hits: &[RankedHit], cosine_hits: &[RankedHit], bm25_weight: f32, cosine_weight: f32) -> Vec<Candidate> {
    let bm25 = normalize_by_max(bm25_hits);
    let cosine = normalize_by_max(cosine_hits);
    let mut order: Vec<usize> = bm25_hits.iter().map(|h| h.position).filter(|p| bm25.contains_key(p)).collect();
    order.extend(cosine_hits.iter().map(|h| h.position).filter(|p| cosine.contains_key(p) && !bm25.contains_key(p)));

    let mut candidates: Vec<Candidate> = order
        .into_iter()
        .map(|position| {
            let b = bm25.get(&position).copied().unwrap_or(0.0);
            let c = cosine.get(&position).copied().unwrap_or(0.0);
            Candidate { position, fused: bm25_weight * b + cosine_weight * c, bm25: b, cosine: c }
        })
        .collect();
    candidates.sort_by(|a, b| b.fused.total_cmp(&a.fused));
    candidates
}

pub fn hybrid_search(
    ctx: &SearchContext,
    query: &str,
    top_k: usize,
    bm25_weight: f32,
    cosine_weight: f32,
    filters: &SearchFilters,
) -> Result<Ranking> {
    let expanded_query = if ctx.settings().expand_queries { ctx.expander.expand(query) } else { query.to_string() };
    if top_k == 0 || ctx.is_empty() {
        return Ok(Ranking { expanded_query, products: Vec::new() });
    }
    let normalized = normalize(&expanded_query);
    let candidate_k = ctx.settings().candidate_k;
    let bm25_hits = ctx.bm25.search(&tokens(&normalized), candidate_k)?;
    let cosine_hits = ctx.tfidf.search(&normalized, candidate_k);

    let products: Vec<ScoredProduct> = fuse(&bm25_hits, &cosine_hits, bm25_weight, cosine_weight)
        .into_iter()
        .filter_map(|c| {
            let product = &ctx.products()[c.position];
            filters.accepts(product).then(|| ScoredProduct {
                product: product.clone(),
                search_score: c.fused,
                bm25_score: c.bm25,
                cosine_score: c.cosine,
            })
        })
        .take(top_k)
        .collect();

    tracing::debug!(
        query,
        bm25_hits = bm25_hits.len(),
        cosine_hits = cosine_hits.len(),
        returned = products.len(),
        "hybrid search"
    );
    Ok(Ranking { expanded_query, products })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(v: &[(usize, f32)]) -> Vec<RankedHit> {
        v.iter().map(|&(position, score)| RankedHit { position, score }).collect()
    }

    #[test]
    fn max_normalization_guards_empty_and_zero() {
        assert!(normalize_by_max(&[]).is_empty());
        assert!(normalize_by_max(&hits(&[(0, 0.0)])).is_empty());
        let n = normalize_by_max(&hits(&[(3, 4.0), (1, 2.0)]));
        assert_eq!(n[&3], 1.0);
        assert_eq!(n[&1], 0.5);
    }

    #[test]
    fn fusion_weights_and_stable_ties() {
        let fused = fuse(&hits(&[(0, 2.0), (1, 1.0)]), &hits(&[(2, 0.5), (1, 0.5)]), 0.5, 0.5);
        let order: Vec<(usize, f32)> = fused.iter().map(|c| (c.position, c.fused)).collect();
        // 1 scores 0.25 + 0.5; 0 scores 0.5 and 2 scores 0.5: 0 came first in the union
        assert_eq!(order, vec![(1, 0.75), (0, 0.5), (2, 0.5)]);
        assert!(fused.iter().all(|c| (0.0..=1.0).contains(&c.fused)));
    }
}
