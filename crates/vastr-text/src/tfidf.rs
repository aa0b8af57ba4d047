//! Sparse TF-IDF vectors with cosine similarity.
//!
//! Analyzer: runs of at least two ASCII alphanumerics (apostrophes split
//! words), English stop words removed, then unigrams and bigrams over what is
//! left. The vocabulary is capped at the features with the highest corpus term
//! frequency. Weights are raw counts times the smoothed idf
//! `ln((1 + n) / (1 + df)) + 1`, rows are L2-normalized.

use std::collections::{HashMap, HashSet};

use crate::document::SearchableDocument;
use crate::stop_words::ENGLISH_STOP_WORDS;
use crate::{sort_hits, RankedHit};

pub const DEFAULT_MAX_FEATURES: usize = 5000;

struct Analyzer {
    stop_words: HashSet<String>,
}

impl Analyzer {
    fn new() -> Self {
        Self { stop_words: ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect() }
    }

    fn terms(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| w.len() >= 2 && !self.stop_words.contains(*w))
            .collect();
        let mut terms: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        terms.extend(words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
        terms
    }

    fn counts(&self, text: &str) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for term in self.terms(text) { *counts.entry(term).or_insert(0) += 1; }
        counts
    }
}

pub struct TfidfIndex {
    analyzer: Analyzer,
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
    /// feature -> (product position, normalized weight)
    postings: Vec<Vec<(u32, f32)>>,
    num_docs: usize,
}

impl TfidfIndex {
    pub fn fit(documents: &[SearchableDocument], max_features: usize) -> Self {
        let analyzer = Analyzer::new();
        let doc_counts: Vec<HashMap<String, u32>> = documents.iter().map(|d| analyzer.counts(&d.text)).collect();

        let mut corpus_tf: HashMap<&str, u64> = HashMap::new();
        let mut df: HashMap<&str, u32> = HashMap::new();
        for counts in &doc_counts {
            for (term, c) in counts {
                *corpus_tf.entry(term.as_str()).or_insert(0) += u64::from(*c);
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&str, u64)> = corpus_tf.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);
        let mut features: Vec<&str> = ranked.into_iter().map(|(t, _)| t).collect();
        features.sort_unstable();

        let n = documents.len() as f32;
        let vocabulary: HashMap<String, u32> = features.iter().enumerate().map(|(i, t)| (t.to_string(), i as u32)).collect();
        let idf: Vec<f32> = features
            .iter()
            .map(|t| ((1.0 + n) / (1.0 + df.get(t).copied().unwrap_or(0) as f32)).ln() + 1.0)
            .collect();

        let mut postings: Vec<Vec<(u32, f32)>> = vec![Vec::new(); features.len()];
        for (position, counts) in doc_counts.iter().enumerate() {
            let row = weigh(counts, &vocabulary, &idf);
            for (feature, weight) in row { postings[feature as usize].push((position as u32, weight)); }
        }

        tracing::debug!(docs = documents.len(), features = features.len(), "tf-idf index fitted");
        Self { analyzer, vocabulary, idf, postings, num_docs: documents.len() }
    }

    pub fn vocabulary_len(&self) -> usize { self.vocabulary.len() }

    pub fn contains_feature(&self, term: &str) -> bool { self.vocabulary.contains_key(term) }

    /// L2-normalized query vector; out-of-vocabulary terms are ignored.
    pub fn vectorize(&self, normalized_query: &str) -> Vec<(u32, f32)> {
        weigh(&self.analyzer.counts(normalized_query), &self.vocabulary, &self.idf)
    }

    /// Top `k` products by cosine similarity, positive scores only.
    pub fn search(&self, normalized_query: &str, k: usize) -> Vec<RankedHit> {
        if k == 0 || self.num_docs == 0 { return Vec::new(); }
        let query = self.vectorize(normalized_query);
        if query.is_empty() { return Vec::new(); }
        let mut scores = vec![0f32; self.num_docs];
        for (feature, qw) in query {
            for &(position, dw) in &self.postings[feature as usize] { scores[position as usize] += qw * dw; }
        }
        let mut hits: Vec<RankedHit> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .map(|(position, score)| RankedHit { position, score: score.min(1.0) })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        hits
    }
}

fn weigh(counts: &HashMap<String, u32>, vocabulary: &HashMap<String, u32>, idf: &[f32]) -> Vec<(u32, f32)> {
    let mut row: Vec<(u32, f32)> = counts
        .iter()
        .filter_map(|(term, c)| vocabulary.get(term).map(|&f| (f, *c as f32 * idf[f as usize])))
        .collect();
    let norm = row.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    if norm == 0.0 { return Vec::new(); }
    for (_, w) in &mut row { *w /= norm; }
    row.sort_unstable_by_key(|(f, _)| *f);
    row
}
