use anyhow::Result;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};

use crate::document::SearchableDocument;
use crate::tantivy_utils::{build_schema, register_tokenizer, POSITION_FIELD, TEXT_FIELD};
use crate::{sort_hits, RankedHit};

/// In-RAM tantivy index scored with BM25 over the synthesized product text.
///
/// Built once per snapshot and never written again; the searcher is taken at
/// build time so queries need no reload.
pub struct Bm25Index {
	searcher: Searcher,
	position_field: Field,
	text_field: Field,
	num_docs: usize,
}

impl Bm25Index {
	pub fn build(documents: &[SearchableDocument]) -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let position_field = schema.get_field(POSITION_FIELD)?;
		let text_field = schema.get_field(TEXT_FIELD)?;

		// one indexing thread keeps a single, deterministic segment layout
		let mut index_writer: IndexWriter = index.writer_with_num_threads(1, 50_000_000)?;
		for (position, d) in documents.iter().enumerate() {
			index_writer.add_document(doc!(
				position_field => position as u64,
				text_field => d.text.clone(),
			))?;
		}
		index_writer.commit()?;

		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		let searcher = reader.searcher();
		tracing::debug!(docs = documents.len(), "bm25 index built");
		Ok(Self { searcher, position_field, text_field, num_docs: documents.len() })
	}

	pub fn len(&self) -> usize { self.num_docs }

	pub fn is_empty(&self) -> bool { self.num_docs == 0 }

	/// Top `k` products by BM25 over `query_tokens` (already normalized).
	/// Repeated query tokens count once per occurrence. Non-positive scores are dropped.
	pub fn search(&self, query_tokens: &[&str], k: usize) -> Result<Vec<RankedHit>> {
		if k == 0 || self.num_docs == 0 || query_tokens.is_empty() { return Ok(Vec::new()); }
		let clauses: Vec<(Occur, Box<dyn Query>)> = query_tokens
			.iter()
			.map(|tok| {
				let term = Term::from_field_text(self.text_field, tok);
				(Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
			})
			.collect();
		let query = BooleanQuery::new(clauses);
		let top_docs = self.searcher.search(&query, &TopDocs::with_limit(k))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			if !score.is_finite() || score <= 0.0 { continue; }
			let doc: TantivyDocument = self.searcher.doc(addr)?;
			let position = doc
				.get_first(self.position_field)
				.and_then(|v| v.as_u64())
				.ok_or_else(|| anyhow::anyhow!("indexed document without position"))?;
			hits.push(RankedHit { position: position as usize, score });
		}
		sort_hits(&mut hits);
		Ok(hits)
	}
}
