//! In-process BM25-like lexical index.
//!
//! Capability contract per the spec: `index`, `refresh`, `search`. A real
//! deployment plugs an inverted-index service (Elasticsearch/Tantivy)
//! behind the same trait; this reference implementation hand-rolls BM25
//! over per-field token frequencies with the documented field-boost
//! policy (text x3, heading x2, doc_name x1) so the crate has no
//! mandatory external dependency for its own tests and demo.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::types::Chunk;
use crate::text::tokenize;

const TEXT_BOOST: f32 = 3.0;
const HEADING_BOOST: f32 = 2.0;
const DOC_NAME_BOOST: f32 = 1.0;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

#[async_trait::async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Add or replace a chunk's posting-list entry. Idempotent on `chunk_id`.
    async fn index(&self, chunk: &Chunk) -> anyhow::Result<()>;

    /// Make freshly indexed chunks visible to `search`. The spec requires
    /// the index be searchable *only* after a refresh.
    async fn refresh(&self) -> anyhow::Result<()>;

    /// Multi-field BM25-like search, descending by score.
    async fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<(String, f32)>>;

    /// Whole-document removal (ingestion deletes are doc-scoped).
    async fn delete_doc(&self, doc_id: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
struct Document {
    doc_id: String,
    term_freqs: HashMap<String, f32>,
    length: f32,
}

/// Reference lexical index: a staged document map (pending vs. committed)
/// so `search` only ever sees chunks that went through `refresh`, plus an
/// aggregate term-frequency table for IDF.
#[derive(Default)]
struct Inner {
    committed: HashMap<String, Document>,
    pending: HashMap<String, Document>,
    avg_len: f32,
}

#[derive(Clone, Default)]
pub struct InMemoryLexicalIndex {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryLexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn weighted_term_freqs(chunk: &Chunk) -> (HashMap<String, f32>, f32) {
        let mut freqs: HashMap<String, f32> = HashMap::new();
        let mut length = 0.0f32;

        for field in [
            (chunk.text.as_str(), TEXT_BOOST),
            (chunk.metadata.heading_path.as_str(), HEADING_BOOST),
            (chunk.metadata.doc_name.as_str(), DOC_NAME_BOOST),
        ] {
            let (text, boost) = field;
            for token in tokenize(text) {
                *freqs.entry(token.to_lowercase()).or_insert(0.0) += boost;
                length += boost;
            }
        }
        (freqs, length)
    }
}

#[async_trait::async_trait]
impl LexicalIndex for InMemoryLexicalIndex {
    async fn index(&self, chunk: &Chunk) -> anyhow::Result<()> {
        let (term_freqs, length) = Self::weighted_term_freqs(chunk);
        let mut guard = self.inner.write().await;
        guard.pending.insert(
            chunk.chunk_id.clone(),
            Document {
                doc_id: chunk.metadata.doc_id.clone(),
                term_freqs,
                length,
            },
        );
        Ok(())
    }

    async fn refresh(&self) -> anyhow::Result<()> {
        let mut guard = self.inner.write().await;
        for (id, doc) in guard.pending.drain().collect::<Vec<_>>() {
            guard.committed.insert(id, doc);
        }
        let total: f32 = guard.committed.values().map(|d| d.length).sum();
        guard.avg_len = if guard.committed.is_empty() {
            0.0
        } else {
            total / guard.committed.len() as f32
        };
        Ok(())
    }

    async fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<(String, f32)>> {
        let guard = self.inner.read().await;
        if guard.committed.is_empty() {
            return Ok(Vec::new());
        }

        let query_terms: Vec<String> = tokenize(query).into_iter().map(|t| t.to_lowercase()).collect();
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let n = guard.committed.len() as f32;
        let mut doc_freq: HashMap<&str, f32> = HashMap::new();
        for term in &query_terms {
            let df = guard
                .committed
                .values()
                .filter(|d| d.term_freqs.contains_key(term))
                .count() as f32;
            doc_freq.insert(term.as_str(), df);
        }

        let mut scored: Vec<(String, f32)> = guard
            .committed
            .iter()
            .filter_map(|(chunk_id, doc)| {
                let mut score = 0.0f32;
                for term in &query_terms {
                    let tf = *doc.term_freqs.get(term).unwrap_or(&0.0);
                    if tf == 0.0 {
                        continue;
                    }
                    let df = *doc_freq.get(term.as_str()).unwrap_or(&0.0);
                    let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                    let denom = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * (doc.length / guard.avg_len.max(1.0)));
                    score += idf * (tf * (BM25_K1 + 1.0)) / denom.max(f32::EPSILON);
                }
                if score > 0.0 {
                    Some((chunk_id.clone(), score))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_doc(&self, doc_id: &str) -> anyhow::Result<()> {
        let mut guard = self.inner.write().await;
        guard.committed.retain(|_, d| d.doc_id != doc_id);
        guard.pending.retain(|_, d| d.doc_id != doc_id);
        Ok(())
    }
}
