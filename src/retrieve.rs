//! Three-level hybrid retriever: L1 multi-query recall, L2 RSF fusion,
//! L3 cross-encoder rerank with cliff cutoff.
//!
//! Grounded on
//! `examples/original_source/.../retrieval/pipeline_retriever.py`. L1's
//! two sides (lexical vs. light-vector) and its multiple rewritten
//! queries run concurrently via `futures::future::join_all`, matching the
//! teacher's `tools/search/mod.rs` concurrent multi-engine fan-out idiom:
//! tolerate a single side's failure, continue with whatever the other
//! side returned.

use std::sync::Arc;

use futures::future::join_all;

use crate::core::config::Config;
use crate::core::types::{RetrievedChunk, Source};
use crate::embed::Embedder;
use crate::index::{LexicalIndex, VectorIndex};
use crate::nlp::fusion::{cross_encoder_score, rerank_cutoff, rsf_alpha_with, rsf_fuse};
use crate::store::ChunkStore;
use crate::text::tokenize;

pub struct Retriever {
    config: Arc<Config>,
    lexical_index: Arc<dyn LexicalIndex>,
    vector_index_light: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    chunk_store: ChunkStore,
}

impl Retriever {
    pub fn new(
        config: Arc<Config>,
        lexical_index: Arc<dyn LexicalIndex>,
        vector_index_light: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        chunk_store: ChunkStore,
    ) -> Self {
        Self {
            config,
            lexical_index,
            vector_index_light,
            embedder,
            chunk_store,
        }
    }

    pub async fn retrieve(&self, query: &str, rewritten_queries: &[String], top_k: usize) -> anyhow::Result<Vec<RetrievedChunk>> {
        let (lex_hits, vec_hits) = self.level1_recall(rewritten_queries).await;
        let fused = self.level2_fuse(query, &lex_hits, &vec_hits);
        let reranked = self.level3_rerank_and_cut(query, &fused, top_k).await;
        Ok(reranked)
    }

    /// For each rewritten query, run lexical and light-vector search
    /// concurrently; concatenate and dedupe each stream across queries,
    /// keeping the max score per id. A failure on one side for one query
    /// yields an empty list for that side/query rather than aborting the
    /// whole recall.
    async fn level1_recall(&self, rewritten_queries: &[String]) -> (Vec<(String, f32)>, Vec<(String, f32)>) {
        let top_k = self.config.level1_topk;

        let lex_futures = rewritten_queries.iter().map(|q| {
            let lexical_index = self.lexical_index.clone();
            let q = q.clone();
            async move {
                match lexical_index.search(&q, top_k).await {
                    Ok(hits) => hits,
                    Err(e) => {
                        tracing::warn!("L1 lexical search failed for '{q}': {e}");
                        Vec::new()
                    }
                }
            }
        });

        let vec_futures = rewritten_queries.iter().map(|q| {
            let vector_index = self.vector_index_light.clone();
            let embedder = self.embedder.clone();
            let q = q.clone();
            async move {
                let vector = embedder.embed_light(&q);
                match vector_index.search(&vector, top_k).await {
                    Ok(hits) => hits,
                    Err(e) => {
                        tracing::warn!("L1 vector search failed for '{q}': {e}");
                        Vec::new()
                    }
                }
            }
        });

        let (lex_results, vec_results) = tokio::join!(join_all(lex_futures), join_all(vec_futures));

        let lex_all: Vec<(String, f32)> = lex_results.into_iter().flatten().collect();
        let vec_all: Vec<(String, f32)> = vec_results.into_iter().flatten().collect();

        (dedup_max(lex_all), dedup_max(vec_all))
    }

    /// `L` is the token length of the *original* query, not the rewrites.
    fn level2_fuse(&self, original_query: &str, lex_hits: &[(String, f32)], vec_hits: &[(String, f32)]) -> Vec<(String, f32)> {
        let token_length = tokenize(original_query).len();
        let alpha = rsf_alpha_with(
            token_length,
            self.config.rsf_k,
            self.config.rsf_s,
            self.config.rsf_alpha_base,
            self.config.rsf_alpha_range,
        );
        rsf_fuse(lex_hits, vec_hits, alpha, self.config.level2_topk)
    }

    /// Resolve fused ids back to chunks (dropping any missing — an
    /// internal-invariant case per §7, never surfaced to the caller),
    /// score each with the cross-encoder reference function, sort
    /// descending, and apply the cliff cutoff.
    async fn level3_rerank_and_cut(&self, query: &str, fused: &[(String, f32)], top_k: usize) -> Vec<RetrievedChunk> {
        let ids: Vec<String> = fused.iter().map(|(id, _)| id.clone()).collect();
        let chunks = self.chunk_store.get_many(&ids).await;

        let mut scored: Vec<(crate::core::types::Chunk, f32)> = chunks
            .into_iter()
            .map(|chunk| {
                let score = cross_encoder_score(query, &chunk.text);
                (chunk, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let scored_pairs: Vec<(String, f32)> = scored.iter().map(|(c, s)| (c.chunk_id.clone(), *s)).collect();
        let cut = rerank_cutoff(&scored_pairs, self.config.rerank_diff_threshold, self.config.rerank_abs_floor, top_k);

        let admitted: std::collections::HashSet<&String> = cut.iter().map(|(id, _)| id).collect();
        scored
            .into_iter()
            .filter(|(chunk, _)| admitted.contains(&chunk.chunk_id))
            .map(|(chunk, score)| RetrievedChunk {
                chunk,
                score,
                source: Source::Rerank,
            })
            .collect()
    }
}

fn dedup_max(hits: Vec<(String, f32)>) -> Vec<(String, f32)> {
    let mut best: std::collections::HashMap<String, f32> = std::collections::HashMap::new();
    for (id, score) in hits {
        best.entry(id).and_modify(|s| *s = s.max(score)).or_insert(score);
    }
    best.into_iter().collect()
}
