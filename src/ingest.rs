//! Ingestion pipeline: parse -> clean -> split -> publish -> consume ->
//! embed -> index.
//!
//! Grounded on `examples/original_source/.../ingestion/pipeline.py`
//! (`ingest_document`/`ingest_document_direct`) and its document-parser /
//! data-cleaner pair. `ingest` round-trips chunks through the message
//! bus; `ingest_direct` skips the bus entirely and is also the automatic
//! fallback `ingest` takes when `MessageBus::publish` fails, per the
//! spec's "a degraded bus forces `ingest_direct`".

use std::sync::Arc;
use std::time::Duration;

use crate::bus::{ChunkMessage, MessageBus};
use crate::chunk::HierarchicalChunkSplitter;
use crate::core::config::Config;
use crate::core::types::Chunk;
use crate::embed::Embedder;
use crate::index::{LexicalIndex, VectorIndex};
use crate::store::ChunkStore;
use crate::text::{clean, tokenize};

/// Unifies whatever source format a document arrives in into Markdown.
/// The reference implementation passes Markdown/plain-text through
/// untouched and does a Demo-grade HTML strip; richer formats (PDF/DOCX)
/// are a production extension point, not implemented here.
pub fn parse_to_markdown(raw_content: &str, file_type: &str) -> String {
    match file_type {
        "html" => strip_html(raw_content),
        _ => raw_content.to_string(),
    }
}

fn strip_html(html: &str) -> String {
    let heading_re = regex::Regex::new(r"(?is)<h([1-6])[^>]*>(.*?)</h\1>").unwrap();
    let after_headings = heading_re.replace_all(html, |caps: &regex::Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!("{} {}", "#".repeat(level), caps[2].trim())
    });

    let para_re = regex::Regex::new(r"(?is)<p[^>]*>(.*?)</p>").unwrap();
    let after_paras = para_re.replace_all(&after_headings, "$1\n");

    let br_re = regex::Regex::new(r"(?i)<br\s*/?>").unwrap();
    let after_br = br_re.replace_all(&after_paras, "\n");

    let tag_re = regex::Regex::new(r"<[^>]+>").unwrap();
    tag_re.replace_all(&after_br, "").trim().to_string()
}

pub struct IngestionPipeline {
    config: Arc<Config>,
    splitter: HierarchicalChunkSplitter,
    embedder: Arc<dyn Embedder>,
    bus: Arc<dyn MessageBus>,
    lexical_index: Arc<dyn LexicalIndex>,
    vector_index_light: Arc<dyn VectorIndex>,
    vector_index_dense: Arc<dyn VectorIndex>,
    chunk_store: ChunkStore,
}

impl IngestionPipeline {
    pub fn new(
        config: Arc<Config>,
        embedder: Arc<dyn Embedder>,
        bus: Arc<dyn MessageBus>,
        lexical_index: Arc<dyn LexicalIndex>,
        vector_index_light: Arc<dyn VectorIndex>,
        vector_index_dense: Arc<dyn VectorIndex>,
        chunk_store: ChunkStore,
    ) -> Self {
        let splitter = HierarchicalChunkSplitter::new(&config);
        Self {
            config,
            splitter,
            embedder,
            bus,
            lexical_index,
            vector_index_light,
            vector_index_dense,
            chunk_store,
        }
    }

    /// Full path: parse -> clean -> split -> publish -> poll -> embed + index.
    /// Falls back to [`Self::ingest_direct`] automatically when the bus
    /// publish leg fails (degraded-bus handling per the spec's §5).
    pub async fn ingest(&self, doc_id: &str, doc_name: &str, content: &str, file_type: &str) -> anyhow::Result<Vec<Chunk>> {
        let chunks = self.parse_clean_split(doc_id, doc_name, content, file_type);

        if let Err(e) = self.publish_all(&chunks).await {
            tracing::warn!("ingest: bus publish failed ({e}), falling back to ingest_direct");
            return self.embed_and_index(chunks).await;
        }

        if let Err(e) = self.bus.flush().await {
            tracing::warn!("ingest: bus flush failed ({e}), falling back to ingest_direct");
            return self.embed_and_index(chunks).await;
        }

        let messages = self.bus.poll(chunks.len().max(1), Duration::from_millis(200)).await.unwrap_or_default();

        if messages.is_empty() && !chunks.is_empty() {
            tracing::warn!("ingest: consumed no messages from bus, indexing original chunks directly");
            return self.embed_and_index(chunks).await;
        }

        let consumed: Vec<Chunk> = messages.into_iter().map(|m| m.chunk).collect();
        self.embed_and_index(consumed).await
    }

    /// Skip the bus entirely. Used directly by callers and as the
    /// automatic no-bus fallback inside [`Self::ingest`].
    pub async fn ingest_direct(&self, doc_id: &str, doc_name: &str, content: &str, file_type: &str) -> anyhow::Result<Vec<Chunk>> {
        let chunks = self.parse_clean_split(doc_id, doc_name, content, file_type);
        self.embed_and_index(chunks).await
    }

    /// Whole-document removal from every index and the chunk store.
    pub async fn delete_document(&self, doc_id: &str) -> anyhow::Result<()> {
        self.lexical_index.delete_doc(doc_id).await?;
        self.vector_index_light.delete_doc(doc_id).await?;
        self.vector_index_dense.delete_doc(doc_id).await?;
        self.chunk_store.delete_doc(doc_id).await;
        Ok(())
    }

    fn parse_clean_split(&self, doc_id: &str, doc_name: &str, content: &str, file_type: &str) -> Vec<Chunk> {
        let markdown = parse_to_markdown(content, file_type);
        let cleaned = clean(&markdown);
        let _ = &self.config; // config already baked into splitter at construction
        self.splitter.split(&cleaned, doc_id, doc_name)
    }

    async fn publish_all(&self, chunks: &[Chunk]) -> anyhow::Result<()> {
        for chunk in chunks {
            self.bus.publish(ChunkMessage { chunk: chunk.clone() }).await?;
        }
        Ok(())
    }

    /// Embed light+dense, tokenize for the lexical index, write to both
    /// indexes and the chunk store, then make the writes searchable.
    /// Idempotent on `chunk_id`: re-running this for the same id
    /// overwrites rather than duplicating, in every index and the store.
    async fn embed_and_index(&self, mut chunks: Vec<Chunk>) -> anyhow::Result<Vec<Chunk>> {
        for chunk in chunks.iter_mut() {
            let light = self.embedder.embed_light(&chunk.text);
            let dense = self.embedder.embed_dense(&chunk.text);
            chunk.lex_tokens = Some(tokenize(&chunk.text));

            self.lexical_index.index(chunk).await?;
            self.vector_index_light.insert(&chunk.chunk_id, chunk.doc_id(), light.clone()).await?;
            self.vector_index_dense.insert(&chunk.chunk_id, chunk.doc_id(), dense.clone()).await?;

            chunk.vector_light = Some(light);
            chunk.vector_dense = Some(dense);
        }

        self.lexical_index.refresh().await?;
        self.vector_index_light.flush().await?;
        self.vector_index_dense.flush().await?;
        self.chunk_store.put_batch(chunks.clone()).await;

        Ok(chunks)
    }
}
