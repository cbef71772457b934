//! Chunk store — the authoritative `chunk_id -> Chunk` mapping.
//!
//! Many readers (every retrieval call resolves ids back to full chunks),
//! one writer at a time (ingestion). Reads take a shared guard; bulk
//! writes take the write guard once per batch rather than per chunk, so
//! ingesting a large document doesn't thrash the lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::types::Chunk;

/// In-memory chunk store, `Arc`-shared across the engine and its indexes.
#[derive(Clone, Default)]
pub struct ChunkStore {
    inner: Arc<RwLock<HashMap<String, Chunk>>>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a batch of chunks under a single write guard.
    /// Overwriting an existing `chunk_id` is the mechanism that makes
    /// re-ingestion idempotent rather than duplicating.
    pub async fn put_batch(&self, chunks: impl IntoIterator<Item = Chunk>) {
        let mut guard = self.inner.write().await;
        for chunk in chunks {
            guard.insert(chunk.chunk_id.clone(), chunk);
        }
    }

    pub async fn get(&self, chunk_id: &str) -> Option<Chunk> {
        self.inner.read().await.get(chunk_id).cloned()
    }

    pub async fn get_many(&self, chunk_ids: &[String]) -> Vec<Chunk> {
        let guard = self.inner.read().await;
        chunk_ids.iter().filter_map(|id| guard.get(id).cloned()).collect()
    }

    /// Whole-document deletion: remove every chunk whose `doc_id` matches.
    /// Returns the number of chunks removed.
    pub async fn delete_doc(&self, doc_id: &str) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, chunk| chunk.doc_id() != doc_id);
        before - guard.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
