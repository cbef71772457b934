//! The orchestrator: a construction-time record holding every capability
//! implementation, exposing the chat and ingestion entry points.
//!
//! Grounded on `examples/original_source/.../api/routes.py`'s `/chat`
//! handler for the query data-flow (exact cache -> semantic cache ->
//! session history -> rewrite -> retrieve -> generate -> write-back ->
//! summarize) and on the teacher's `core/app_state.rs` for the
//! construction-time container shape (`Arc`-shared capabilities behind a
//! single struct, built once at startup and cloned cheaply per request).

use std::sync::Arc;

use crate::budget::TokenBudgetTrimmer;
use crate::bus::{InMemoryMessageBus, MessageBus};
use crate::cache::{DistributedLock, ExactCache, SemanticCache, SessionHistory};
use crate::core::config::Config;
use crate::core::error::{RagError, RagResult};
use crate::core::types::{AnswerSource, ChatAnswer, ChatMessage, ChatTurnRequest};
use crate::embed::{DeterministicEmbedder, Embedder};
use crate::generate::{LlmGenerator, ANTI_HALLUCINATION_SYSTEM_PROMPT};
use crate::index::{FlatVectorIndex, InMemoryLexicalIndex, LexicalIndex, VectorIndex};
use crate::ingest::IngestionPipeline;
use crate::nlp::query_rewriter::QueryRewriter;
use crate::retrieve::Retriever;
use crate::store::ChunkStore;
use crate::summarize::SummarizationTrigger;

/// Every capability the chat and ingestion paths need, composed once at
/// startup. Cheap to clone: every field is an `Arc` or an already-`Clone`
/// handle, matching the teacher's `AppState` pattern.
#[derive(Clone)]
pub struct Engine {
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    exact_cache: Arc<ExactCache>,
    semantic_cache: Arc<SemanticCache>,
    session_history: Arc<SessionHistory>,
    distributed_lock: Arc<DistributedLock>,
    rewriter: Arc<QueryRewriter>,
    retriever: Arc<Retriever>,
    generator: Arc<dyn LlmGenerator>,
    ingestion: Arc<IngestionPipeline>,
    summarizer: Arc<SummarizationTrigger>,
    token_trimmer: Arc<TokenBudgetTrimmer>,
}

impl Engine {
    /// Construct every reference (in-process) capability implementation
    /// behind the shared trait seams and wire them into one `Engine`.
    /// A production deployment swaps any of the `Arc<dyn ...>` fields for
    /// a real backend without touching the chat/ingest orchestration.
    pub fn new(config: Config, generator: Arc<dyn LlmGenerator>) -> Self {
        let config = Arc::new(config);
        let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new(config.embedding_dim_light, config.embedding_dim_dense));
        let lexical_index: Arc<dyn LexicalIndex> = Arc::new(InMemoryLexicalIndex::new());
        let vector_index_light: Arc<dyn VectorIndex> = Arc::new(FlatVectorIndex::new());
        let vector_index_dense: Arc<dyn VectorIndex> = Arc::new(FlatVectorIndex::new());
        let chunk_store = ChunkStore::new();
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryMessageBus::new(1024));

        let session_history = Arc::new(SessionHistory::new(config.session_ttl_seconds));

        let ingestion = Arc::new(IngestionPipeline::new(
            config.clone(),
            embedder.clone(),
            bus,
            lexical_index.clone(),
            vector_index_light.clone(),
            vector_index_dense,
            chunk_store.clone(),
        ));

        let retriever = Arc::new(Retriever::new(
            config.clone(),
            lexical_index,
            vector_index_light,
            embedder.clone(),
            chunk_store,
        ));

        let summarizer = Arc::new(SummarizationTrigger::new(session_history.clone(), config.summarize_keep_recent));
        let token_trimmer = Arc::new(TokenBudgetTrimmer::new(config.token_budget_total));

        Self {
            exact_cache: Arc::new(ExactCache::new(config.cache_ttl_seconds)),
            semantic_cache: Arc::new(SemanticCache::new(config.cache_ttl_seconds, config.semantic_cache_threshold)),
            session_history,
            distributed_lock: Arc::new(DistributedLock::new()),
            rewriter: Arc::new(QueryRewriter::new()),
            retriever,
            generator,
            ingestion,
            summarizer,
            token_trimmer,
            embedder,
            config,
        }
    }

    pub fn ingestion(&self) -> &IngestionPipeline {
        &self.ingestion
    }

    /// Full online chat path, mirroring `/chat`'s data-flow exactly.
    ///
    /// Step order: validate input -> exact cache -> semantic cache ->
    /// session history -> rewrite -> three-level retrieve -> generate ->
    /// write-back (exact + semantic cache, session history) ->
    /// summarization trigger. Every step after validation is optional per
    /// the spec's propagation policy: a cache/history failure is logged
    /// and the turn proceeds as if that step had returned nothing. Only a
    /// total retrieval failure is `Catastrophic` and surfaces as an error.
    pub async fn chat_turn(&self, request: &ChatTurnRequest) -> RagResult<ChatAnswer> {
        request.validate().map_err(RagError::InvalidInput)?;

        if let Some(answer) = self.exact_cache.get(&request.query) {
            return Ok(ChatAnswer {
                answer,
                citations: Vec::new(),
                rewritten_queries: Vec::new(),
                source: AnswerSource::ExactCache,
            });
        }

        let query_vector = self.embedder.embed_light(&request.query);

        if let Some(answer) = self.semantic_cache.get(&query_vector).await {
            return Ok(ChatAnswer {
                answer,
                citations: Vec::new(),
                rewritten_queries: Vec::new(),
                source: AnswerSource::SemanticCache,
            });
        }

        let mut history = self.session_history.get(&request.user_id, &request.session_id).await;
        if history.is_empty() {
            history = request.history.clone();
        }

        let rewritten = self.rewriter.rewrite(&request.query, &history).await;

        let results = self
            .retriever
            .retrieve(&request.query, &rewritten, request.top_k)
            .await
            .map_err(|e| RagError::Catastrophic(format!("retrieval failed: {e}")))?;

        let trimmed_history = self
            .token_trimmer
            .trim_history(ANTI_HALLUCINATION_SYSTEM_PROMPT, &history, &request.query);
        let answer = self.generator.generate(&request.query, &results, &trimmed_history);
        let citations: Vec<String> = results.iter().map(|r| r.chunk.chunk_id.clone()).collect();

        self.exact_cache.set(&request.query, &answer);
        self.semantic_cache.set(&request.query, query_vector, &answer).await;
        self.session_history
            .push(&request.user_id, &request.session_id, ChatMessage::user(request.query.clone()))
            .await;
        self.session_history
            .push(&request.user_id, &request.session_id, ChatMessage::assistant(answer.clone()))
            .await;

        let summarizer = self.summarizer.clone();
        let user_id = request.user_id.clone();
        let session_id = request.session_id.clone();
        let trigger_budget = self.config.summarize_trigger_messages * 50; // rough token-per-message estimate
        tokio::spawn(async move {
            summarizer.maybe_summarize(&user_id, &session_id, trigger_budget).await;
        });

        Ok(ChatAnswer {
            answer,
            citations,
            rewritten_queries: rewritten,
            source: AnswerSource::Rag,
        })
    }

    /// Serialize concurrent chat turns against the same hot key (e.g. the
    /// same session), mirroring the spec's §4.L distributed-lock use: a
    /// caller that fails to acquire proceeds anyway rather than blocking,
    /// since the lock exists to reduce duplicate work, not to guarantee
    /// exclusivity.
    pub async fn chat_turn_serialized(&self, request: &ChatTurnRequest) -> RagResult<ChatAnswer> {
        let lock_name = format!("{}:{}", request.user_id, request.session_id);
        let acquired = self.distributed_lock.acquire(&lock_name, std::time::Duration::from_secs(10)).await;
        let result = self.chat_turn(request).await;
        if acquired {
            self.distributed_lock.release(&lock_name).await;
        }
        result
    }

    /// Explicit teardown: no `Drop` magic. Dropping the `Arc`s here simply
    /// releases this `Engine`'s share of each capability; an in-flight
    /// reference elsewhere (e.g. a spawned summarization task) keeps its
    /// own clone alive until it finishes.
    pub async fn shutdown(self) {
        tracing::info!("engine: shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::ReferenceGenerator;

    fn engine() -> Engine {
        Engine::new(Config::default(), Arc::new(ReferenceGenerator::new()))
    }

    #[tokio::test]
    async fn no_chunks_yields_no_answer_sentence() {
        let engine = engine();
        let request = ChatTurnRequest {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            query: "完全无关的问题内容测试".to_string(),
            top_k: 10,
            history: Vec::new(),
        };
        let answer = engine.chat_turn(&request).await.unwrap();
        assert_eq!(answer.source, AnswerSource::Rag);
        assert_eq!(answer.answer, crate::core::types::NO_ANSWER_SENTENCE);
    }

    #[tokio::test]
    async fn repeating_the_same_query_hits_the_exact_cache() {
        let engine = engine();
        let request = ChatTurnRequest {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            query: "随机接入流程是什么".to_string(),
            top_k: 10,
            history: Vec::new(),
        };
        let first = engine.chat_turn(&request).await.unwrap();
        assert_eq!(first.source, AnswerSource::Rag);

        let second = engine.chat_turn(&request).await.unwrap();
        assert_eq!(second.source, AnswerSource::ExactCache);
        assert_eq!(second.answer, first.answer);
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_any_retrieval() {
        let engine = engine();
        let request = ChatTurnRequest {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            query: String::new(),
            top_k: 10,
            history: Vec::new(),
        };
        let result = engine.chat_turn(&request).await;
        assert!(matches!(result, Err(RagError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn ingesting_then_querying_surfaces_a_citation_from_that_document() {
        let engine = engine();
        engine
            .ingestion()
            .ingest_direct("doc_001", "5G NR 随机接入流程", crate::corpus::DOC_001_RANDOM_ACCESS.content, "markdown")
            .await
            .unwrap();

        let request = ChatTurnRequest {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            query: "5G随机接入的四步流程是什么？".to_string(),
            top_k: 10,
            history: Vec::new(),
        };
        let answer = engine.chat_turn(&request).await.unwrap();
        assert!(answer.citations.iter().any(|id| id.starts_with("doc_001")));
    }
}
