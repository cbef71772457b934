use serde::{Deserialize, Serialize};

/// Where a chunk sits in a document's heading outline.
///
/// `NonLeaf` nodes summarize a subtree whose rendered size exceeded the
/// non-leaf threshold; `Leaf` nodes sit under a heading with no
/// sub-headings; `NoHeading` is the degenerate case of a document with no
/// headings at all, split purely on size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    NonLeaf,
    Leaf,
    NoHeading,
}

/// Metadata carried alongside a chunk's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub doc_name: String,
    /// Slash-joined ancestor titles, e.g. "5G NR / 随机接入流程 / PRACH 信道".
    pub heading_path: String,
    pub node_type: NodeType,
    /// True for sub-chunks produced by intra-leaf splitting past the first piece.
    pub is_continuation: bool,
    /// Set when a non-leaf's subtree exceeded the summary threshold; `text`
    /// then equals this same string.
    pub parent_summary: Option<String>,
}

/// The atomic retrievable unit produced by ingestion and consumed by retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub vector_light: Option<Vec<f32>>,
    pub vector_dense: Option<Vec<f32>>,
    pub lex_tokens: Option<Vec<String>>,
}

impl Chunk {
    pub fn doc_id(&self) -> &str {
        &self.metadata.doc_id
    }
}

/// Tag for the retrieval stage that admitted a chunk into its result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Bm25,
    VectorLight,
    Rsf,
    Rerank,
}

/// A chunk plus the score and stage tag it was admitted under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub source: Source,
}

/// A role-tagged turn in a chat history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Where a chat answer ultimately came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    ExactCache,
    SemanticCache,
    Rag,
}

/// Validated shape of an inbound chat turn. Mirrors the original
/// `ChatRequest` validation bounds (non-empty query, sane history length).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurnRequest {
    pub user_id: String,
    pub session_id: String,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

fn default_top_k() -> usize {
    10
}

impl ChatTurnRequest {
    /// Input-invalid per §7: non-empty query within the documented length
    /// bound, top_k in range, ids within their length bound. Never
    /// retried — surfaced to the caller as a 422-shaped error.
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.is_empty() || self.user_id.chars().count() > 64 {
            return Err("user_id must be 1..=64 characters".to_string());
        }
        if self.session_id.is_empty() || self.session_id.chars().count() > 64 {
            return Err("session_id must be 1..=64 characters".to_string());
        }
        let query_len = self.query.chars().count();
        if query_len < 1 || query_len > 2000 {
            return Err("query must be 1..=2000 characters".to_string());
        }
        if self.top_k < 1 || self.top_k > 50 {
            return Err("top_k must be 1..=50".to_string());
        }
        Ok(())
    }
}

/// Outcome of a chat turn: the answer, what it cites, what queries were
/// actually run against the indexes, and where the answer came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub citations: Vec<String>,
    pub rewritten_queries: Vec<String>,
    pub source: AnswerSource,
}

/// The canonical "nothing retrieved" sentence — never fabricate an answer
/// when no chunk clears the rerank cutoff.
pub const NO_ANSWER_SENTENCE: &str = "根据当前已知知识库，暂时无法回答该问题";
