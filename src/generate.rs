//! Answer generation: the external-LLM seam plus a reference generator
//! that assembles an answer directly from retrieved chunk text.
//!
//! Grounded on `examples/original_source/.../generation/llm_generator.py`.
//! The anti-hallucination system prompt and context-block shape are
//! carried over verbatim; the real model call is an explicit Non-goal,
//! so [`ReferenceGenerator`] plays the same role `MockLLMGenerator` plays
//! in the original — it exercises the full prompt-assembly path without
//! calling out to anything.

use crate::core::types::{ChatMessage, RetrievedChunk, NO_ANSWER_SENTENCE};

pub const ANTI_HALLUCINATION_SYSTEM_PROMPT: &str = "\
你是一个严谨的无线通信技术专家。请仅基于以下<context>和</context>标签内部的参考资料回答问题。
如果参考资料中不包含相关答案，请输出标准回复：“根据当前已知知识库，暂时无法回答该问题”。
严禁捏造不存在的术语、协议编号与事实。
在表述关键论点后必须添加引用标记，格式为 [chunk_id]。
回答要求：
1. 结构清晰，使用标题和列表组织内容
2. 关键技术点必须附带引用来源
3. 如果多个参考资料有互补信息，需综合整理
4. 输出语言与用户提问语言保持一致";

/// The external generator's output shape: core only consumes this, never
/// the prompt or the model call that produced it.
pub trait LlmGenerator: Send + Sync {
    /// Produce a complete answer for `query` given the admitted chunks and
    /// the (already budget-trimmed) history. Streaming to the caller is an
    /// explicit Non-goal at this layer — a real service wraps this in its
    /// own SSE loop the way the teacher's `proxy_manager` wraps a blocking
    /// call in a stream adapter at its own boundary.
    fn generate(&self, query: &str, chunks: &[RetrievedChunk], history: &[ChatMessage]) -> String;
}

/// Wraps `context_chunks` into the `<context>` block the system prompt
/// refers to. Exposed so a real generator can reuse the exact framing.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    let parts: Vec<String> = chunks.iter().map(|r| format!("[{}] {}", r.chunk.chunk_id, r.chunk.text)).collect();
    format!("<context>\n{}\n</context>", parts.join("\n---\n"))
}

/// Assembles the full message list a real LLM call would receive:
/// system prompt, trimmed history, then a user turn carrying the context
/// block and the query.
pub fn build_messages(query: &str, context: &str, trimmed_history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(ANTI_HALLUCINATION_SYSTEM_PROMPT)];
    messages.extend(trimmed_history.iter().cloned());
    messages.push(ChatMessage::user(format!("参考资料：\n{context}\n\n问题：{query}")));
    messages
}

/// No real model behind this: assembles an answer straight from the
/// retrieved chunks' text, citing each one, exactly as `_mock_generate`
/// does in the original. Used as the demo binary's default generator.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGenerator;

impl ReferenceGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl LlmGenerator for ReferenceGenerator {
    fn generate(&self, query: &str, chunks: &[RetrievedChunk], _history: &[ChatMessage]) -> String {
        if chunks.is_empty() {
            return NO_ANSWER_SENTENCE.to_string();
        }

        let mut parts = vec![format!("关于「{query}」，根据检索到的资料回答如下：\n")];

        for (i, retrieved) in chunks.iter().take(5).enumerate() {
            let text = retrieved.chunk.text.trim();
            let snippet: String = text.chars().take(200).collect();
            let snippet = if text.chars().count() > 200 { format!("{snippet}...") } else { snippet };
            let heading = if retrieved.chunk.metadata.heading_path.is_empty() {
                &retrieved.chunk.metadata.doc_name
            } else {
                &retrieved.chunk.metadata.heading_path
            };
            parts.push(format!("**{}. {heading}**\n{snippet} [{}]\n", i + 1, retrieved.chunk.chunk_id));
        }

        parts.push("\n以上信息均来源于检索到的参考资料，如需更详细信息请进一步查阅原文档。".to_string());
        parts.join("\n")
    }
}
