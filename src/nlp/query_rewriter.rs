//! Query rewriting: reference resolution + abbreviation expansion +
//! paraphrase, with an external-LLM strategy defined as a seam only (the
//! LLM call itself is an explicit Non-goal).
//!
//! Grounded on `examples/original_source/.../generation/query_rewriter.py`
//! — the pronoun list, the abbreviation table, and the paraphrase swaps
//! are carried over verbatim as Rust data.

use crate::core::types::ChatMessage;

/// Parsed shape of a model-backed rewrite response. Kept even though no
/// implementation calls it here — it's the contract a generator crate
/// fills in.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ModelRewriteResponse {
    pub resolved_query: String,
    #[serde(default)]
    pub expanded_queries: Vec<String>,
}

/// The model-backed rewrite strategy's external seam: "we only define the
/// contract" per the spec's scope. A real implementation posts
/// `SYSTEM_PROMPT` + the last <=4 history turns to an LLM and parses its
/// JSON reply into [`ModelRewriteResponse`].
#[async_trait::async_trait]
pub trait LlmRewriteClient: Send + Sync {
    async fn rewrite(&self, query: &str, history: &[ChatMessage]) -> anyhow::Result<ModelRewriteResponse>;
}

const PRONOUNS: &[&str] = &["它", "这个", "那个", "该技术", "该方案", "这种", "那种", "上述"];

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("CA", "载波聚合"),
    ("MIMO", "多输入多输出"),
    ("PRACH", "物理随机接入信道"),
    ("HARQ", "混合自动重传请求"),
    ("RRC", "无线资源控制"),
    ("NR", "New Radio"),
    ("gNB", "gNodeB 基站"),
    ("SSB", "同步信号块"),
    ("BWP", "带宽部分"),
    ("UE", "用户设备"),
    ("DCI", "下行控制信息"),
    ("RAR", "随机接入响应"),
    ("RACH", "随机接入信道"),
    ("PDCCH", "物理下行控制信道"),
    ("PDSCH", "物理下行共享信道"),
];

const PARAPHRASES: &[(&str, &str)] = &[
    ("是什么", "的定义和概念"),
    ("怎么工作", "的工作原理"),
    ("有什么优势", "的优点和好处"),
    ("有什么区别", "之间的差异对比"),
    ("如何配置", "的配置方法和步骤"),
];

/// Produces 1-3 rewritten queries for a turn, original query always first.
pub struct QueryRewriter {
    llm: Option<Box<dyn LlmRewriteClient>>,
}

impl Default for QueryRewriter {
    fn default() -> Self {
        Self { llm: None }
    }
}

impl QueryRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm_client(llm: Box<dyn LlmRewriteClient>) -> Self {
        Self { llm: Some(llm) }
    }

    /// Try the model-backed strategy first (if configured), falling back
    /// to the rule-based strategy when no client is set, the call errors,
    /// or the response is empty. Matches the spec's "model unavailable or
    /// parsing fails" fallback trigger.
    pub async fn rewrite(&self, query: &str, history: &[ChatMessage]) -> Vec<String> {
        if let Some(client) = &self.llm {
            match client.rewrite(query, history).await {
                Ok(resp) if !resp.resolved_query.trim().is_empty() => {
                    let mut queries = vec![query.to_string()];
                    if resp.resolved_query != query {
                        queries.push(resp.resolved_query);
                    }
                    for q in resp.expanded_queries {
                        if !queries.contains(&q) {
                            queries.push(q);
                        }
                    }
                    queries.truncate(3);
                    return queries;
                }
                Ok(_) => {
                    tracing::warn!("query rewriter: model returned empty resolved_query, falling back to rules");
                }
                Err(e) => {
                    tracing::warn!("query rewriter: model call failed ({e}), falling back to rules");
                }
            }
        }
        Self::rewrite_rule_based(query, history)
    }

    /// The deterministic fallback: reference resolution, abbreviation
    /// expansion, paraphrase — each tried in order, deduplicated, capped
    /// at 3, original always first.
    pub fn rewrite_rule_based(query: &str, history: &[ChatMessage]) -> Vec<String> {
        let mut queries = vec![query.to_string()];

        if let Some(resolved) = Self::resolve_references(query, history) {
            if resolved != query {
                queries.push(resolved);
            }
        }

        if let Some(expanded) = Self::expand_abbreviations(query) {
            if expanded != query && !queries.contains(&expanded) {
                queries.push(expanded);
            }
        }

        if let Some(paraphrased) = Self::paraphrase(query) {
            if !queries.contains(&paraphrased) {
                queries.push(paraphrased);
            }
        }

        queries.truncate(3);
        queries
    }

    fn resolve_references(query: &str, history: &[ChatMessage]) -> Option<String> {
        let has_pronoun = PRONOUNS.iter().any(|p| query.contains(p));
        if !has_pronoun {
            return None;
        }

        let last_topic = history
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::core::types::Role::User))
            .map(|m| extract_topic(&m.content))?;

        let mut resolved = query.to_string();
        for pronoun in PRONOUNS {
            resolved = resolved.replace(pronoun, &last_topic);
        }
        Some(resolved)
    }

    fn expand_abbreviations(query: &str) -> Option<String> {
        let mut expanded = query.to_string();
        for (abbr, full) in ABBREVIATIONS {
            if expanded.contains(abbr) {
                expanded = expanded.replace(abbr, &format!("{abbr}({full})"));
            }
        }
        if expanded != query {
            Some(expanded)
        } else {
            None
        }
    }

    fn paraphrase(query: &str) -> Option<String> {
        for (old, new) in PARAPHRASES {
            if query.contains(old) {
                return Some(query.replace(old, new));
            }
        }
        None
    }
}

/// Substring before 是什么/有什么/怎么/如何, or the first 20 characters.
fn extract_topic(content: &str) -> String {
    for marker in ["是什么", "有什么", "怎么", "如何"] {
        if let Some(idx) = content.find(marker) {
            let topic = content[..idx].trim();
            if !topic.is_empty() {
                return topic.to_string();
            }
        }
    }
    content.chars().take(20).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ChatMessage;

    #[test]
    fn original_query_always_first() {
        let out = QueryRewriter::rewrite_rule_based("CA是什么", &[]);
        assert_eq!(out[0], "CA是什么");
    }

    #[test]
    fn abbreviation_expansion_appends_full_form() {
        let out = QueryRewriter::rewrite_rule_based("CA是什么", &[]);
        assert!(out.iter().any(|q| q.contains("载波聚合")));
    }

    #[test]
    fn pronoun_is_resolved_from_last_user_turn() {
        let history = vec![ChatMessage::user("载波聚合是什么"), ChatMessage::assistant("载波聚合是...")];
        let out = QueryRewriter::rewrite_rule_based("它有什么优势", &history);
        assert!(out.iter().any(|q| q.contains("载波聚合") && !q.contains("它")));
    }

    #[test]
    fn output_is_capped_at_three_and_deduplicated() {
        let history = vec![ChatMessage::user("载波聚合是什么")];
        let out = QueryRewriter::rewrite_rule_based("它是什么", &history);
        assert!(out.len() <= 3);
        let unique: std::collections::HashSet<_> = out.iter().collect();
        assert_eq!(unique.len(), out.len());
    }

    #[test]
    fn no_pronoun_no_history_returns_only_abbreviation_and_paraphrase_variants() {
        let out = QueryRewriter::rewrite_rule_based("普通问题没有缩写也没有代词", &[]);
        assert_eq!(out, vec!["普通问题没有缩写也没有代词".to_string()]);
    }
}
