//! Summarization trigger: detect a chat session's history outgrowing its
//! token budget and compress it.
//!
//! Grounded on `examples/original_source/.../tasks/summarize.py`. Fired
//! after each successful chat turn, best-effort: failures are logged and
//! swallowed, never propagated to the chat path, per the spec's §7
//! propagation policy. Retries the compress-and-write-back step with
//! exponential backoff on transient failure, using the `backoff` crate
//! (already in the teacher's dependency table for outbound calls
//! elsewhere).

use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::future::retry;

use crate::cache::SessionHistory;
use crate::core::types::ChatMessage;
use crate::text::estimate_tokens;

pub struct SummarizationOutcome {
    pub summarized: bool,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

pub struct SummarizationTrigger {
    session_history: Arc<SessionHistory>,
    keep_recent: usize,
}

impl SummarizationTrigger {
    pub fn new(session_history: Arc<SessionHistory>, keep_recent: usize) -> Self {
        Self { session_history, keep_recent }
    }

    /// Read the session's history; if its estimated token total is within
    /// `budget_threshold`, no-op. Otherwise compress the older prefix into
    /// a single summary message and replace the stored history with
    /// `[summary] ++ last keep_recent messages`, preserving TTL.
    ///
    /// Never returns an error to the caller: a failure inside the
    /// retry loop is logged at `warn!` and reported as `summarized:
    /// false` rather than blocking the main query path.
    pub async fn maybe_summarize(&self, user_id: &str, session_id: &str, budget_threshold: usize) -> SummarizationOutcome {
        let messages = self.session_history.get(user_id, session_id).await;
        let tokens_before: usize = messages.iter().map(|m| estimate_tokens(&m.content)).sum();

        if tokens_before <= budget_threshold {
            return SummarizationOutcome {
                summarized: false,
                tokens_before,
                tokens_after: tokens_before,
            };
        }

        let keep_recent = self.keep_recent;
        let session_history = self.session_history.clone();
        let user_id = user_id.to_string();
        let session_id = session_id.to_string();
        let messages_for_retry = messages.clone();

        let backoff_policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(50))
            .with_max_elapsed_time(Some(Duration::from_secs(2)))
            .build();

        let result = retry(backoff_policy, || {
            let session_history = session_history.clone();
            let user_id = user_id.clone();
            let session_id = session_id.clone();
            let messages = messages_for_retry.clone();
            async move {
                let new_messages = compress(&messages, keep_recent);
                session_history.replace(&user_id, &session_id, new_messages.clone()).await;
                Ok::<_, backoff::Error<anyhow::Error>>(new_messages)
            }
        })
        .await;

        match result {
            Ok(new_messages) => {
                let tokens_after: usize = new_messages.iter().map(|m| estimate_tokens(&m.content)).sum();
                SummarizationOutcome {
                    summarized: true,
                    tokens_before,
                    tokens_after,
                }
            }
            Err(e) => {
                tracing::warn!("summarization: best-effort compression failed after retries: {e}");
                SummarizationOutcome {
                    summarized: false,
                    tokens_before,
                    tokens_after: tokens_before,
                }
            }
        }
    }
}

/// Deterministic stand-in for an LLM-generated summary: the first 50
/// characters of each user turn, joined, capped at 8 topics, with a
/// trailing count note if more were dropped. Production deployments
/// swap this for a real summarizer call.
fn compress(messages: &[ChatMessage], keep_recent: usize) -> Vec<ChatMessage> {
    let topics: Vec<String> = messages
        .iter()
        .filter(|m| matches!(m.role, crate::core::types::Role::User))
        .map(|m| m.content.chars().take(50).collect::<String>())
        .collect();

    let mut summary = format!("用户先后探讨了以下技术主题：{}", topics.iter().take(8).cloned().collect::<Vec<_>>().join("；"));
    if topics.len() > 8 {
        summary.push_str(&format!("等共 {} 个问题", topics.len()));
    }

    let summary_message = ChatMessage::system(format!("前情提要: {summary}"));
    let recent = if messages.len() >= keep_recent {
        messages[messages.len() - keep_recent..].to_vec()
    } else {
        messages.to_vec()
    };

    std::iter::once(summary_message).chain(recent).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_history(n: usize) -> Arc<SessionHistory> {
        let history = Arc::new(SessionHistory::new(7200));
        for i in 0..n {
            history.push("u1", "s1", ChatMessage::user(format!("问题编号{i}带有一些中文文字用于撑满预算测试长度"))).await;
            history.push("u1", "s1", ChatMessage::assistant(format!("回答编号{i}带有一些中文文字用于撑满预算测试长度"))).await;
        }
        history
    }

    #[tokio::test]
    async fn no_op_when_under_budget() {
        let history = seeded_history(1).await;
        let trigger = SummarizationTrigger::new(history.clone(), 4);
        let outcome = trigger.maybe_summarize("u1", "s1", 4000).await;
        assert!(!outcome.summarized);
        assert_eq!(outcome.tokens_before, outcome.tokens_after);
    }

    #[tokio::test]
    async fn compresses_when_over_budget_and_keeps_recent_messages() {
        let history = seeded_history(30).await;
        let trigger = SummarizationTrigger::new(history.clone(), 4);
        let outcome = trigger.maybe_summarize("u1", "s1", 50).await;
        assert!(outcome.summarized);
        assert!(outcome.tokens_after < outcome.tokens_before);

        let stored = history.get("u1", "s1").await;
        assert_eq!(stored.len(), 5); // 1 summary + 4 kept
        assert!(matches!(stored[0].role, crate::core::types::Role::System));
    }

    #[tokio::test]
    async fn is_best_effort_and_never_panics_on_empty_history() {
        let history = Arc::new(SessionHistory::new(7200));
        let trigger = SummarizationTrigger::new(history, 4);
        let outcome = trigger.maybe_summarize("nobody", "nosession", 10).await;
        assert!(!outcome.summarized);
    }
}
