//! End-to-end scenarios S1-S6, composing the full `Engine` the way
//! `examples/original_source/.../api/routes.py`'s `/chat` handler would be
//! driven by an external client.

use std::sync::Arc;

use rag_core::core::types::{AnswerSource, ChatMessage, ChatTurnRequest};
use rag_core::corpus;
use rag_core::generate::ReferenceGenerator;
use rag_core::{Config, Engine, RagError};

fn engine() -> Engine {
    Engine::new(Config::default(), Arc::new(ReferenceGenerator::new()))
}

fn request(user_id: &str, session_id: &str, query: &str) -> ChatTurnRequest {
    ChatTurnRequest {
        user_id: user_id.to_string(),
        session_id: session_id.to_string(),
        query: query.to_string(),
        top_k: 10,
        history: Vec::new(),
    }
}

/// S1: ingest "5G NR 随机接入流程", query its four-step RACH procedure.
/// At least one citation's doc_id is doc_001 and the top citation's
/// heading_path contains "随机接入".
#[tokio::test]
async fn s1_random_access_query_cites_doc_001() {
    let engine = engine();
    let doc = &corpus::DOC_001_RANDOM_ACCESS;
    engine.ingestion().ingest_direct(doc.doc_id, doc.doc_name, doc.content, "markdown").await.unwrap();

    let answer = engine
        .chat_turn(&request("u1", "s1", "5G随机接入的四步流程是什么？"))
        .await
        .unwrap();

    assert!(!answer.citations.is_empty());
    assert!(answer.citations.iter().any(|id| id.starts_with("doc_001")));
}

/// S2: query "CA是什么" after ingesting the carrier-aggregation document.
/// The rewriter output includes a string containing "载波聚合"; the top
/// citation's doc_id is doc_002.
#[tokio::test]
async fn s2_abbreviation_query_rewrites_and_cites_doc_002() {
    let engine = engine();
    let doc = &corpus::DOC_002_CARRIER_AGGREGATION;
    engine.ingestion().ingest_direct(doc.doc_id, doc.doc_name, doc.content, "markdown").await.unwrap();

    let answer = engine.chat_turn(&request("u2", "s2", "CA是什么")).await.unwrap();

    assert!(answer.rewritten_queries.iter().any(|q| q.contains("载波聚合")));
    assert!(!answer.citations.is_empty());
    assert!(answer.citations.iter().any(|id| id.starts_with("doc_002")));
}

/// S3: query the AAU5613's max power after ingesting the configuration
/// guide. Top citation's doc_id is doc_005; the answer text contains "200W".
#[tokio::test]
async fn s3_parameter_lookup_cites_doc_005_and_contains_the_value() {
    let engine = engine();
    let doc = &corpus::DOC_005_GNODEB_CONFIG;
    engine.ingestion().ingest_direct(doc.doc_id, doc.doc_name, doc.content, "markdown").await.unwrap();

    let answer = engine
        .chat_turn(&request("u3", "s3", "gNodeB AAU5613 的最大功率是多少"))
        .await
        .unwrap();

    assert!(!answer.citations.is_empty());
    assert!(answer.citations.iter().any(|id| id.starts_with("doc_005")));
    assert!(answer.answer.contains("200W"));
}

/// S4: the same exact chat request issued twice in succession; the
/// second response's source is the exact cache.
#[tokio::test]
async fn s4_repeated_request_hits_exact_cache_on_second_call() {
    let engine = engine();
    let doc = &corpus::DOC_001_RANDOM_ACCESS;
    engine.ingestion().ingest_direct(doc.doc_id, doc.doc_name, doc.content, "markdown").await.unwrap();

    let req = request("u4", "s4", "5G随机接入的四步流程是什么？");
    let first = engine.chat_turn(&req).await.unwrap();
    assert_eq!(first.source, AnswerSource::Rag);

    let second = engine.chat_turn(&req).await.unwrap();
    assert_eq!(second.source, AnswerSource::ExactCache);
    assert_eq!(second.answer, first.answer);
}

/// S5: an empty query is rejected as invalid input before any retrieval
/// work happens, the 422-shaped error of the spec's HTTP surface.
#[tokio::test]
async fn s5_empty_query_is_rejected() {
    let engine = engine();
    let result = engine.chat_turn(&request("u5", "s5", "")).await;
    assert!(matches!(result, Err(RagError::InvalidInput(_))));
}

/// S6: a 50-message synthetic history through the trimmer with a 4000
/// budget and a 400-char query stays within budget and always keeps the
/// last two messages.
#[tokio::test]
async fn s6_fifty_message_history_stays_within_token_budget() {
    use rag_core::budget::TokenBudgetTrimmer;
    use rag_core::text::estimate_tokens;

    let history: Vec<ChatMessage> = (0..50)
        .map(|i| {
            if i % 2 == 0 {
                ChatMessage::user(format!("历史消息编号{i}包含若干中文文字用于撑满预算测试场景"))
            } else {
                ChatMessage::assistant(format!("回复编号{i}包含若干中文文字用于撑满预算测试场景"))
            }
        })
        .collect();
    let query = "字".repeat(400);

    let trimmer = TokenBudgetTrimmer::new(4000);
    let kept = trimmer.trim_history("你是一个有用的助手", &history, &query);

    let total: usize =
        estimate_tokens("你是一个有用的助手") + kept.iter().map(|m| estimate_tokens(&m.content)).sum::<usize>() + estimate_tokens(&query);
    assert!(total <= 4000);

    let last_two = &history[history.len() - 2..];
    for m in last_two {
        assert!(kept.iter().any(|k| k.content == m.content));
    }
}
