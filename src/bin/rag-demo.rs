//! Demo/CLI runner: builds an `Engine` from in-process reference
//! capabilities, ingests the sample corpus, and drives the S1-S3 style
//! queries end to end so the full orchestration path gets exercised
//! outside of the test harness.
//!
//! Grounded on `examples/DevsHero-search-scrape/mcp-server/src/main.rs`'s
//! startup sequence (tracing init, then construct-and-log component
//! initialization) adapted to a one-shot CLI instead of a long-running
//! server, since the spec's HTTP surface is an explicit Non-goal.

use std::sync::Arc;

use rag_core::core::types::ChatTurnRequest;
use rag_core::corpus;
use rag_core::generate::ReferenceGenerator;
use rag_core::{Config, Engine};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("rag-demo: starting");

    let engine = Engine::new(Config::load(), Arc::new(ReferenceGenerator::new()));

    for doc in corpus::scenario_documents() {
        info!("ingesting {} ({})", doc.doc_name, doc.doc_id);
        engine.ingestion().ingest_direct(doc.doc_id, doc.doc_name, doc.content, "markdown").await?;
    }

    let scenarios = [
        ("demo-user", "demo-session-1", "5G随机接入的四步流程是什么？"),
        ("demo-user", "demo-session-2", "CA是什么"),
        ("demo-user", "demo-session-3", "gNodeB AAU5613 的最大功率是多少"),
    ];

    for (user_id, session_id, query) in scenarios {
        let request = ChatTurnRequest {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            query: query.to_string(),
            top_k: 10,
            history: Vec::new(),
        };

        match engine.chat_turn(&request).await {
            Ok(answer) => {
                println!("\n=== query: {query} ===");
                println!("source: {:?}", answer.source);
                println!("rewritten: {:?}", answer.rewritten_queries);
                println!("citations: {:?}", answer.citations);
                println!("answer:\n{}", answer.answer);
            }
            Err(e) => {
                println!("\n=== query: {query} ===\nerror: {e}");
            }
        }
    }

    // Re-issue the first query to demonstrate the exact-cache hit (S4).
    let repeat = ChatTurnRequest {
        user_id: "demo-user".to_string(),
        session_id: "demo-session-1".to_string(),
        query: "5G随机接入的四步流程是什么？".to_string(),
        top_k: 10,
        history: Vec::new(),
    };
    let cached = engine.chat_turn(&repeat).await?;
    println!("\n=== repeated query ===\nsource: {:?}", cached.source);

    engine.shutdown().await;
    Ok(())
}
