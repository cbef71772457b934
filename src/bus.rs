//! Message bus capability seam + in-process reference implementation.
//!
//! Grounded on `examples/original_source/.../ingestion/kafka_producer.py`
//! and `kafka_consumer.py`: JSON-serialized messages on a named topic,
//! consumer-group semantics, earliest-offset/auto-commit, per-poll
//! timeout. The reference implementation swaps the Kafka client for a
//! bounded `tokio::sync::mpsc` channel — same at-least-once-ish shape
//! (a bounded channel can still lose nothing in-process), same
//! publish/poll seam, so a real Kafka-backed implementation plugs in
//! without touching ingestion.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::core::types::Chunk;

/// Wire-shaped message carried on the ingestion topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMessage {
    pub chunk: Chunk,
}

#[async_trait::async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, message: ChunkMessage) -> anyhow::Result<()>;

    /// Publish-side flush — for the in-memory reference this is a no-op,
    /// since sends are synchronous with the channel; a real Kafka
    /// producer would flush its internal batch here.
    async fn flush(&self) -> anyhow::Result<()>;

    /// Best-effort batch receive with a per-poll timeout, matching the
    /// original's `consumer_timeout_ms`. Returns fewer than `max_records`
    /// messages (including zero) when the bus has nothing more to offer
    /// within the timeout — this is not an error.
    async fn poll(&self, max_records: usize, timeout: Duration) -> anyhow::Result<Vec<ChunkMessage>>;
}

/// In-process bounded-channel bus. `capacity` caps in-flight messages to
/// bound memory the way a real producer/broker pairing would bound
/// unacked batches.
pub struct InMemoryMessageBus {
    sender: mpsc::Sender<ChunkMessage>,
    receiver: Mutex<mpsc::Receiver<ChunkMessage>>,
}

impl InMemoryMessageBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }
}

#[async_trait::async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, message: ChunkMessage) -> anyhow::Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|e| anyhow::anyhow!("bus channel closed: {e}"))
    }

    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn poll(&self, max_records: usize, timeout: Duration) -> anyhow::Result<Vec<ChunkMessage>> {
        let mut receiver = self.receiver.lock().await;
        let mut out = Vec::with_capacity(max_records);
        while out.len() < max_records {
            match tokio::time::timeout(timeout, receiver.recv()).await {
                Ok(Some(msg)) => out.push(msg),
                Ok(None) => break,  // sender dropped, nothing more will arrive
                Err(_) => break,    // timed out waiting for the next message
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChunkMetadata, NodeType};

    fn sample_message(id: &str) -> ChunkMessage {
        ChunkMessage {
            chunk: Chunk {
                chunk_id: id.to_string(),
                text: "body".to_string(),
                metadata: ChunkMetadata {
                    doc_id: "d1".to_string(),
                    doc_name: "Doc".to_string(),
                    heading_path: String::new(),
                    node_type: NodeType::Leaf,
                    is_continuation: false,
                    parent_summary: None,
                },
                vector_light: None,
                vector_dense: None,
                lex_tokens: None,
            },
        }
    }

    #[tokio::test]
    async fn publish_then_poll_round_trips() {
        let bus = InMemoryMessageBus::new(8);
        bus.publish(sample_message("c1")).await.unwrap();
        bus.publish(sample_message("c2")).await.unwrap();
        let received = bus.poll(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(received.len(), 2);
    }

    #[tokio::test]
    async fn poll_times_out_with_fewer_than_max_records() {
        let bus = InMemoryMessageBus::new(8);
        bus.publish(sample_message("c1")).await.unwrap();
        let received = bus.poll(5, Duration::from_millis(20)).await.unwrap();
        assert_eq!(received.len(), 1);
    }
}
