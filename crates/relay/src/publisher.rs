//! Publisher trait and in-memory implementation.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RelayError, Result};

/// A message handed to the substrate: topic, partition key, and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub value: String,
}

/// Hands outbox events to the messaging substrate.
///
/// Implementations must not return `Ok` before the substrate has
/// acknowledged the message: the relay marks events sent on `Ok`, and a
/// premature acknowledgment would turn at-least-once delivery into
/// at-most-once.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one message, resolving once the substrate acknowledges it.
    async fn publish(&self, topic: &str, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    published: Vec<PublishedMessage>,
    fail_on_publish: bool,
    hang_on_publish: bool,
}

/// In-memory publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
}

impl InMemoryPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures publish calls to fail.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Configures publish calls to block until the caller's timeout fires.
    pub fn set_hang_on_publish(&self, hang: bool) {
        self.state.write().unwrap().hang_on_publish = hang;
    }

    /// Messages acknowledged so far, in publish order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.read().unwrap().published.clone()
    }

    /// Number of messages acknowledged so far.
    pub fn published_count(&self) -> usize {
        self.state.read().unwrap().published.len()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, key: &str, value: &str) -> Result<()> {
        let hang = self.state.read().unwrap().hang_on_publish;
        if hang {
            // never acknowledges; the caller's publish timeout must fire
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let mut state = self.state.write().unwrap();
        if state.fail_on_publish {
            return Err(RelayError::Publish("substrate unavailable".to_string()));
        }

        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }
}
