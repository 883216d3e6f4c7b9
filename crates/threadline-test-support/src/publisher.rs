//! Test publishers — mock `MessagePublisher` implementations for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use threadline_core::bus::MessagePublisher;
use threadline_core::error::DomainError;

/// One accepted publish call.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    /// Destination topic.
    pub topic: String,
    /// Partition key.
    pub key: String,
    /// Message body.
    pub message: Value,
}

/// A publisher that records every accepted message. Individual topics can
/// be switched into a failing state to simulate a bus outage.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<PublishedMessage>>,
    failing_topics: Mutex<HashSet<String>>,
    budgets: Mutex<HashMap<String, usize>>,
}

impl RecordingPublisher {
    /// Create a publisher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes publishes to `topic` fail until [`Self::recover_topic`].
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().insert(topic.to_owned());
    }

    /// Accepts `accepted` more messages on `topic`, then fails every later
    /// publish to it until [`Self::recover_topic`].
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_topic_after(&self, topic: &str, accepted: usize) {
        self.budgets.lock().unwrap().insert(topic.to_owned(), accepted);
    }

    /// Makes publishes to `topic` succeed again.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn recover_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().remove(topic);
        self.budgets.lock().unwrap().remove(topic);
    }

    /// Returns every accepted message in publish order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Returns the accepted messages for one topic in publish order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, message: &Value) -> Result<(), DomainError> {
        if self.failing_topics.lock().unwrap().contains(topic) {
            return Err(DomainError::Transport(format!("broker rejected {topic}")));
        }
        if let Some(remaining) = self.budgets.lock().unwrap().get_mut(topic) {
            if *remaining == 0 {
                return Err(DomainError::Transport(format!("broker rejected {topic}")));
            }
            *remaining -= 1;
        }
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_owned(),
            key: key.to_owned(),
            message: message.clone(),
        });
        Ok(())
    }
}

/// A publisher that always fails. Useful for testing error-handling paths.
#[derive(Debug)]
pub struct FailingPublisher;

#[async_trait]
impl MessagePublisher for FailingPublisher {
    async fn publish(&self, _topic: &str, _key: &str, _message: &Value) -> Result<(), DomainError> {
        Err(DomainError::Transport("broker unreachable".into()))
    }
}
