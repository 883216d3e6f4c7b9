//! Message bus adapters.
//!
//! The commands and events topics are consumed in-process by partitioned
//! workers. Everything else (outbox echoes, domain changes, dead letters)
//! leaves the process over Redis pub/sub, one channel per topic.
//!
//! Pub/sub does not store messages: a PUBLISH that reaches no subscriber
//! still succeeds, and the outbox would retire the record. Topics passed to
//! [`RedisPublisher::require_receivers`] treat zero receivers as a transport
//! failure instead, which leaves the record pending for the next sweep.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde_json::Value;
use threadline_core::bus::MessagePublisher;
use threadline_core::error::DomainError;
use threadline_pipeline::worker::WorkerHandle;
use tokio::sync::OnceCell;
use tracing::debug;

/// Publishes JSON messages to Redis channels named after the topic.
pub struct RedisPublisher {
    client: Client,
    connection: OnceCell<MultiplexedConnection>,
    required: HashSet<String>,
}

impl RedisPublisher {
    /// Creates a publisher for `redis_url`. The connection is opened on
    /// first publish.
    ///
    /// # Errors
    ///
    /// Returns `redis::RedisError` if the URL is invalid.
    pub fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            required: HashSet::new(),
        })
    }

    /// Fails publishes to `topics` that no subscriber received.
    #[must_use]
    pub fn require_receivers<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(topics.into_iter().map(Into::into));
        self
    }

    fn check_receivers(&self, topic: &str, receivers: i64) -> Result<(), DomainError> {
        if receivers == 0 && self.required.contains(topic) {
            return Err(DomainError::Transport(format!(
                "no subscriber received the message on {topic}"
            )));
        }
        Ok(())
    }

    async fn connection(&self) -> Result<MultiplexedConnection, DomainError> {
        self.connection
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await
            .cloned()
            .map_err(transport)
    }
}

fn transport(error: redis::RedisError) -> DomainError {
    DomainError::Transport(error.to_string())
}

#[async_trait]
impl MessagePublisher for RedisPublisher {
    async fn publish(&self, topic: &str, key: &str, message: &Value) -> Result<(), DomainError> {
        let mut connection = self.connection().await?;
        let serialized = serde_json::to_string(message)?;
        let receivers: i64 = connection.publish(topic, serialized).await.map_err(transport)?;
        debug!(topic, key, receivers, "Published to redis");
        self.check_receivers(topic, receivers)
    }
}

/// Routes each topic either to in-process workers or to a fallback
/// publisher.
pub struct TopicRouter {
    local: HashMap<String, WorkerHandle>,
    fallback: Arc<dyn MessagePublisher>,
}

impl TopicRouter {
    /// Creates a router that sends every topic to `fallback`.
    #[must_use]
    pub fn new(fallback: Arc<dyn MessagePublisher>) -> Self {
        Self {
            local: HashMap::new(),
            fallback,
        }
    }

    /// Delivers `topic` to `workers` instead, keyed by partition key.
    #[must_use]
    pub fn with_local(mut self, topic: impl Into<String>, workers: WorkerHandle) -> Self {
        self.local.insert(topic.into(), workers);
        self
    }
}

#[async_trait]
impl MessagePublisher for TopicRouter {
    async fn publish(&self, topic: &str, key: &str, message: &Value) -> Result<(), DomainError> {
        match self.local.get(topic) {
            Some(workers) => workers.submit(key, serde_json::to_vec(message)?).await,
            None => self.fallback.publish(topic, key, message).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use threadline_pipeline::worker::{MessageHandler, PartitionedWorkers};
    use threadline_test_support::RecordingPublisher;

    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Vec<u8>>>);

    #[async_trait]
    impl MessageHandler for Collect {
        async fn handle(&self, payload: Vec<u8>) {
            self.0.lock().unwrap().push(payload);
        }
    }

    #[tokio::test]
    async fn test_local_topic_is_submitted_to_workers() {
        // Arrange
        let collected = Arc::new(Collect::default());
        let workers = PartitionedWorkers::spawn("commands", 2, 8, collected.clone());
        let fallback = Arc::new(RecordingPublisher::new());
        let router = TopicRouter::new(fallback.clone()).with_local("commands", workers.handle());

        // Act
        router.publish("commands", "t1", &json!({ "id": "c1" })).await.unwrap();
        workers.shutdown().await;

        // Assert
        let payloads = collected.0.lock().unwrap().clone();
        assert_eq!(payloads.len(), 1);
        let message: Value = serde_json::from_slice(&payloads[0]).unwrap();
        assert_eq!(message["id"], "c1");
        assert!(fallback.published().is_empty());
    }

    #[tokio::test]
    async fn test_other_topics_go_to_fallback() {
        let fallback = Arc::new(RecordingPublisher::new());
        let router = TopicRouter::new(fallback.clone());

        router.publish("outbox", "s1", &json!({ "id": "e1" })).await.unwrap();

        let published = fallback.published_to("outbox");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, "s1");
    }

    #[test]
    fn test_zero_receivers_fail_only_required_topics() {
        // Arrange
        let publisher = RedisPublisher::connect("redis://127.0.0.1:6379")
            .unwrap()
            .require_receivers(["ai-platform-domain-changes"]);

        // Act / Assert
        assert!(matches!(
            publisher.check_receivers("ai-platform-domain-changes", 0),
            Err(DomainError::Transport(_))
        ));
        assert!(publisher.check_receivers("ai-platform-domain-changes", 2).is_ok());
        assert!(publisher.check_receivers("ai-platform-dead-letter", 0).is_ok());
    }

    #[test]
    fn test_invalid_redis_url_is_rejected() {
        assert!(RedisPublisher::connect("not a url").is_err());
    }
}
