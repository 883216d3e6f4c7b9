//! Dead-letter sink for messages that cannot be processed.

use std::sync::Arc;

use threadline_core::bus::{DeadLetter, MessagePublisher};
use threadline_core::clock::Clock;
use threadline_core::ids::IdGenerator;
use tracing::error;

/// Publishes unprocessable messages with their failure reason.
#[derive(Clone)]
pub struct DeadLetterSink {
    publisher: Arc<dyn MessagePublisher>,
    topic: String,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl DeadLetterSink {
    /// Creates a sink publishing to `topic`.
    #[must_use]
    pub fn new(
        publisher: Arc<dyn MessagePublisher>,
        topic: impl Into<String>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            clock,
            ids,
        }
    }

    /// Records `raw` as dead with `reason`. Never fails: if the dead-letter
    /// topic itself is unavailable the message is logged and dropped.
    pub async fn send(&self, reason: &str, raw: &[u8]) {
        let letter = DeadLetter::from_raw(
            format!("dlq-{}", self.ids.next_id()),
            self.clock.now_millis(),
            reason,
            raw,
        );
        error!(dead_letter_id = %letter.id, reason, "Dead-lettering message");

        let message = match serde_json::to_value(&letter) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Dead letter could not be serialized; dropping");
                return;
            }
        };
        if let Err(e) = self.publisher.publish(&self.topic, &letter.id, &message).await {
            error!(error = %e, dead_letter_id = %letter.id, "Dead letter publish failed; dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use threadline_test_support::{FailingPublisher, FixedClock, RecordingPublisher, SequentialIds};

    use super::*;

    #[tokio::test]
    async fn test_send_publishes_reason_and_original_payload() {
        // Arrange
        let publisher = Arc::new(RecordingPublisher::new());
        let sink = DeadLetterSink::new(
            publisher.clone(),
            "dlq",
            Arc::new(FixedClock::at_millis(42)),
            Arc::new(SequentialIds::default()),
        );

        // Act
        sink.send("missing type", br#"{"id":"c1"}"#).await;

        // Assert
        let published = publisher.published_to("dlq");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, "dlq-id-1");
        assert_eq!(published[0].message["reason"], "missing type");
        assert_eq!(published[0].message["ts"], 42);
        assert_eq!(published[0].message["payload"]["id"], "c1");
    }

    #[tokio::test]
    async fn test_send_swallows_publish_failure() {
        let sink = DeadLetterSink::new(
            Arc::new(FailingPublisher),
            "dlq",
            Arc::new(FixedClock::at_millis(1)),
            Arc::new(SequentialIds::default()),
        );

        sink.send("boom", b"raw").await;
    }
}
