//! Echo relay: hand outbound envelopes to the session bridge.

use std::sync::Arc;

use async_trait::async_trait;
use threadline_core::bus::SessionEmitter;
use threadline_core::error::DomainError;
use threadline_core::event::EventEnvelope;
use tracing::{debug, warn};

use crate::worker::MessageHandler;

/// Consumes echo messages and delivers them to their originating session.
pub struct EchoRelay {
    emitter: Arc<dyn SessionEmitter>,
}

impl EchoRelay {
    /// Creates a relay delivering through `emitter`.
    #[must_use]
    pub fn new(emitter: Arc<dyn SessionEmitter>) -> Self {
        Self { emitter }
    }

    /// Delivers one raw echo message. Returns whether a live session
    /// received it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the message is not an event
    /// envelope.
    pub async fn relay(&self, raw: &[u8]) -> Result<bool, DomainError> {
        let envelope = EventEnvelope::from_slice(raw)?;
        let delivered = self
            .emitter
            .emit_to_session(&envelope.session_id, &envelope)
            .await;
        if delivered {
            debug!(session_id = %envelope.session_id, event_id = %envelope.id, "Echo delivered");
        } else {
            warn!(session_id = %envelope.session_id, event_id = %envelope.id, "No live session for echo");
        }
        Ok(delivered)
    }
}

#[async_trait]
impl MessageHandler for EchoRelay {
    async fn handle(&self, payload: Vec<u8>) {
        if let Err(e) = self.relay(&payload).await {
            warn!(error = %e, "Dropping malformed echo");
        }
    }
}
