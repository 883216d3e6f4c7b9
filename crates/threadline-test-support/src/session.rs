//! Test session emitter — records what would have reached a client.

use std::sync::Mutex;

use async_trait::async_trait;
use threadline_core::bus::SessionEmitter;
use threadline_core::event::EventEnvelope;

/// A session emitter that records deliveries. When built disconnected it
/// reports every session as absent.
#[derive(Debug)]
pub struct RecordingSessionEmitter {
    connected: bool,
    emitted: Mutex<Vec<(String, EventEnvelope)>>,
}

impl RecordingSessionEmitter {
    /// An emitter for which every session is live.
    #[must_use]
    pub fn connected() -> Self {
        Self {
            connected: true,
            emitted: Mutex::new(Vec::new()),
        }
    }

    /// An emitter with no live sessions.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            emitted: Mutex::new(Vec::new()),
        }
    }

    /// Returns every `(session_id, envelope)` delivered.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn emitted(&self) -> Vec<(String, EventEnvelope)> {
        self.emitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionEmitter for RecordingSessionEmitter {
    async fn emit_to_session(&self, session_id: &str, envelope: &EventEnvelope) -> bool {
        if !self.connected {
            return false;
        }
        self.emitted
            .lock()
            .unwrap()
            .push((session_id.to_owned(), envelope.clone()));
        true
    }
}
