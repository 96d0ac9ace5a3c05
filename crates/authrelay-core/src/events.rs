//! Session lifecycle notifications for the application state store.
//!
//! Emission is fire-and-forget: no acknowledgement, no retry, and a full or
//! closed channel simply drops the event.

use tokio::sync::mpsc;

/// Outward session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A refresh succeeded; the session is valid again.
    Confirmed,
    /// The session is over (refresh failed or a replay was still unauthorized).
    Lost,
}

/// Optional sender half of the subscriber's channel.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<SessionEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that discards every event.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: SessionEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            tracing::debug!(?event, "session event dropped: {}", e);
        }
    }
}
