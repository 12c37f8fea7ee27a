//! In-process signal bus.
//!
//! Session components broadcast [`SessionEvent`]s; UI-facing consumers
//! subscribe through [`EventBus::subscribe`]. Broadcasting never fails the
//! caller: a bus with no live subscribers simply drops the event.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::PeerId;

/// Events emitted by the persistence and caching layer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A settings leaf changed; `path` is the dotted settings path.
    SettingsUpdated {
        path: String,
        value: serde_json::Value,
    },
    /// An authenticated identity was restored or established.
    UserAuth { user_id: i64 },
    /// A peer became needed by at least one consumer.
    PeerNeeded { peer: PeerId },
    /// A peer's last consumer released it.
    PeerUnneeded { peer: PeerId },
}

/// Cloneable handle to the session-wide broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event to every subscriber.
    pub fn broadcast(&self, event: SessionEvent) {
        tracing::debug!(?event, "broadcasting session event");
        // Err only means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
