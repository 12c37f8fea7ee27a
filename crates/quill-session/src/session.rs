//! Session context.
//!
//! Owns the per-session singletons: the state container, the peer demand
//! tracker and the signal bus. Created once at session start and handed
//! (by reference) to UI-facing managers; nothing here is a process-wide
//! global.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use quill_shared::{EventBus, PeerId};

use crate::demand::PeerDemandTracker;
use crate::state::StateStore;
use crate::store::KeyValueStore;

/// Top-level owner of the session-scoped state objects.
pub struct Session {
    pub state: Arc<StateStore>,
    pub bus: EventBus,
    demand: Mutex<PeerDemandTracker>,
}

impl Session {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let bus = EventBus::default();
        Self {
            state: StateStore::new(store, bus.clone()),
            demand: Mutex::new(PeerDemandTracker::new(bus.clone())),
            bus,
        }
    }

    pub fn mark_peer_needed(&self, peer: PeerId, consumer: &str, single_slot: bool) {
        self.lock_demand().mark_needed(peer, consumer, single_slot);
    }

    pub fn is_peer_needed(&self, peer: PeerId) -> bool {
        self.lock_demand().is_needed(peer)
    }

    fn lock_demand(&self) -> MutexGuard<'_, PeerDemandTracker> {
        self.demand.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn session_wires_state_and_demand_to_one_bus() {
        let session = Session::new(Arc::new(MemoryStore::new()));
        let mut rx = session.bus.subscribe();

        session.state.load().await.unwrap();
        session.mark_peer_needed(PeerId(3), "dialogs", false);

        assert!(session.is_peer_needed(PeerId(3)));
        // Both the load broadcast and the demand signal arrive on the bus.
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(!events.is_empty());
    }
}
