//! Peer demand tracking.
//!
//! Maintains an in-memory map of which peers are currently needed, by
//! which consumer type (dialog list, search results, profile pane, ...).
//! A peer is needed while at least one consumer type holds it. A consumer
//! may also claim a single-slot: registering a new peer in that slot
//! evicts the previous holder.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use quill_shared::{EventBus, PeerId, SessionEvent};

/// Reference-counted registry of needed peers.
#[derive(Debug)]
pub struct PeerDemandTracker {
    needed: HashMap<PeerId, HashSet<String>>,
    slots: HashMap<String, PeerId>,
    bus: EventBus,
}

impl PeerDemandTracker {
    pub fn new(bus: EventBus) -> Self {
        Self {
            needed: HashMap::new(),
            slots: HashMap::new(),
            bus,
        }
    }

    /// Register `consumer` against `peer`; a no-op if already registered.
    ///
    /// With `single_slot`, any other peer previously holding the slot for
    /// this consumer is evicted first (its tag removed, and a
    /// `peer_unneeded` signal emitted if that was its last tag).
    /// A `peer_needed` signal fires on the peer's first registration only.
    pub fn mark_needed(&mut self, peer: PeerId, consumer: &str, single_slot: bool) {
        if single_slot {
            if let Some(previous) = self.slots.insert(consumer.to_string(), peer) {
                if previous != peer {
                    debug!(peer = %previous, consumer, "evicting slot holder");
                    self.release(previous, consumer);
                }
            }
        }

        let tags = self.needed.entry(peer).or_default();
        if tags.insert(consumer.to_string()) && tags.len() == 1 {
            debug!(peer = %peer, consumer, "peer needed");
            self.bus.broadcast(SessionEvent::PeerNeeded { peer });
        }
    }

    /// Whether any consumer currently needs this peer.
    pub fn is_needed(&self, peer: PeerId) -> bool {
        self.needed.contains_key(&peer)
    }

    /// All currently needed peers.
    pub fn needed_peers(&self) -> Vec<PeerId> {
        self.needed.keys().copied().collect()
    }

    // Evicting a peer that is no longer tracked is a no-op, not an error.
    fn release(&mut self, peer: PeerId, consumer: &str) {
        if let Some(tags) = self.needed.get_mut(&peer) {
            if tags.remove(consumer) && tags.is_empty() {
                self.needed.remove(&peer);
                debug!(peer = %peer, "peer unneeded");
                self.bus.broadcast(SessionEvent::PeerUnneeded { peer });
            }
        }
    }
}
