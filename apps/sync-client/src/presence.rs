//! Client-side mirror of which peers are currently online.
//!
//! Mutated only by `PEER_ONLINE`/`PEER_OFFLINE` push events and by the full
//! resync that runs after every (re)connect. A missed offline event leaves a
//! stale entry until that resync, which is why the resync is mandatory
//! rather than best-effort; the set is cleared outright when the connection
//! is gone for good.

use dashmap::DashSet;

/// Thread-safe set of online peer IDs.
#[derive(Default)]
pub struct PresenceRegistry {
    online: DashSet<String>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            online: DashSet::new(),
        }
    }

    /// Mark a peer online. Returns false if it was already marked.
    pub fn mark_online(&self, peer_id: &str) -> bool {
        self.online.insert(peer_id.to_string())
    }

    /// Mark a peer offline. Returns false if it wasn't marked online.
    pub fn mark_offline(&self, peer_id: &str) -> bool {
        self.online.remove(peer_id).is_some()
    }

    pub fn is_online(&self, peer_id: &str) -> bool {
        self.online.contains(peer_id)
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }

    /// Snapshot of the online set, for rendering.
    pub fn online_peers(&self) -> Vec<String> {
        self.online.iter().map(|p| p.key().clone()).collect()
    }

    /// Replace the whole set with an authoritative snapshot. Used on every
    /// (re)connect so entries from before a drop can't linger.
    pub fn replace_all<I>(&self, peers: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.online.clear();
        for peer in peers {
            self.online.insert(peer);
        }
    }

    /// Drop everything. Used when the session or the connection ends.
    pub fn clear(&self) {
        self.online.clear();
    }
}
