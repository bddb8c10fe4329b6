//! A deterministic in-process overlay, used in tests and single-node
//! deployments. It is not a peer-lookup algorithm (Kademlia/Kelips are out
//! of scope, spec.md §1) — it simply hands back whichever peers were
//! registered with it, consistently ordered so repeated `allocate` calls
//! for the same address return the same set.

use std::collections::HashSet;
use std::sync::Mutex;

use super::{Intent, Overlay, PeerHandle};
use crate::address::Address;

/// Overlay backed by a fixed, manually-registered peer set.
pub struct LocalOverlay {
    peers: Mutex<Vec<PeerHandle>>,
    evicted: Mutex<HashSet<Vec<u8>>>,
}

impl LocalOverlay {
    /// An overlay with no peers registered yet.
    pub fn new() -> Self {
        LocalOverlay {
            peers: Mutex::new(Vec::new()),
            evicted: Mutex::new(HashSet::new()),
        }
    }

    /// Register a peer as available.
    pub fn register(&self, peer: PeerHandle) {
        self.evicted.lock().unwrap().remove(peer.id());
        self.peers.lock().unwrap().push(peer);
    }
}

impl Default for LocalOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl Overlay for LocalOverlay {
    fn allocate(&self, _address: Address, _intent: Intent, count: usize) -> Vec<PeerHandle> {
        let evicted = self.evicted.lock().unwrap();
        self.peers
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !evicted.contains(p.id()))
            .take(count)
            .cloned()
            .collect()
    }

    fn evict(&self, peer: &PeerHandle) {
        self.evicted.lock().unwrap().insert(peer.id().to_vec());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn allocate_respects_count_and_registration() {
        let overlay = LocalOverlay::new();
        overlay.register(PeerHandle::new(vec![1]));
        overlay.register(PeerHandle::new(vec![2]));
        overlay.register(PeerHandle::new(vec![3]));

        let addr = Address::derive(&[b"x"], false, false);
        let peers = overlay.allocate(addr, Intent::Fetch, 2);
        assert_eq!(peers.len(), 2);
    }

    #[test]
    fn evicted_peer_is_excluded() {
        let overlay = LocalOverlay::new();
        let p1 = PeerHandle::new(vec![1]);
        overlay.register(p1.clone());
        overlay.register(PeerHandle::new(vec![2]));
        overlay.evict(&p1);

        let addr = Address::derive(&[b"x"], false, false);
        let peers = overlay.allocate(addr, Intent::Fetch, 2);
        assert_eq!(peers.len(), 1);
        assert_ne!(peers[0], p1);
    }
}
