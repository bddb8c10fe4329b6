//! The overlay (spec.md §4.4, GLOSSARY): "given a block address and an
//! operation intent, yields a set of peer handles that can serve the
//! request. Opaque to the core beyond this contract." Peer-lookup
//! algorithms (Kademlia/Kelips) are explicitly out of scope (spec.md §1);
//! only the contract the consensus stack depends on lives here.

pub mod local;

use std::fmt;

use crate::address::Address;

/// What the caller intends to do with the addresses it is resolving,
/// since read and write quorums may differ (spec.md §4.4: "Choose R peers
/// via the overlay's `allocate(addr, R)`").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Intent {
    /// Reading an existing block.
    Fetch,
    /// Creating a block that must not already exist.
    Insert,
    /// Updating an existing mutable block.
    Update,
    /// Removing a block.
    Remove,
}

/// An opaque handle to a remote peer, as far as the core is concerned. A
/// concrete overlay implementation is free to carry connection state
/// behind this; the core only needs an identity to reason about quorums
/// and eviction (spec.md §4.4.2).
#[derive(Clone, Eq, PartialEq)]
pub struct PeerHandle {
    id: Vec<u8>,
}

impl PeerHandle {
    /// Wrap an opaque peer identity.
    pub fn new(id: Vec<u8>) -> Self {
        PeerHandle { id }
    }

    /// The peer's opaque identity bytes.
    pub fn id(&self) -> &[u8] {
        &self.id
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PeerHandle({})", hex_prefix(&self.id))
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}

/// The overlay's contract with the consensus stack.
pub trait Overlay: Send + Sync {
    /// Resolve `count` peers able to serve `intent` for `address`.
    /// Implementations may return fewer than `count` if the network
    /// cannot currently supply that many (the Paxos/replication layer is
    /// responsible for deciding whether that is tolerable, spec.md
    /// §4.4.2).
    fn allocate(&self, address: Address, intent: Intent, count: usize) -> Vec<PeerHandle>;

    /// Mark `peer` as having gone silent, so it is excluded from future
    /// quorums until it is observed again (spec.md §4.4.2 eviction).
    fn evict(&self, peer: &PeerHandle);
}
