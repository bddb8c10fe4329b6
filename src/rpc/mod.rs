//! The RPC surface (spec.md §6): the request/response shapes exchanged
//! per peer connection, plus the Paxos prepare/accept primitives
//! `consensus::paxos::PeerConnection` would dispatch over a real
//! transport. Transport itself — sockets, TLS, session-key negotiation
//! via a passport — is explicitly out of scope (spec.md §1); this module
//! only fixes what goes on the wire, matching the teacher's
//! `block/storage/network.rs` separating "what goes over the wire" from
//! "how it gets there."

pub mod codec;

use serde_derive::{Deserialize, Serialize};

use crate::address::Address;
use crate::block::Block;

/// `store`'s insert/update semantics (spec.md §4.1's `SetMode`, mirrored
/// here since a wire request carries the same choice explicitly rather
/// than relying on the peer to infer it from block version).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreMode {
    InsertOnly,
    UpdateOnly,
    Upsert,
}

/// One Paxos round's ballot number (spec.md §4.4.2): `(round, proposer)`
/// ordered lexicographically so proposers with higher ids win ties.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Ballot {
    pub round: u64,
    pub proposer: u64,
}

/// A request sent to one peer (spec.md §6 "RPC surface").
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Request {
    /// `fetch(addr, version?) → block | Missing`.
    Fetch { address: Address, version: Option<u32> },
    /// `store(block, mode) → ok | Conflict | Collision`.
    Store { block: Block, mode: StoreMode },
    /// `remove(addr, sig) → ok | Missing`.
    Remove { address: Address, signature: Vec<u8> },
    /// Paxos phase 1: propose a ballot for `address`.
    Prepare { address: Address, ballot: Ballot },
    /// Paxos phase 2: accept `block` under a prepared `ballot`.
    Accept { address: Address, ballot: Ballot, block: Block },
}

/// The reply to a [`Request`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Response {
    Block(Block),
    Missing,
    Ok,
    Conflict { expected: u32, found: u32 },
    Collision,
    /// Paxos `Prepare` acknowledgement: the highest ballot and value this
    /// peer has already accepted for the address, if any.
    Promised { highest: Option<Ballot>, accepted: Option<Block> },
    /// A ballot was rejected for being superseded by a higher one.
    Rejected { current: Ballot },
    Err(String),
}

/// Wraps a [`Request`]/[`Response`] with a correlation id so replies on a
/// multiplexed connection (spec.md §6: "length-prefixed,
/// channel-multiplexed") can be matched back to their request out of
/// order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Envelope<T> {
    pub id: u64,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(id: u64, body: T) -> Self {
        Envelope { id, body }
    }
}
