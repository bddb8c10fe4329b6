//! The replication layer (spec.md §4.4.2, GLOSSARY): "chooses R peers via
//! the overlay, writes to all of them, and requires W acknowledgements
//! before considering a write durable; reads similarly require R
//! successful replies and resolve to the highest version seen." This is a
//! quorum/Paxos-style decorator, not a full consensus protocol —
//! leader election and view changes are explicitly out of scope (spec.md
//! §1) — so it composes with [`super::journal::JournalConsensus`] and
//! [`super::cache::CacheConsensus`] rather than replacing them.
//!
//! The wire transport to a remote peer is abstracted behind
//! [`PeerConnection`], since the actual RPC surface (spec.md §6) is a
//! separate concern from quorum bookkeeping.

use log::warn;

use super::Consensus;
use crate::address::Address;
use crate::block::Block;
use crate::crypto;
use crate::error::{Error, Result};
use crate::overlay::{Intent, Overlay, PeerHandle};
use crate::resolver::Resolver;
use crate::silo::SetMode;

/// What it takes to talk to one remote peer. A concrete implementation
/// carries whatever RPC client state it needs; this layer only needs the
/// three block operations.
pub trait PeerConnection: Send + Sync {
    fn fetch(&self, peer: &PeerHandle, address: Address) -> Result<Block>;
    fn store(&self, peer: &PeerHandle, block: Block) -> Result<()>;
    fn remove(&self, peer: &PeerHandle, address: Address) -> Result<()>;
}

/// Full content hash of a block, used to break version ties deterministically
/// (spec.md §4.4.2: "ties... resolved by comparing full block hashes") rather
/// than by whichever reply happened to arrive first.
fn content_hash(block: &Block) -> [u8; 32] {
    match block.to_bytes() {
        Ok(bytes) => crypto::sha256(&bytes),
        Err(_) => [0u8; 32],
    }
}

/// Quorum-replicated consensus over an [`Overlay`]'s peer set.
pub struct PaxosConsensus<O: Overlay, P: PeerConnection> {
    overlay: O,
    peers: P,
    replication_factor: usize,
    write_quorum: usize,
    read_quorum: usize,
}

impl<O: Overlay, P: PeerConnection> PaxosConsensus<O, P> {
    /// `replication_factor` peers are contacted per operation;
    /// `write_quorum`/`read_quorum` acknowledgements are required before
    /// the operation is considered to have succeeded. Both quorums must be
    /// at most `replication_factor`, and greater than half of it to avoid
    /// two concurrent writes both claiming a quorum.
    pub fn new(
        overlay: O,
        peers: P,
        replication_factor: usize,
        write_quorum: usize,
        read_quorum: usize,
    ) -> Self {
        assert!(write_quorum <= replication_factor);
        assert!(read_quorum <= replication_factor);
        PaxosConsensus {
            overlay,
            peers,
            replication_factor,
            write_quorum,
            read_quorum,
        }
    }

    fn allocate(&self, address: Address, intent: Intent, quorum: usize) -> Result<Vec<PeerHandle>> {
        let handles = self.overlay.allocate(address, intent, self.replication_factor);
        if handles.len() < quorum {
            return Err(Error::IoError(format!(
                "only {} of {} required peers are known for {:?}",
                handles.len(),
                quorum,
                address
            )));
        }
        Ok(handles)
    }
}

impl<O: Overlay, P: PeerConnection> Consensus for PaxosConsensus<O, P> {
    fn fetch(&self, address: Address) -> Result<Block> {
        let handles = self.allocate(address, Intent::Fetch, self.read_quorum)?;

        let mut best: Option<Block> = None;
        let mut successes = 0;
        for peer in &handles {
            match self.peers.fetch(peer, address) {
                Ok(block) => {
                    successes += 1;
                    let better = match &best {
                        None => true,
                        Some(b) => match block.version().cmp(&b.version()) {
                            std::cmp::Ordering::Greater => true,
                            std::cmp::Ordering::Less => false,
                            // Same version (or both immutable): break the tie
                            // by comparing full block hashes instead of
                            // keeping whichever reply arrived first.
                            std::cmp::Ordering::Equal => content_hash(&block) > content_hash(b),
                        },
                    };
                    if better {
                        best = Some(block);
                    }
                }
                Err(e) => {
                    warn!("paxos: fetch from {:?} failed: {}", peer, e);
                    self.overlay.evict(peer);
                }
            }
        }

        if successes < self.read_quorum {
            return Err(Error::IoError(format!(
                "read quorum not reached for {:?}: {}/{} peers answered",
                address, successes, self.read_quorum
            )));
        }
        best.ok_or(Error::MissingBlock(address))
    }

    fn store(&self, block: Block, mode: SetMode, resolver: Option<Resolver>) -> Result<()> {
        let _ = resolver; // remote peers resolve conflicts with their own copy of BlockStore
        let address = block.address();
        let intent = match mode {
            SetMode::InsertOnly => Intent::Insert,
            SetMode::UpdateOnly => Intent::Update,
            SetMode::Upsert => match block.version() {
                Some(v) if v > 0 => Intent::Update,
                _ => Intent::Insert,
            },
        };
        let handles = self.allocate(address, intent, self.write_quorum)?;

        let mut acked = 0;
        for peer in &handles {
            match self.peers.store(peer, block.clone()) {
                Ok(()) => acked += 1,
                Err(e) => {
                    warn!("paxos: store to {:?} failed: {}", peer, e);
                    self.overlay.evict(peer);
                }
            }
        }

        if acked < self.write_quorum {
            return Err(Error::IoError(format!(
                "write quorum not reached for {:?}: {}/{} peers acked",
                address, acked, self.write_quorum
            )));
        }
        Ok(())
    }

    fn remove(&self, address: Address) -> Result<()> {
        let handles = self.allocate(address, Intent::Remove, self.write_quorum)?;

        let mut acked = 0;
        for peer in &handles {
            match self.peers.remove(peer, address) {
                Ok(()) => acked += 1,
                Err(e) => {
                    warn!("paxos: remove on {:?} failed: {}", peer, e);
                    self.overlay.evict(peer);
                }
            }
        }

        if acked < self.write_quorum {
            return Err(Error::IoError(format!(
                "write quorum not reached removing {:?}: {}/{} peers acked",
                address, acked, self.write_quorum
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consensus::BlockStore;
    use crate::crypto::KeyPair;
    use crate::overlay::local::LocalOverlay;
    use crate::silo::memory::MemorySilo;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Routes `fetch`/`store`/`remove` to an in-memory `BlockStore` per
    /// peer id, standing in for a real RPC client.
    struct FakePeers {
        stores: Mutex<HashMap<Vec<u8>, BlockStore<MemorySilo>>>,
    }

    impl FakePeers {
        fn new(ids: &[&[u8]]) -> Self {
            let mut stores = HashMap::new();
            for id in ids {
                stores.insert(id.to_vec(), BlockStore::new(MemorySilo::new()));
            }
            FakePeers {
                stores: Mutex::new(stores),
            }
        }
    }

    impl PeerConnection for FakePeers {
        fn fetch(&self, peer: &PeerHandle, address: Address) -> Result<Block> {
            self.stores.lock().unwrap().get(peer.id()).unwrap().fetch(address)
        }

        fn store(&self, peer: &PeerHandle, block: Block) -> Result<()> {
            self.stores
                .lock()
                .unwrap()
                .get(peer.id())
                .unwrap()
                .store(block, SetMode::Upsert, None)
        }

        fn remove(&self, peer: &PeerHandle, address: Address) -> Result<()> {
            self.stores.lock().unwrap().get(peer.id()).unwrap().remove(address)
        }
    }

    fn three_peer_cluster() -> PaxosConsensus<LocalOverlay, FakePeers> {
        let overlay = LocalOverlay::new();
        overlay.register(PeerHandle::new(vec![1]));
        overlay.register(PeerHandle::new(vec![2]));
        overlay.register(PeerHandle::new(vec![3]));
        let peers = FakePeers::new(&[&[1], &[2], &[3]]);
        PaxosConsensus::new(overlay, peers, 3, 2, 2)
    }

    #[test]
    fn store_then_fetch_round_trips_with_quorum() {
        let cluster = three_peer_cluster();
        let kp = KeyPair::generate().unwrap();
        let chb = crate::block::Chb::seal(b"hi".to_vec(), &kp);
        let address = chb.address();

        cluster.store(Block::Chb(chb), SetMode::InsertOnly, None).unwrap();
        let fetched = cluster.fetch(address).unwrap();
        assert_eq!(fetched.address(), address);
    }

    #[test]
    fn fetch_picks_the_highest_version_seen() {
        let cluster = three_peer_cluster();
        let kp = KeyPair::generate().unwrap();
        let okb = crate::block::Okb::create(b"v0".to_vec(), &kp);
        let address = okb.address();
        cluster.store(Block::Okb(okb.clone()), SetMode::InsertOnly, None).unwrap();

        // Only one replica gets the newer version, simulating a write
        // that reached write quorum but not every peer.
        let v1 = okb.next_version(b"v1".to_vec(), &kp);
        cluster
            .peers
            .store(&PeerHandle::new(vec![1]), Block::Okb(v1))
            .unwrap();

        let fetched = cluster.fetch(address).unwrap();
        assert_eq!(fetched.version(), Some(1));
    }

    #[test]
    fn fetch_breaks_a_version_tie_by_content_hash_not_reply_order() {
        let cluster = three_peer_cluster();
        let kp = KeyPair::generate().unwrap();
        let okb = crate::block::Okb::create(b"v0".to_vec(), &kp);
        let address = okb.address();
        cluster.store(Block::Okb(okb.clone()), SetMode::InsertOnly, None).unwrap();

        // Two divergent writers both claim version 1 on different peers.
        // Whichever one happens to answer first must not decide the tie.
        let a = okb.next_version(b"branch-a".to_vec(), &kp);
        let b = okb.next_version(b"branch-b".to_vec(), &kp);
        cluster.peers.store(&PeerHandle::new(vec![1]), Block::Okb(a.clone())).unwrap();
        cluster.peers.store(&PeerHandle::new(vec![2]), Block::Okb(b.clone())).unwrap();

        let winner = if content_hash(&Block::Okb(a.clone())) > content_hash(&Block::Okb(b.clone())) {
            Block::Okb(a)
        } else {
            Block::Okb(b)
        };

        let fetched = cluster.fetch(address).unwrap();
        assert_eq!(fetched, winner);
    }

    #[test]
    fn store_fails_when_too_few_peers_are_reachable() {
        let overlay = LocalOverlay::new();
        overlay.register(PeerHandle::new(vec![1]));
        let peers = FakePeers::new(&[&[1]]);
        let cluster = PaxosConsensus::new(overlay, peers, 3, 2, 2);

        let kp = KeyPair::generate().unwrap();
        let chb = crate::block::Chb::seal(b"hi".to_vec(), &kp);
        assert!(cluster
            .store(Block::Chb(chb), SetMode::InsertOnly, None)
            .is_err());
    }
}
