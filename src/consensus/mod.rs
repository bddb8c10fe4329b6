//! The consensus stack (spec.md §4.4): a chain of decorators, each wrapping
//! the next, that turn a bare [`Silo`](crate::silo::Silo) into a durable,
//! cached, replicated block store. A node assembles the chain bottom-up:
//! [`BlockStore`] on the local silo, [`cache::CacheConsensus`] around it,
//! [`journal::JournalConsensus`] around that, and [`paxos::PaxosConsensus`]
//! at the top for blocks that need cross-peer agreement.

pub mod cache;
pub mod journal;
pub mod paxos;

use crate::address::Address;
use crate::block::Block;
use crate::error::{Error, Result};
use crate::resolver::Resolver;
use crate::silo::{check_mode, SetMode, Silo, Status};

/// The contract every layer of the stack implements and wraps (spec.md
/// §4.4): fetch, store, remove a block by address, plus a batched fetch
/// for prefetching (spec.md §4.5.2, §4.5.3).
pub trait Consensus: Send + Sync {
    /// Fetch and validate the block at `address`.
    fn fetch(&self, address: Address) -> Result<Block>;

    /// Store `block` under `mode` (spec.md §4.4: `insert`, `update`, or
    /// `any`). Immutable (CHB) stores are idempotent on identical content
    /// regardless of `mode`; mutable (OKB/ACB) stores must carry a version
    /// strictly greater than whatever is currently stored, or fail with
    /// [`Error::Conflict`]. `resolver` names the edit this write applies,
    /// letting a durable layer squash it against other still-queued writes
    /// to the same address (spec.md §4.4.1) — `None` for a write that
    /// can't be expressed as a `Resolver` (e.g. an ad hoc `setattr`).
    fn store(&self, block: Block, mode: SetMode, resolver: Option<Resolver>) -> Result<()>;

    /// Remove the block at `address`.
    fn remove(&self, address: Address) -> Result<()>;

    /// Fetch several addresses at once. The default implementation just
    /// loops; layers that can batch the underlying I/O (a networked
    /// overlay layer) should override it.
    fn multifetch(&self, addresses: &[Address]) -> Vec<Result<Block>> {
        addresses.iter().map(|a| self.fetch(*a)).collect()
    }
}

/// The base of the stack: validates and persists blocks directly against
/// one local [`Silo`], with no caching, durability queueing, or
/// replication. Every other layer eventually bottoms out here (or at a
/// networked equivalent the overlay supplies).
pub struct BlockStore<S: Silo> {
    silo: S,
}

impl<S: Silo> BlockStore<S> {
    /// Wrap `silo` as the base of a consensus chain.
    pub fn new(silo: S) -> Self {
        BlockStore { silo }
    }
}

impl<S: Silo> Consensus for BlockStore<S> {
    fn fetch(&self, address: Address) -> Result<Block> {
        let bytes = self.silo.get(&address)?;
        let block = Block::from_bytes(&bytes)?;
        block.validate(|acl_address| {
            let acl_bytes = self.silo.get(&acl_address)?;
            Block::from_bytes(&acl_bytes)
        })?;
        Ok(block)
    }

    fn store(&self, block: Block, mode: SetMode, resolver: Option<Resolver>) -> Result<()> {
        let _ = resolver; // resolving a conflict needs signing keys this layer never holds
        let address = block.address();
        let bytes = block.to_bytes()?;

        match block.version() {
            None => match self.silo.set(&address, &bytes, SetMode::InsertOnly) {
                Ok(_) => Ok(()),
                Err(Error::Collision(_)) => {
                    // CHBs are content-addressed: identical bytes at the
                    // same address is the same fact restated, not a race.
                    let existing = self.silo.get(&address)?;
                    if existing == bytes {
                        Ok(())
                    } else {
                        Err(Error::Collision(address))
                    }
                }
                Err(e) => Err(e),
            },
            Some(new_version) => {
                let exists = matches!(self.silo.status(&address), Status::Exists);
                check_mode(exists, mode, address)?;
                if exists {
                    let current = self.fetch(address)?;
                    let current_version = current.version().unwrap_or(0);
                    if new_version <= current_version {
                        return Err(Error::Conflict {
                            address,
                            expected: current_version,
                            found: new_version,
                        });
                    }
                }
                self.silo.set(&address, &bytes, SetMode::Upsert)?;
                Ok(())
            }
        }
    }

    fn remove(&self, address: Address) -> Result<()> {
        self.silo.erase(&address)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::silo::memory::MemorySilo;

    #[test]
    fn chb_store_is_idempotent_on_identical_content() {
        let store = BlockStore::new(MemorySilo::new());
        let kp = KeyPair::generate().unwrap();
        let chb = crate::block::Chb::seal(b"hi".to_vec(), &kp);
        let block = Block::Chb(chb);

        store.store(block.clone(), SetMode::InsertOnly, None).unwrap();
        store.store(block, SetMode::InsertOnly, None).unwrap();
    }

    #[test]
    fn mutable_store_rejects_stale_version() {
        let store = BlockStore::new(MemorySilo::new());
        let kp = KeyPair::generate().unwrap();
        let okb = crate::block::Okb::create(b"v1".to_vec(), &kp);
        let address = okb.address();
        store.store(Block::Okb(okb.clone()), SetMode::InsertOnly, None).unwrap();

        // Resubmitting the same version is a stale write.
        assert!(matches!(
            store.store(Block::Okb(okb), SetMode::Upsert, None),
            Err(Error::Conflict { .. })
        ));

        let fetched = store.fetch(address).unwrap();
        assert_eq!(fetched.version(), Some(0));
    }

    #[test]
    fn insert_only_rejects_an_existing_mutable_address() {
        let store = BlockStore::new(MemorySilo::new());
        let kp = KeyPair::generate().unwrap();
        let okb = crate::block::Okb::create(b"v1".to_vec(), &kp);
        store.store(Block::Okb(okb.clone()), SetMode::InsertOnly, None).unwrap();

        let next = okb.next_version(b"v2".to_vec(), &kp);
        assert!(matches!(
            store.store(Block::Okb(next), SetMode::InsertOnly, None),
            Err(Error::Collision(_))
        ));
    }

    #[test]
    fn update_only_rejects_a_missing_address() {
        let store = BlockStore::new(MemorySilo::new());
        let kp = KeyPair::generate().unwrap();
        let okb = crate::block::Okb::create(b"v1".to_vec(), &kp);
        assert!(matches!(
            store.store(Block::Okb(okb), SetMode::UpdateOnly, None),
            Err(Error::MissingBlock(_))
        ));
    }
}
