//! The cache layer (spec.md §4.4, GLOSSARY: "cache consensus ... adds an
//! LRU layer with TTL expiry in front of the next layer down"), grounded in
//! `lru-cache`, pulled into the dependency graph from tychobrache-kepler's
//! `Cache` wrapper around its session store.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru_cache::LruCache;
use log::trace;

use super::Consensus;
use crate::address::Address;
use crate::block::Block;
use crate::error::Result;
use crate::resolver::Resolver;
use crate::silo::SetMode;

struct Entry {
    block: Block,
    cached_at: Instant,
}

/// Wraps an inner [`Consensus`] with a bounded, TTL-expiring cache of
/// recently fetched blocks. Immutable (CHB) entries never need revalidating
/// once cached; mutable (OKB/ACB) entries expire after `ttl` so a write
/// made by another node is eventually observed.
pub struct CacheConsensus<C: Consensus> {
    inner: C,
    entries: Mutex<LruCache<Address, Entry>>,
    ttl: Duration,
}

impl<C: Consensus> CacheConsensus<C> {
    /// Wrap `inner` with a cache holding up to `capacity` blocks, with
    /// mutable blocks expiring after `ttl`.
    pub fn new(inner: C, capacity: usize, ttl: Duration) -> Self {
        CacheConsensus {
            inner,
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn is_fresh(&self, entry: &Entry) -> bool {
        entry.block.version().is_none() || entry.cached_at.elapsed() < self.ttl
    }
}

impl<C: Consensus> Consensus for CacheConsensus<C> {
    fn fetch(&self, address: Address) -> Result<Block> {
        {
            let mut entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get_mut(&address) {
                if self.is_fresh(entry) {
                    trace!("cache hit: {:?}", address);
                    return Ok(entry.block.clone());
                }
            }
        }

        let block = self.inner.fetch(address)?;
        self.entries.lock().unwrap().insert(
            address,
            Entry {
                block: block.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(block)
    }

    fn store(&self, block: Block, mode: SetMode, resolver: Option<Resolver>) -> Result<()> {
        let address = block.address();
        self.inner.store(block.clone(), mode, resolver)?;
        self.entries.lock().unwrap().insert(
            address,
            Entry {
                block,
                cached_at: Instant::now(),
            },
        );
        Ok(())
    }

    fn remove(&self, address: Address) -> Result<()> {
        self.inner.remove(address)?;
        self.entries.lock().unwrap().remove(&address);
        Ok(())
    }

    fn multifetch(&self, addresses: &[Address]) -> Vec<Result<Block>> {
        addresses.iter().map(|a| self.fetch(*a)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consensus::BlockStore;
    use crate::crypto::KeyPair;
    use crate::silo::memory::MemorySilo;

    #[test]
    fn repeated_fetch_of_immutable_block_hits_cache() {
        let store = CacheConsensus::new(BlockStore::new(MemorySilo::new()), 16, Duration::from_secs(60));
        let kp = KeyPair::generate().unwrap();
        let chb = crate::block::Chb::seal(b"hi".to_vec(), &kp);
        let address = chb.address();
        store.store(Block::Chb(chb), SetMode::InsertOnly, None).unwrap();

        let a = store.fetch(address).unwrap();
        let b = store.fetch(address).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn mutable_entry_expires_after_ttl() {
        let store = CacheConsensus::new(
            BlockStore::new(MemorySilo::new()),
            16,
            Duration::from_millis(0),
        );
        let kp = KeyPair::generate().unwrap();
        let okb = crate::block::Okb::create(b"v0".to_vec(), &kp);
        let address = okb.address();
        store.store(Block::Okb(okb), SetMode::InsertOnly, None).unwrap();

        std::thread::sleep(Duration::from_millis(5));
        // With a zero TTL this must fall through to the inner store rather
        // than serve a stale cached copy; the inner store still has it, so
        // the fetch still succeeds.
        assert!(store.fetch(address).is_ok());
    }
}
