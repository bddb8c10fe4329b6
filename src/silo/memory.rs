//! In-memory silo, grounded in the teacher's `block/storage/memory.rs`
//! `MemoryStore` — "a toy that is useful for testing."

use std::collections::HashMap;
use std::sync::Mutex;

use log::trace;

use super::{check_mode, SetMode, Silo, Status};
use crate::address::Address;
use crate::error::{Error, Result};

/// A transient, `HashMap`-backed [`Silo`].
#[derive(Default)]
pub struct MemorySilo {
    blocks: Mutex<HashMap<Address, Vec<u8>>>,
}

impl MemorySilo {
    /// An empty in-memory silo.
    pub fn new() -> Self {
        MemorySilo {
            blocks: Mutex::new(HashMap::new()),
        }
    }
}

impl Silo for MemorySilo {
    fn get(&self, key: &Address) -> Result<Vec<u8>> {
        self.blocks
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::MissingBlock(*key))
    }

    fn set(&self, key: &Address, bytes: &[u8], mode: SetMode) -> Result<i64> {
        let mut blocks = self.blocks.lock().unwrap();
        let existing = blocks.get(key);
        check_mode(existing.is_some(), mode, *key)?;
        let delta = bytes.len() as i64 - existing.map(|b| b.len() as i64).unwrap_or(0);
        trace!("memory silo: set {:?} ({} bytes, delta {})", key, bytes.len(), delta);
        blocks.insert(*key, bytes.to_vec());
        Ok(delta)
    }

    fn erase(&self, key: &Address) -> Result<i64> {
        let mut blocks = self.blocks.lock().unwrap();
        match blocks.remove(key) {
            Some(old) => Ok(-(old.len() as i64)),
            None => Err(Error::MissingBlock(*key)),
        }
    }

    fn list(&self) -> Result<Vec<Address>> {
        Ok(self.blocks.lock().unwrap().keys().cloned().collect())
    }

    fn status(&self, key: &Address) -> Status {
        if self.blocks.lock().unwrap().contains_key(key) {
            Status::Exists
        } else {
            Status::Missing
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::silo::conformance;

    #[test]
    fn passes_conformance_suite() {
        conformance::exercise(MemorySilo::new());
    }
}
