//! Directory-entry edits (spec.md §4.3: "Directory edit: parameterized by
//! `{op, target_name, target_address, target_type}`, replays the edit on
//! the current block"), grounded in the teacher's `metadata/dir.rs` entry
//! manipulation (`new_subdirectory`, `new_file`, `entries_mut`, `remove`).

use log::warn;
use serde_derive::{Deserialize, Serialize};

use super::{ConflictResolver, Resolver, Squashable};
use crate::address::Address;
use crate::error::{Error, Result};
use crate::payload::{DirEntry, DirectoryPayload, EntryType};

/// Which mutation to replay against a directory's entry map.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DirOp {
    /// Add or overwrite an entry unconditionally.
    Insert,
    /// Add an entry, failing if one by that name already exists.
    InsertExclusive,
    /// Change an existing entry's target; a no-op if it was concurrently
    /// removed.
    Update,
    /// Remove an entry by name; a no-op if it is already gone.
    Remove,
}

/// A single directory-entry edit, queued for replay against whatever the
/// directory's current content turns out to be.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DirectoryEdit {
    pub op: DirOp,
    pub target_name: String,
    pub target_address: Option<Address>,
    pub target_type: Option<EntryType>,
}

impl DirectoryEdit {
    pub fn insert(name: impl Into<String>, address: Address, entry_type: EntryType) -> Self {
        DirectoryEdit {
            op: DirOp::Insert,
            target_name: name.into(),
            target_address: Some(address),
            target_type: Some(entry_type),
        }
    }

    pub fn insert_exclusive(name: impl Into<String>, address: Address, entry_type: EntryType) -> Self {
        DirectoryEdit {
            op: DirOp::InsertExclusive,
            target_name: name.into(),
            target_address: Some(address),
            target_type: Some(entry_type),
        }
    }

    pub fn update(name: impl Into<String>, address: Address, entry_type: EntryType) -> Self {
        DirectoryEdit {
            op: DirOp::Update,
            target_name: name.into(),
            target_address: Some(address),
            target_type: Some(entry_type),
        }
    }

    pub fn remove(name: impl Into<String>) -> Self {
        DirectoryEdit {
            op: DirOp::Remove,
            target_name: name.into(),
            target_address: None,
            target_type: None,
        }
    }

    pub fn into_resolver(self) -> Resolver {
        Resolver::DirectoryEdit(self)
    }
}

impl ConflictResolver for DirectoryEdit {
    fn resolve(&self, current: &[u8]) -> Result<Vec<u8>> {
        let mut payload = DirectoryPayload::from_bytes(current)?;

        match self.op {
            DirOp::Insert => {
                payload.entries.insert(
                    self.target_name.clone(),
                    DirEntry {
                        entry_type: self.target_type.expect("insert carries a target_type"),
                        address: self.target_address.expect("insert carries a target_address"),
                    },
                );
            }
            DirOp::InsertExclusive => {
                if payload.entries.contains_key(&self.target_name) {
                    return Err(Error::InvalidArgument(format!(
                        "entry already exists: {}",
                        self.target_name
                    )));
                }
                payload.entries.insert(
                    self.target_name.clone(),
                    DirEntry {
                        entry_type: self.target_type.expect("insert carries a target_type"),
                        address: self.target_address.expect("insert carries a target_address"),
                    },
                );
            }
            DirOp::Update => {
                if payload.entries.contains_key(&self.target_name) {
                    payload.entries.insert(
                        self.target_name.clone(),
                        DirEntry {
                            entry_type: self.target_type.expect("update carries a target_type"),
                            address: self.target_address.expect("update carries a target_address"),
                        },
                    );
                } else {
                    warn!(
                        "dropping update to {:?}: concurrently removed",
                        self.target_name
                    );
                }
            }
            DirOp::Remove => {
                if payload.entries.remove(&self.target_name).is_none() {
                    warn!("remove of {:?} already applied concurrently", self.target_name);
                }
            }
        }

        payload.header.mtime = chrono::Utc::now();
        Ok(payload.to_bytes())
    }

    fn squashable(&self, other: &Resolver) -> Squashable {
        match other {
            Resolver::DirectoryEdit(o) if o.target_name == self.target_name => {
                match (self.op, o.op) {
                    (DirOp::Remove, _) | (_, DirOp::Remove) => Squashable::AtLastPositionStop,
                    _ => Squashable::AtLastPositionStop,
                }
            }
            Resolver::DirectoryEdit(_) => Squashable::AtFirstPositionContinue,
            _ => Squashable::Stop,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    fn empty_dir() -> Vec<u8> {
        DirectoryPayload::new(0, 0, 0o755, 4096, Utc::now()).to_bytes()
    }

    #[test]
    fn insert_then_lookup() {
        let addr = Address::derive(&[b"child"], false, false);
        let edit = DirectoryEdit::insert("a", addr, EntryType::File);
        let next = edit.resolve(&empty_dir()).unwrap();
        let payload = DirectoryPayload::from_bytes(&next).unwrap();
        assert_eq!(payload.entries["a"].address, addr);
    }

    #[test]
    fn insert_exclusive_rejects_existing_name() {
        let addr = Address::derive(&[b"child"], false, false);
        let base = DirectoryEdit::insert("a", addr, EntryType::File)
            .resolve(&empty_dir())
            .unwrap();
        let conflict = DirectoryEdit::insert_exclusive("a", addr, EntryType::File);
        assert!(conflict.resolve(&base).is_err());
    }

    #[test]
    fn update_after_concurrent_remove_is_dropped() {
        let addr = Address::derive(&[b"child"], false, false);
        let update = DirectoryEdit::update("a", addr, EntryType::File);
        // "a" was never inserted: simulates a concurrent remove winning first.
        let next = update.resolve(&empty_dir()).unwrap();
        let payload = DirectoryPayload::from_bytes(&next).unwrap();
        assert!(!payload.entries.contains_key("a"));
    }

    #[test]
    fn remove_is_idempotent() {
        let remove = DirectoryEdit::remove("a");
        assert!(remove.resolve(&empty_dir()).is_ok());
    }
}
