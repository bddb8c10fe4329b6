//! Network-wide admin keys (spec.md §4.6): consulted in addition to a
//! block's own ACL, granting global read or read/write regardless of
//! what the block's own ACL says. Persisted as part of a
//! `NetworkDescriptor` registry entry; this module only holds the
//! in-memory shape and lookup.

use serde_derive::{Deserialize, Serialize};

/// One admin entry: a signing public key plus the rights it carries on
/// every ACB in the network.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AdminEntry {
    pub key: Vec<u8>,
    pub write: bool,
}

/// The network's admin key list.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct AdminKeys {
    entries: Vec<AdminEntry>,
}

impl AdminKeys {
    pub fn new() -> Self {
        AdminKeys::default()
    }

    /// Grant `key` global read (and, if `write`, read/write) rights.
    pub fn grant(&mut self, key: Vec<u8>, write: bool) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.key == key) {
            existing.write = write;
        } else {
            self.entries.push(AdminEntry { key, write });
        }
    }

    pub fn revoke(&mut self, key: &[u8]) {
        self.entries.retain(|e| e.key != key);
    }

    /// Rights `key` holds as an admin, if any.
    pub fn rights_for(&self, key: &[u8]) -> Option<bool> {
        self.entries.iter().find(|e| e.key == key).map(|e| e.write)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn grant_then_revoke() {
        let mut admins = AdminKeys::new();
        admins.grant(b"alice".to_vec(), true);
        assert_eq!(admins.rights_for(b"alice"), Some(true));

        admins.revoke(b"alice");
        assert_eq!(admins.rights_for(b"alice"), None);
    }

    #[test]
    fn regrant_updates_write_bit() {
        let mut admins = AdminKeys::new();
        admins.grant(b"bob".to_vec(), false);
        admins.grant(b"bob".to_vec(), true);
        assert_eq!(admins.rights_for(b"bob"), Some(true));
        assert_eq!(admins.entries.len(), 1);
    }
}
