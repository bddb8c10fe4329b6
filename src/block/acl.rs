//! ACL lists referenced by ACBs (spec.md §3): an ordered list of entries
//! `{user_key, read, write, token}`, stored as the payload of an immutable
//! CHB so that it is itself content-addressed and tamper-evident.

use serde_derive::{Deserialize, Serialize};

use crate::address::Address;
use crate::crypto::{seal, unseal, AgreementKeyPair, SealedKey};

/// One entry in an ACL: a user's public key, their read/write rights, and
/// the payload key sealed to them.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AclEntry {
    /// The Ed25519 signing public key identifying this user (or group
    /// control key, spec.md §4.6).
    pub user_key: Vec<u8>,
    /// X25519 agreement public key used to seal `token` to this user.
    pub user_agreement_key: [u8; 32],
    /// Whether this user may read the block.
    pub read: bool,
    /// Whether this user may write the block.
    pub write: bool,
    /// The payload symmetric key, sealed to `user_agreement_key`.
    pub token: SealedKey,
}

/// The ACL payload: an ordered list of entries. Order matters because
/// `editor_index` in an ACB is a positional index into this list
/// (spec.md §3).
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Acl {
    pub entries: Vec<AclEntry>,
}

impl Acl {
    /// An empty ACL.
    pub fn new() -> Self {
        Acl::default()
    }

    /// Reseal `payload_key` for every current entry, preserving each
    /// entry's read/write rights. Called whenever the ACL membership
    /// changes, since spec.md §3 requires re-issuing all tokens on any
    /// edit that changes the ACL.
    pub fn reseal(&mut self, payload_key: &[u8; 32]) {
        for entry in &mut self.entries {
            entry.token = seal(&entry.user_agreement_key, payload_key);
        }
    }

    /// Add or replace the entry for `user_key`, resealing the current
    /// payload key (callers are expected to have already rotated
    /// `payload_key` if the ACL addition should not see prior history —
    /// see `permissions::set_rights`).
    pub fn upsert(&mut self, user_key: Vec<u8>, user_agreement_key: [u8; 32], read: bool, write: bool, payload_key: &[u8; 32]) {
        let token = seal(&user_agreement_key, payload_key);
        if let Some(existing) = self.entries.iter_mut().find(|e| e.user_key == user_key) {
            existing.read = read;
            existing.write = write;
            existing.user_agreement_key = user_agreement_key;
            existing.token = token;
        } else {
            self.entries.push(AclEntry {
                user_key,
                user_agreement_key,
                read,
                write,
                token,
            });
        }
    }

    /// Remove `user_key` from the ACL.
    pub fn remove(&mut self, user_key: &[u8]) {
        self.entries.retain(|e| e.user_key != user_key);
    }

    /// Find the positional index of `user_key`, for building an ACB's
    /// `editor_index`.
    pub fn index_of(&self, user_key: &[u8]) -> Option<usize> {
        self.entries.iter().position(|e| e.user_key == user_key)
    }

    /// Recover the payload key sealed to `recipient`, if they hold an
    /// entry.
    pub fn unseal_for(&self, recipient_key: &[u8], recipient: &AgreementKeyPair) -> Option<[u8; 32]> {
        self.entries
            .iter()
            .find(|e| e.user_key == recipient_key)
            .and_then(|e| unseal(recipient, &e.token).ok())
    }

    /// Serialize the ACL payload for storage inside an immutable CHB.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("ACL serialization is infallible")
    }

    /// Deserialize an ACL payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// The address of an ACL block plus the rights it grants, resolved at
/// permission-check time (`permissions::check`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rights {
    pub read: bool,
    pub write: bool,
}

/// Reference to an ACL block, as carried inside an ACB's signed envelope.
pub type AclRef = Address;

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::random_key;

    #[test]
    fn upsert_and_unseal_round_trip() {
        let mut acl = Acl::new();
        let user = AgreementKeyPair::generate();
        let payload_key = random_key();
        acl.upsert(b"user-a".to_vec(), user.public_key(), true, false, &payload_key);

        assert_eq!(acl.index_of(b"user-a"), Some(0));
        let recovered = acl.unseal_for(b"user-a", &user).unwrap();
        assert_eq!(recovered, payload_key);
    }

    #[test]
    fn reseal_rotates_every_token() {
        let mut acl = Acl::new();
        let a = AgreementKeyPair::generate();
        let b = AgreementKeyPair::generate();
        let key1 = random_key();
        acl.upsert(b"a".to_vec(), a.public_key(), true, true, &key1);
        acl.upsert(b"b".to_vec(), b.public_key(), true, false, &key1);

        let key2 = random_key();
        acl.reseal(&key2);

        assert_eq!(acl.unseal_for(b"a", &a).unwrap(), key2);
        assert_eq!(acl.unseal_for(b"b", &b).unwrap(), key2);
    }
}
