//! Owner-key blocks (spec.md §3, §4.2): mutable, address derived from
//! `H(owner_key ‖ salt)`, version monotonic, only the owner may write.

use rand::RngCore;
use serde_derive::{Deserialize, Serialize};

use super::{hash_address, validation_error, Header};
use crate::address::Address;
use crate::crypto::{self, KeyPair};
use crate::error::Result;

/// A mutable block writable only by its owner.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Okb {
    pub(crate) header: Header,
    /// Monotonic version number.
    pub version: u32,
    /// Opaque payload.
    pub data: Vec<u8>,
    /// Owner's signature over `(address, version, data)`.
    pub signature: Vec<u8>,
}

impl Okb {
    /// Create version 0 of a fresh OKB.
    pub fn create(data: Vec<u8>, owner: &KeyPair) -> Self {
        let mut salt = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self::create_with_salt(data, owner, salt)
    }

    /// Create version 0 with an explicit salt (deterministic addresses for
    /// tests, or re-deriving the address for an existing logical block).
    pub fn create_with_salt(data: Vec<u8>, owner: &KeyPair, salt: [u8; 32]) -> Self {
        let owner_key = owner.public_key();
        let hash = hash_address(&[&owner_key, &salt]);
        let address = Address::new(hash, true, false);
        let mut okb = Okb {
            header: Header {
                kind: super::BlockKind::Okb,
                address,
                owner_key,
                salt,
                version: Some(0),
            },
            version: 0,
            data,
            signature: Vec::new(),
        };
        okb.sign(owner);
        okb
    }

    /// Produce the next version of this block with new `data`, signed by
    /// `owner`. Used by resolvers to build the block resubmitted after a
    /// conflict (spec.md §4.3).
    pub fn next_version(&self, data: Vec<u8>, owner: &KeyPair) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.header.version = Some(next.version);
        next.data = data;
        next.sign(owner);
        next
    }

    fn signing_message(&self) -> Vec<u8> {
        let mut msg = Vec::new();
        msg.extend_from_slice(self.header.address.hash_bytes());
        msg.extend_from_slice(&self.version.to_le_bytes());
        msg.extend_from_slice(&self.data);
        msg
    }

    fn sign(&mut self, owner: &KeyPair) {
        self.signature = owner.sign(&self.signing_message());
    }

    /// The block's address.
    pub fn address(&self) -> Address {
        self.header.address
    }

    /// Validate per spec.md §4.2: recompute the address, verify the
    /// signature over `(address, version, data)` with `owner_key`.
    pub fn validate(&self) -> Result<()> {
        let expected = hash_address(&[&self.header.owner_key, &self.header.salt]);
        if expected != *self.header.address.hash_bytes() {
            return Err(validation_error("OKB address does not match H(owner_key‖salt)"));
        }
        crypto::verify(&self.header.owner_key, &self.signing_message(), &self.signature)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn valid_okb_round_trips() {
        let kp = KeyPair::generate().unwrap();
        let okb = Okb::create(b"v0".to_vec(), &kp);
        okb.validate().unwrap();
    }

    #[test]
    fn version_bump_reuses_address() {
        let kp = KeyPair::generate().unwrap();
        let v0 = Okb::create(b"v0".to_vec(), &kp);
        let v1 = v0.next_version(b"v1".to_vec(), &kp);
        assert_eq!(v0.address(), v1.address());
        assert_eq!(v1.version, 1);
        v1.validate().unwrap();
    }

    #[test]
    fn other_key_cannot_forge_next_version() {
        let owner = KeyPair::generate().unwrap();
        let attacker = KeyPair::generate().unwrap();
        let v0 = Okb::create(b"v0".to_vec(), &owner);
        let mut forged = v0.next_version(b"v1".to_vec(), &attacker);
        // swap back in the real owner_key, but the signature is the
        // attacker's
        forged.header.owner_key = owner.public_key();
        assert!(forged.validate().is_err());
    }
}
