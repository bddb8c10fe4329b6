//! Content-hashed blocks (spec.md §3, §4.2): immutable, address derived
//! from `H(data ‖ owner_key ‖ salt)`, signed once by the owner.

use rand::RngCore;
use serde_derive::{Deserialize, Serialize};

use super::{hash_address, validation_error, Header};
use crate::address::Address;
use crate::crypto::{self, KeyPair};
use crate::error::Result;

/// An immutable content-addressed block.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Chb {
    pub(crate) header: Header,
    /// Raw ciphertext (spec.md §3: "raw ciphertext" payload layout).
    pub data: Vec<u8>,
    /// Owner's signature over `data`.
    pub signature: Vec<u8>,
}

impl Chb {
    /// Build and sign a new CHB over `data`.
    pub fn seal(data: Vec<u8>, owner: &KeyPair) -> Self {
        let mut salt = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self::seal_with_salt(data, owner, salt)
    }

    /// Build and sign a new CHB with an explicit salt (used by tests that
    /// need deterministic addresses).
    pub fn seal_with_salt(data: Vec<u8>, owner: &KeyPair, salt: [u8; 32]) -> Self {
        let owner_key = owner.public_key();
        let hash = hash_address(&[&data, &owner_key, &salt]);
        let address = Address::new(hash, false, false);
        let signature = owner.sign(&data);

        Chb {
            header: Header {
                kind: super::BlockKind::Chb,
                address,
                owner_key,
                salt,
                version: None,
            },
            data,
            signature,
        }
    }

    /// The block's address.
    pub fn address(&self) -> Address {
        self.header.address
    }

    /// Validate per spec.md §4.2: recompute the address hash, check
    /// equality, and verify the owner's signature over `data`.
    pub fn validate(&self) -> Result<()> {
        let expected = hash_address(&[&self.data, &self.header.owner_key, &self.header.salt]);
        if expected != *self.header.address.hash_bytes() {
            return Err(validation_error("CHB address does not match H(data‖owner_key‖salt)"));
        }
        crypto::verify(&self.header.owner_key, &self.data, &self.signature)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn valid_chb_round_trips() {
        let kp = KeyPair::generate().unwrap();
        let chb = Chb::seal(b"hello".to_vec(), &kp);
        chb.validate().unwrap();
    }

    #[test]
    fn tampered_data_fails_validation() {
        let kp = KeyPair::generate().unwrap();
        let mut chb = Chb::seal(b"hello".to_vec(), &kp);
        chb.data = b"goodbye".to_vec();
        assert!(chb.validate().is_err());
    }

    #[test]
    fn tampered_signature_fails_validation() {
        let kp = KeyPair::generate().unwrap();
        let mut chb = Chb::seal(b"hello".to_vec(), &kp);
        chb.signature[0] ^= 0xff;
        assert!(chb.validate().is_err());
    }
}
