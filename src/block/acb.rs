//! ACL-controlled blocks (spec.md §3, §4.2): mutable, editors chosen by
//! the owner via a referenced ACL.

use rand::RngCore;
use serde_derive::{Deserialize, Serialize};

use super::{acl::AclRef, hash_address, validation_error, Header};
use crate::address::Address;
use crate::crypto::{self, seal, KeyPair, SealedKey};
use crate::error::{Error, Result};

/// `editor_index` when the owner wrote the block directly (spec.md §3).
pub const OWNER_EDITOR: i32 = -1;

/// A mutable, ACL-gated block.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Acb {
    pub(crate) header: Header,
    /// Monotonic version.
    pub version: u32,
    /// Payload, encrypted with the key sealed in `owner_token` / the ACL.
    pub ciphertext: Vec<u8>,
    /// The payload's symmetric key, sealed to the owner's agreement key.
    pub owner_token: SealedKey,
    /// Address of the immutable block holding the ACL (spec.md §3).
    pub acl_ref: AclRef,
    /// `-1` if the owner wrote this version, else a positional index into
    /// the ACL.
    pub editor_index: i32,
    /// World-readable bit, projected into POSIX `o+r` at the filesystem
    /// boundary (spec.md §4.6).
    pub world_read: bool,
    /// World-writable bit, projected into POSIX `o+w`.
    pub world_write: bool,
    /// The payload key sealed to [`crypto::world_agreement_keypair`], so a
    /// requester with neither an owner token nor an ACL entry can still
    /// recover it when `world_read`/`world_write` says they should (spec.md
    /// §4.6). Present only while either world bit is set; a block that has
    /// never been made world-accessible carries no such token.
    pub world_token: Option<SealedKey>,
    /// Signature over `(address, version, ciphertext, owner_token,
    /// acl_ref, world_read, world_write, world_token)` by the owner key (if
    /// `editor_index == -1`) or the editor's key otherwise.
    pub signature: Vec<u8>,
}

impl Acb {
    /// Create version 0, written by the owner, with a fresh payload key.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        plaintext: &[u8],
        owner: &KeyPair,
        owner_agreement_public: &[u8; 32],
        acl_ref: AclRef,
    ) -> Self {
        let mut salt = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self::create_with_salt(plaintext, owner, owner_agreement_public, acl_ref, salt)
    }

    /// Same as [`create`], with an explicit salt.
    pub fn create_with_salt(
        plaintext: &[u8],
        owner: &KeyPair,
        owner_agreement_public: &[u8; 32],
        acl_ref: AclRef,
        salt: [u8; 32],
    ) -> Self {
        let owner_key = owner.public_key();
        let hash = hash_address(&[&owner_key, &salt]);
        let address = Address::new(hash, true, false);

        let payload_key = crypto::random_key();
        let nonce = crypto::random_nonce();
        let mut ciphertext = plaintext.to_vec();
        crypto::encrypt(&payload_key, &nonce, 0, &mut ciphertext);
        // The nonce travels with the ciphertext; simplest is to prefix it.
        let mut framed = nonce.to_vec();
        framed.extend_from_slice(&ciphertext);

        let owner_token = seal(owner_agreement_public, &payload_key);

        let mut acb = Acb {
            header: Header {
                kind: super::BlockKind::Acb,
                address,
                owner_key,
                salt,
                version: Some(0),
            },
            version: 0,
            ciphertext: framed,
            owner_token,
            acl_ref,
            editor_index: OWNER_EDITOR,
            world_read: false,
            world_write: false,
            world_token: None,
            signature: Vec::new(),
        };
        acb.sign_as_owner(owner);
        acb
    }

    /// Build the next version written by the owner, keeping the current
    /// ACL/payload key (no membership change).
    pub fn next_version_as_owner(&self, plaintext: &[u8], owner: &KeyPair, payload_key: &[u8; 32]) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.header.version = Some(next.version);
        next.editor_index = OWNER_EDITOR;
        next.reencrypt(plaintext, payload_key);
        next.reseal_world_token(payload_key);
        next.sign_as_owner(owner);
        next
    }

    /// Build the next version written by an editor at `editor_index`
    /// (spec.md §3: the signature then comes from the editor's key).
    pub fn next_version_as_editor(
        &self,
        plaintext: &[u8],
        editor: &KeyPair,
        editor_index: usize,
        payload_key: &[u8; 32],
    ) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.header.version = Some(next.version);
        next.editor_index = editor_index as i32;
        next.reencrypt(plaintext, payload_key);
        next.reseal_world_token(payload_key);
        next.signature = editor.sign(&next.signing_message());
        next
    }

    /// Like [`create`], but with an explicit payload key instead of a fresh
    /// random one. Used when a new block must share a payload key with an
    /// existing ACL: inherited children copy their parent's ACL (spec.md
    /// §4.6), and an ACL's entries are only sealed to one key at a time, so
    /// a child that wants those entries to grant access has to be encrypted
    /// with that same key rather than generating its own.
    pub fn create_with_key(
        plaintext: &[u8],
        owner: &KeyPair,
        owner_agreement_public: &[u8; 32],
        acl_ref: AclRef,
        payload_key: [u8; 32],
    ) -> Self {
        let mut salt = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let owner_key = owner.public_key();
        let hash = hash_address(&[&owner_key, &salt]);
        let address = Address::new(hash, true, false);

        let nonce = crypto::random_nonce();
        let mut ciphertext = plaintext.to_vec();
        crypto::encrypt(&payload_key, &nonce, 0, &mut ciphertext);
        let mut framed = nonce.to_vec();
        framed.extend_from_slice(&ciphertext);

        let owner_token = seal(owner_agreement_public, &payload_key);

        let mut acb = Acb {
            header: Header {
                kind: super::BlockKind::Acb,
                address,
                owner_key,
                salt,
                version: Some(0),
            },
            version: 0,
            ciphertext: framed,
            owner_token,
            acl_ref,
            editor_index: OWNER_EDITOR,
            world_read: false,
            world_write: false,
            world_token: None,
            signature: Vec::new(),
        };
        acb.sign_as_owner(owner);
        acb
    }

    /// Build the next version, keeping payload and ACL membership
    /// unchanged, but with new world-readable/world-writable bits
    /// (spec.md §4.6). Only the owner may change these, mirroring
    /// [`next_version_as_owner`]. `payload_key` is the block's existing key
    /// (unsealed from `owner_token`), needed to reseal `world_token` to the
    /// well-known world agreement key when either bit turns on, or to drop
    /// it when both turn off.
    pub fn next_version_with_world_permissions(
        &self,
        owner: &KeyPair,
        payload_key: &[u8; 32],
        world_read: bool,
        world_write: bool,
    ) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.header.version = Some(next.version);
        next.editor_index = OWNER_EDITOR;
        next.world_read = world_read;
        next.world_write = world_write;
        next.reseal_world_token(payload_key);
        next.sign_as_owner(owner);
        next
    }

    /// Build the next version when the ACL itself changes (a new
    /// membership list lives at a new `acl_ref`, since ACL blocks are
    /// content-addressed CHBs). Takes an explicit `payload_key` rather
    /// than generating one, since the caller typically needs to reseal
    /// the new ACL's entries to that key (producing the CHB whose
    /// address becomes `acl_ref`) before this call, per spec.md §3 ("Any
    /// edit that changes the ACL must re-seal the payload with a fresh
    /// symmetric key and re-issue all tokens").
    pub fn next_version_with_acl(
        &self,
        plaintext: &[u8],
        owner: &KeyPair,
        owner_agreement_public: &[u8; 32],
        acl_ref: AclRef,
        payload_key: [u8; 32],
    ) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.header.version = Some(next.version);
        next.editor_index = OWNER_EDITOR;
        next.acl_ref = acl_ref;
        next.reencrypt(plaintext, &payload_key);
        next.owner_token = seal(owner_agreement_public, &payload_key);
        next.reseal_world_token(&payload_key);
        next.sign_as_owner(owner);
        next
    }

    /// Re-key the block: rotate to a fresh payload key, reseal
    /// `owner_token`, and re-encrypt with the new key. Callers must also
    /// reseal every ACL entry's token (`acl::Acl::reseal`) — spec.md §3:
    /// "Any edit that changes the ACL must re-seal the payload with a
    /// fresh symmetric key and re-issue all tokens."
    pub fn rekey(&mut self, plaintext: &[u8], owner_agreement_public: &[u8; 32]) -> [u8; 32] {
        let payload_key = crypto::random_key();
        self.reencrypt(plaintext, &payload_key);
        self.owner_token = seal(owner_agreement_public, &payload_key);
        self.reseal_world_token(&payload_key);
        payload_key
    }

    fn reencrypt(&mut self, plaintext: &[u8], payload_key: &[u8; 32]) {
        let nonce = crypto::random_nonce();
        let mut ciphertext = plaintext.to_vec();
        crypto::encrypt(payload_key, &nonce, 0, &mut ciphertext);
        let mut framed = nonce.to_vec();
        framed.extend_from_slice(&ciphertext);
        self.ciphertext = framed;
    }

    /// Reseal `world_token` to the current payload key, or drop it, so it
    /// always matches both the world bits and whatever key the payload is
    /// currently encrypted with.
    fn reseal_world_token(&mut self, payload_key: &[u8; 32]) {
        self.world_token = if self.world_read || self.world_write {
            Some(seal(&crypto::world_agreement_keypair().public_key(), payload_key))
        } else {
            None
        };
    }

    /// Decrypt the payload, given the resolved payload key.
    pub fn decrypt(&self, payload_key: &[u8; 32]) -> Result<Vec<u8>> {
        if self.ciphertext.len() < 24 {
            return Err(validation_error("ACB ciphertext missing nonce frame"));
        }
        let (nonce, body) = self.ciphertext.split_at(24);
        let mut plaintext = body.to_vec();
        crypto::decrypt(payload_key, nonce, 0, &mut plaintext);
        Ok(plaintext)
    }

    fn signing_message(&self) -> Vec<u8> {
        let mut msg = Vec::new();
        msg.extend_from_slice(self.header.address.hash_bytes());
        msg.extend_from_slice(&self.version.to_le_bytes());
        msg.extend_from_slice(&self.ciphertext);
        msg.extend_from_slice(&bincode::serialize(&self.owner_token).unwrap());
        msg.extend_from_slice(self.acl_ref.hash_bytes());
        msg.push(self.world_read as u8);
        msg.push(self.world_write as u8);
        if let Some(token) = &self.world_token {
            msg.extend_from_slice(&bincode::serialize(token).unwrap());
        }
        msg
    }

    fn sign_as_owner(&mut self, owner: &KeyPair) {
        self.signature = owner.sign(&self.signing_message());
    }

    /// The block's address.
    pub fn address(&self) -> Address {
        self.header.address
    }

    /// Validate per spec.md §4.2: validate as an owner-signed envelope,
    /// then — if `editor_index >= 0` — fetch the ACL, locate the editor's
    /// entry, require `write`, and verify the data signature with that
    /// entry's public key. `acl_fetch` supplies the ACL block's raw
    /// payload bytes (the CHB holding the ACL).
    pub fn validate<F>(&self, acl_fetch: F) -> Result<()>
    where
        F: FnOnce(Address) -> Result<super::Block>,
    {
        let expected = hash_address(&[&self.header.owner_key, &self.header.salt]);
        if expected != *self.header.address.hash_bytes() {
            return Err(validation_error("ACB address does not match H(owner_key‖salt)"));
        }

        if self.editor_index == OWNER_EDITOR {
            return crypto::verify(&self.header.owner_key, &self.signing_message(), &self.signature);
        }

        if self.editor_index < 0 {
            return Err(validation_error("negative editor_index other than OWNER_EDITOR"));
        }

        let acl_block = acl_fetch(self.acl_ref)?;
        let acl_bytes = match &acl_block {
            super::Block::Chb(chb) => {
                chb.validate()?;
                &chb.data
            }
            _ => return Err(validation_error("acl_ref did not resolve to a CHB")),
        };
        let acl = super::acl::Acl::from_bytes(acl_bytes)
            .map_err(|e| validation_error(format!("malformed ACL: {}", e)))?;

        let entry = acl
            .entries
            .get(self.editor_index as usize)
            .ok_or_else(|| validation_error("editor_index out of range"))?;
        if !entry.write {
            return Err(Error::PermissionDenied(
                "ACL entry does not grant write".into(),
            ));
        }

        crypto::verify(&entry.user_key, &self.signing_message(), &self.signature)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::acl::Acl;
    use crate::block::chb::Chb;
    use crate::block::Block;
    use crate::crypto::AgreementKeyPair;

    fn acl_fetch_ok(acl: Acl) -> impl Fn(Address) -> Result<Block> {
        let chb = Chb::seal(acl.to_bytes(), &KeyPair::generate().unwrap());
        move |_| Ok(Block::Chb(chb.clone()))
    }

    #[test]
    fn owner_written_acb_validates() {
        let owner = KeyPair::generate().unwrap();
        let owner_agree = AgreementKeyPair::generate();
        let acl_ref = Address::new([0u8; 32], false, false);
        let acb = Acb::create(b"directory contents", &owner, &owner_agree.public_key(), acl_ref);
        acb.validate(|_| unreachable!("owner path never fetches ACL")).unwrap();
    }

    #[test]
    fn editor_without_write_is_rejected() {
        let owner = KeyPair::generate().unwrap();
        let owner_agree = AgreementKeyPair::generate();
        let editor = KeyPair::generate().unwrap();

        let mut acl = Acl::new();
        acl.upsert(
            editor.public_key(),
            AgreementKeyPair::generate().public_key(),
            true,
            false,
            &crypto::random_key(),
        );

        let acl_ref = Address::new([1u8; 32], false, false);
        let mut acb = Acb::create(b"v0", &owner, &owner_agree.public_key(), acl_ref);
        let payload_key = crypto::random_key();
        acb = acb.next_version_as_editor(b"v1", &editor, 0, &payload_key);

        let fetch = acl_fetch_ok(acl);
        assert!(acb.validate(fetch).is_err());
    }

    #[test]
    fn editor_with_write_is_accepted() {
        let owner = KeyPair::generate().unwrap();
        let owner_agree = AgreementKeyPair::generate();
        let editor = KeyPair::generate().unwrap();

        let mut acl = Acl::new();
        acl.upsert(
            editor.public_key(),
            AgreementKeyPair::generate().public_key(),
            true,
            true,
            &crypto::random_key(),
        );

        let acl_ref = Address::new([2u8; 32], false, false);
        let acb0 = Acb::create(b"v0", &owner, &owner_agree.public_key(), acl_ref);
        let payload_key = crypto::random_key();
        let acb1 = acb0.next_version_as_editor(b"v1", &editor, 0, &payload_key);

        let fetch = acl_fetch_ok(acl);
        acb1.validate(fetch).unwrap();
    }

    #[test]
    fn swapping_acl_ref_invalidates_signature() {
        let owner = KeyPair::generate().unwrap();
        let owner_agree = AgreementKeyPair::generate();
        let acl_ref = Address::new([3u8; 32], false, false);
        let mut acb = Acb::create(b"v0", &owner, &owner_agree.public_key(), acl_ref);
        acb.acl_ref = Address::new([4u8; 32], false, false);
        assert!(acb.validate(|_| unreachable!()).is_err());
    }
}
