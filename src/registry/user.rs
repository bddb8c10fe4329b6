//! User identities (spec.md §6 `users/<name>`, "mode 0600"): the local
//! keypair a user authenticates with, at rest. Grounded in the teacher's
//! `metadata/user.rs` `User` (password-derived key, nonce, and an
//! encrypted validation blob) but storing the user's actual signing and
//! agreement keys rather than only a login check, since this registry
//! has no separate in-memory session store to hand them out from.

use rand::RngCore;
use serde_derive::{Deserialize, Serialize};

use crate::crypto::{self, AgreementKeyPair, KeyPair};
use crate::error::{Error, Result};

/// A user's identity at rest: their public keys in the clear, and their
/// private key material sealed behind a password-derived key.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct UserIdentity {
    pub name: String,
    pub public_key: Vec<u8>,
    pub agreement_public: [u8; 32],
    nonce: [u8; 16],
    sealed_pkcs8: Vec<u8>,
    sealed_agreement: [u8; 32],
}

impl UserIdentity {
    /// Generate a fresh keypair and seal it behind `password`.
    pub fn create(name: impl Into<String>, password: &str) -> Result<Self> {
        let signing = KeyPair::generate()?;
        let agreement = AgreementKeyPair::generate();

        let mut nonce = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let key = crypto::make_fs_key(password, &nonce);
        let aead_nonce = crypto::random_nonce();

        let mut sealed_pkcs8 = signing.pkcs8().to_vec();
        crypto::encrypt(&key, &aead_nonce, 0, &mut sealed_pkcs8);
        let mut framed_pkcs8 = aead_nonce.to_vec();
        framed_pkcs8.extend_from_slice(&sealed_pkcs8);

        let mut sealed_agreement = agreement.to_bytes();
        crypto::encrypt(&key, &aead_nonce, 0, &mut sealed_agreement);

        Ok(UserIdentity {
            name: name.into(),
            public_key: signing.public_key(),
            agreement_public: agreement.public_key(),
            nonce,
            sealed_pkcs8: framed_pkcs8,
            sealed_agreement,
        })
    }

    /// Unlock the stored keypair with `password`. Wrong passwords recover
    /// garbage pkcs8 bytes rather than failing cleanly, since this is a
    /// symmetric cipher with no authentication tag of its own — the
    /// pkcs8 parse inside `KeyPair::from_pkcs8` is what actually rejects
    /// a wrong password, mirroring the caveat already documented on
    /// `crypto::unseal`.
    pub fn unlock(&self, password: &str) -> Result<(KeyPair, AgreementKeyPair)> {
        let key = crypto::make_fs_key(password, &self.nonce);

        if self.sealed_pkcs8.len() < 24 {
            return Err(Error::InvalidArgument("corrupt user identity".into()));
        }
        let (aead_nonce, body) = self.sealed_pkcs8.split_at(24);
        let mut pkcs8 = body.to_vec();
        crypto::decrypt(&key, aead_nonce, 0, &mut pkcs8);
        let signing = KeyPair::from_pkcs8(&pkcs8)
            .map_err(|_| Error::PermissionDenied("wrong password".into()))?;

        let mut agreement_bytes = self.sealed_agreement;
        crypto::decrypt(&key, aead_nonce, 0, &mut agreement_bytes);
        let agreement = AgreementKeyPair::from_bytes(agreement_bytes);

        if agreement.public_key() != self.agreement_public || signing.public_key() != self.public_key {
            return Err(Error::PermissionDenied("wrong password".into()));
        }

        Ok((signing, agreement))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unlock_with_correct_password_recovers_matching_keys() {
        let identity = UserIdentity::create("alice", "correct horse battery staple").unwrap();
        let (signing, agreement) = identity.unlock("correct horse battery staple").unwrap();
        assert_eq!(signing.public_key(), identity.public_key);
        assert_eq!(agreement.public_key(), identity.agreement_public);
    }

    #[test]
    fn unlock_with_wrong_password_is_rejected() {
        let identity = UserIdentity::create("alice", "correct horse battery staple").unwrap();
        assert!(identity.unlock("wrong password").is_err());
    }
}
