//! Cryptographic helpers: hashing, signing, sealing and symmetric chunk
//! encryption.
//!
//! Grounded in the teacher's `crypto.rs` (key derivation via
//! `pbkdf2`/`hmac`/`sha2`, stream encryption via `c2_chacha::XChaCha20`) and
//! `block/hash.rs` (`ring::digest::SHA256`). Owner/editor signing
//! (`ring::signature::Ed25519KeyPair`) and payload-key sealing
//! (`x25519_dalek` static-key ECDH + HKDF) are supplements the teacher has
//! no equivalent for, since its blocks are anonymous rather than
//! owner-signed; `x25519-dalek` is pulled in because `ring` 0.14's
//! agreement API only supports one-shot ephemeral keys and the ACL model
//! needs a long-lived agreement key per user (spec.md §3, §4.6).

use c2_chacha::{
    stream_cipher::{NewStreamCipher, SyncStreamCipher, SyncStreamCipherSeek},
    XChaCha20,
};
use hmac::Hmac;
use rand::{rngs::OsRng as Rand07OsRng, RngCore};
use rand_core::OsRng;
use ring::{digest, hkdf, signature};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Error, Result};

/// An Ed25519 keypair: the owner/editor/group-control identity used
/// everywhere the spec says "owner key" or "editor key" (spec.md §3).
pub struct KeyPair {
    pkcs8: Vec<u8>,
    keypair: signature::Ed25519KeyPair,
}

impl KeyPair {
    /// Generate a fresh signing keypair.
    pub fn generate() -> Result<Self> {
        let rng = ring::rand::SystemRandom::new();
        let pkcs8 = signature::Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| Error::ValidationFailed("keypair generation failed".into()))?;
        Self::from_pkcs8(pkcs8.as_ref())
    }

    /// Reload a keypair from its PKCS#8 document, as stored in the user's
    /// identity file (spec.md §6, `users/<name>`).
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self> {
        let keypair = signature::Ed25519KeyPair::from_pkcs8(untrusted::Input::from(pkcs8))
            .map_err(|_| Error::ValidationFailed("keypair parse failed".into()))?;
        Ok(KeyPair {
            pkcs8: pkcs8.to_vec(),
            keypair,
        })
    }

    /// The PKCS#8 document, for persistence.
    pub fn pkcs8(&self) -> &[u8] {
        &self.pkcs8
    }

    /// The raw public key bytes, used as the owner/editor identity
    /// throughout the block model.
    pub fn public_key(&self) -> Vec<u8> {
        self.keypair.public_key_bytes().to_vec()
    }

    /// Sign a message with this key.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.keypair.sign(message).as_ref().to_vec()
    }
}

/// Verify a signature against a raw Ed25519 public key.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    signature::verify(
        &signature::ED25519,
        untrusted::Input::from(public_key),
        untrusted::Input::from(message),
        untrusted::Input::from(signature),
    )
    .map_err(|_| Error::ValidationFailed("signature verification failed".into()))
}

/// SHA-256 a buffer, used for CHB/OKB/ACB address derivation checks and
/// per-block integrity hashes (grounded in `block/hash.rs`).
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let d = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    out
}

/// Derive the file system master key from a password (teacher's
/// `crypto::make_fs_key`, generalized from a `UfsUuid` salt to an opaque
/// byte salt so it can also key-derive per-ACL agreement material).
pub fn make_fs_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0; 32];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, 271_828, &mut key);
    key
}

/// Encrypt `data` in place with `key`/`nonce` starting at stream `offset`,
/// identical in shape to the teacher's `crypto::encrypt`.
pub fn encrypt(key: &[u8], nonce: &[u8], offset: u64, data: &mut [u8]) {
    let mut cipher = XChaCha20::new_var(key, nonce).expect("24-byte nonce, 32-byte key");
    cipher.seek(offset);
    cipher.apply_keystream(data);
}

/// Decrypt `data` in place; XChaCha20 is its own inverse (teacher's
/// `crypto::decrypt`).
pub fn decrypt(key: &[u8], nonce: &[u8], offset: u64, data: &mut [u8]) {
    encrypt(key, nonce, offset, data)
}

/// Generate a fresh random 24-byte XChaCha20 nonce.
pub fn random_nonce() -> [u8; 24] {
    let mut nonce = [0u8; 24];
    Rand07OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Generate a fresh random 32-byte symmetric key (used for per-chunk keys
/// and ACB payload tokens, spec.md §3).
pub fn random_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    Rand07OsRng.fill_bytes(&mut key);
    key
}

/// A long-lived X25519 agreement keypair. Every user holds one alongside
/// their Ed25519 signing key (see `registry::user::UserIdentity`); it is
/// the public half that `seal` targets when sealing an ACB's payload key
/// or an ACL entry's token (spec.md §3).
pub struct AgreementKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl AgreementKeyPair {
    /// Generate a fresh agreement keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::new(OsRng);
        let public = PublicKey::from(&secret);
        AgreementKeyPair { secret, public }
    }

    /// Reload from a persisted 32-byte scalar.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        AgreementKeyPair { secret, public }
    }

    /// The bytes to persist.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// The public key to publish in the user's identity / ACL entry.
    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }
}

/// The agreement keypair every replica derives for world-readable/
/// world-writable blocks (spec.md §4.6): a payload key sealed to this
/// well-known scalar is, by construction, recoverable by anyone, which is
/// exactly what "world" access means. Never used for anything that isn't
/// already gated by `Acb::world_read`/`world_write`.
pub fn world_agreement_keypair() -> AgreementKeyPair {
    AgreementKeyPair::from_bytes([0x77; 32])
}

/// A symmetric key sealed to a recipient's agreement public key: an
/// ephemeral X25519 public key plus the ciphertext of the sealed key under
/// an HKDF-derived XChaCha20 key. This is the concrete shape of spec.md
/// §3's `owner_token` and per-entry ACL `token` fields.
#[derive(Clone, Debug, PartialEq, serde_derive::Deserialize, serde_derive::Serialize)]
pub struct SealedKey {
    ephemeral_public: [u8; 32],
    nonce: [u8; 24],
    ciphertext: Vec<u8>,
}

/// Seal `payload_key` so that only the holder of the agreement secret
/// matching `recipient_public` can recover it.
pub fn seal(recipient_public: &[u8; 32], payload_key: &[u8; 32]) -> SealedKey {
    let ephemeral = StaticSecret::new(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient_public));

    let sym_key = derive_sym_key(shared.as_bytes(), &ephemeral_public, recipient_public);
    let nonce = random_nonce();
    let mut ciphertext = payload_key.to_vec();
    encrypt(&sym_key, &nonce, 0, &mut ciphertext);

    SealedKey {
        ephemeral_public,
        nonce,
        ciphertext,
    }
}

/// Recover a payload key sealed with [`seal`], given the recipient's own
/// agreement keypair.
pub fn unseal(recipient: &AgreementKeyPair, sealed: &SealedKey) -> Result<[u8; 32]> {
    let shared = recipient
        .secret
        .diffie_hellman(&PublicKey::from(sealed.ephemeral_public));
    let sym_key = derive_sym_key(
        shared.as_bytes(),
        &sealed.ephemeral_public,
        &recipient.public_key(),
    );

    let mut plaintext = sealed.ciphertext.clone();
    decrypt(&sym_key, &sealed.nonce, 0, &mut plaintext);

    if plaintext.len() != 32 {
        return Err(Error::ValidationFailed(
            "sealed key has wrong length".into(),
        ));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&plaintext);
    Ok(key)
}

fn derive_sym_key(shared: &[u8], ephemeral_public: &[u8], recipient_public: &[u8]) -> [u8; 32] {
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]);
    let prk = salt.extract(shared);
    let mut info = Vec::with_capacity(ephemeral_public.len() + recipient_public.len());
    info.extend_from_slice(ephemeral_public);
    info.extend_from_slice(recipient_public);
    let okm = prk
        .expand(&[&info], hkdf::HKDF_SHA256)
        .expect("hkdf expand");
    let mut key = [0u8; 32];
    okm.fill(&mut key).expect("hkdf fill");
    key
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = KeyPair::generate().unwrap();
        let sig = kp.sign(b"hello");
        verify(&kp.public_key(), b"hello", &sig).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = KeyPair::generate().unwrap();
        let sig = kp.sign(b"hello");
        assert!(verify(&kp.public_key(), b"goodbye", &sig).is_err());
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = random_key();
        let nonce = random_nonce();
        let mut data = b"some file chunk contents".to_vec();
        let original = data.clone();
        encrypt(&key, &nonce, 0, &mut data);
        assert_ne!(data, original);
        decrypt(&key, &nonce, 0, &mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn fs_key_derivation_is_deterministic() {
        let salt = [0x42u8; 16];
        let a = make_fs_key("hunter2", &salt);
        let b = make_fs_key("hunter2", &salt);
        assert_eq!(a, b);
    }

    #[test]
    fn seal_unseal_round_trip() {
        let recipient = AgreementKeyPair::generate();
        let payload_key = random_key();
        let sealed = seal(&recipient.public_key(), &payload_key);
        let recovered = unseal(&recipient, &sealed).unwrap();
        assert_eq!(payload_key, recovered);
    }

    #[test]
    fn unseal_fails_for_wrong_recipient() {
        let recipient = AgreementKeyPair::generate();
        let attacker = AgreementKeyPair::generate();
        let payload_key = random_key();
        let sealed = seal(&recipient.public_key(), &payload_key);
        let recovered = unseal(&attacker, &sealed).unwrap();
        assert_ne!(payload_key, recovered);
    }
}
