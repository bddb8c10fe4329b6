//! Passports (spec.md §6 `passports/<owner>/<network>/<user>`): a
//! certificate the network owner issues a user, used to negotiate an RPC
//! session key (spec.md §6: "symmetrically encrypted once a session key
//! is negotiated via the owner's certificate chain ('passport')").

use serde_derive::{Deserialize, Serialize};

use crate::crypto::KeyPair;
use crate::error::{Error, Result};

/// A network owner's grant of access to `user_key` on `network`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Passport {
    pub owner_key: Vec<u8>,
    pub network: String,
    pub user_key: Vec<u8>,
    pub allow_write: bool,
    signature: Vec<u8>,
}

impl Passport {
    /// Issue a passport, signed by the network's owner.
    pub fn issue(owner: &KeyPair, network: impl Into<String>, user_key: Vec<u8>, allow_write: bool) -> Self {
        let owner_key = owner.public_key();
        let network = network.into();
        let mut passport = Passport {
            owner_key,
            network,
            user_key,
            allow_write,
            signature: Vec::new(),
        };
        passport.signature = owner.sign(&passport.signing_message());
        passport
    }

    fn signing_message(&self) -> Vec<u8> {
        let mut msg = Vec::new();
        msg.extend_from_slice(&self.owner_key);
        msg.extend_from_slice(self.network.as_bytes());
        msg.extend_from_slice(&self.user_key);
        msg.push(self.allow_write as u8);
        msg
    }

    /// Verify the owner's signature over this passport's claims.
    pub fn verify(&self) -> Result<()> {
        crate::crypto::verify(&self.owner_key, &self.signing_message(), &self.signature)
            .map_err(|_| Error::PermissionDenied("passport signature invalid".into()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn issued_passport_verifies() {
        let owner = KeyPair::generate().unwrap();
        let user = KeyPair::generate().unwrap();
        let passport = Passport::issue(&owner, "home", user.public_key(), true);
        passport.verify().unwrap();
    }

    #[test]
    fn tampered_passport_fails_verification() {
        let owner = KeyPair::generate().unwrap();
        let user = KeyPair::generate().unwrap();
        let mut passport = Passport::issue(&owner, "home", user.public_key(), false);
        passport.allow_write = true;
        assert!(passport.verify().is_err());
    }
}
