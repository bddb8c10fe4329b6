//! Block addresses.
//!
//! An `Address` is the 32-byte content identifier described in spec.md §3.
//! Two flag bits travel alongside the hash rather than being stolen from it,
//! so that `PartialEq` can compare the full 32 bytes plus the flags in one
//! shot, matching the spec's "flags are part of equality" rule without
//! weakening the hash space.

use std::fmt;

use ring::digest;
use serde_derive::{Deserialize, Serialize};

/// 32-byte content identifier for a block.
#[derive(Clone, Copy, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct Address {
    bytes: [u8; 32],
    mutable: bool,
    world_readable: bool,
}

impl Address {
    /// Build an address from raw hash bytes and its flags.
    pub fn new(bytes: [u8; 32], mutable: bool, world_readable: bool) -> Self {
        Address {
            bytes,
            mutable,
            world_readable,
        }
    }

    /// Derive an address by hashing `parts` together, per the derivation
    /// rules in spec.md §3 (`H(data ‖ owner_key ‖ salt)` for CHB,
    /// `H(owner_key ‖ salt)` for OKB/ACB).
    pub fn derive(parts: &[&[u8]], mutable: bool, world_readable: bool) -> Self {
        let mut ctx = digest::Context::new(&digest::SHA256);
        for part in parts {
            ctx.update(part);
        }
        let digest = ctx.finish();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(digest.as_ref());
        Address::new(bytes, mutable, world_readable)
    }

    /// Raw 32-byte hash, ignoring flags.
    pub fn hash_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Whether the block at this address may change under a fixed address.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Whether the block at this address is readable without an ACL check.
    pub fn is_world_readable(&self) -> bool {
        self.world_readable
    }

    /// Stable hex encoding, used as the on-disk key by `FileSilo`
    /// (spec.md §6, `blocks/<silo>/<addr_hex>`).
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.bytes {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Address({}{}{})",
            self.to_hex(),
            if self.mutable { ",mut" } else { "" },
            if self.world_readable { ",world" } else { "" }
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.to_hex().fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn equal_addresses_have_equal_flags() {
        let a = Address::derive(&[b"hello"], true, false);
        let b = Address::derive(&[b"hello"], true, false);
        assert_eq!(a, b);

        let c = Address::derive(&[b"hello"], false, false);
        assert_ne!(a, c, "flags participate in equality");
    }

    #[test]
    fn hex_round_trips_length() {
        let a = Address::derive(&[b"abc"], false, true);
        assert_eq!(a.to_hex().len(), 64);
    }
}
