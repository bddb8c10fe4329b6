//! Network descriptors (spec.md §6 `networks/<owner>/<name>`): the
//! network-wide configuration a volume is built on — admin keys and
//! world-permission defaults (spec.md §4.6), replication factor, cache
//! bounds, and the silo backing the network's blocks (spec.md §6's
//! "Configuration" list).

use serde_derive::{Deserialize, Serialize};

use crate::permissions::AdminKeys;

/// Which concrete silo backend a network's blocks are stored in, plus its
/// parameters ("silo kind + parameters", spec.md §6). Mirrors the two
/// concrete [`crate::silo::Silo`] implementations this crate ships.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum SiloKind {
    /// Backed by `crate::silo::memory::MemorySilo`; parameters: none.
    Memory,
    /// Backed by `crate::silo::file::FileSilo`; parameters: the directory
    /// blocks are written under.
    File { path: String },
}

/// The silo configuration persisted at `silos/<name>` (spec.md §6).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SiloConfig {
    pub name: String,
    pub kind: SiloKind,
    /// Bytes this silo may hold, if bounded (`Silo::capacity`).
    pub capacity: Option<u64>,
}

impl SiloConfig {
    pub fn new(name: impl Into<String>, kind: SiloKind) -> Self {
        SiloConfig {
            name: name.into(),
            kind,
            capacity: None,
        }
    }
}

/// Recognized configuration options from spec.md §6, with their defaults.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NetworkOptions {
    pub replication_factor: u32,
    pub eviction_delay_secs: u64,
    pub async_max_queue: u32,
    pub cache_ram_size: u64,
    pub cache_ram_ttl_secs: u64,
    pub cache_disk_size: u64,
    pub max_embed_size: u64,
    pub first_block_data_size: u64,
    pub block_size: u64,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        NetworkOptions {
            replication_factor: 1,
            eviction_delay_secs: 600,
            async_max_queue: 4096,
            cache_ram_size: 64 << 20,
            cache_ram_ttl_secs: 300,
            cache_disk_size: 0,
            max_embed_size: 8192,
            first_block_data_size: 0,
            block_size: 1 << 20,
        }
    }
}

/// A network descriptor: the owner's public key, its name, admin keys and
/// world-permission defaults (spec.md §4.6), the silo it stores blocks
/// in, and its tunables.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NetworkDescriptor {
    pub owner_key: Vec<u8>,
    pub name: String,
    pub admins: AdminKeys,
    pub world_read_default: bool,
    pub world_write_default: bool,
    pub silo: String,
    pub options: NetworkOptions,
}

impl NetworkDescriptor {
    pub fn new(owner_key: Vec<u8>, name: impl Into<String>, silo: impl Into<String>) -> Self {
        NetworkDescriptor {
            owner_key,
            name: name.into(),
            admins: AdminKeys::new(),
            world_read_default: false,
            world_write_default: false,
            silo: silo.into(),
            options: NetworkOptions::default(),
        }
    }

    pub fn owner_hex(&self) -> String {
        hex_encode(&self.owner_key)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A network linked into a user's local registry, at
/// `linked_networks/<user>/<owner>/<name>` (spec.md §6): the descriptor
/// plus whatever private model state (e.g. the user's own passport
/// address) makes the network locally usable.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LinkedNetwork {
    pub descriptor: NetworkDescriptor,
    pub root: crate::address::Address,
}

impl LinkedNetwork {
    pub fn new(descriptor: NetworkDescriptor, root: crate::address::Address) -> Self {
        LinkedNetwork { descriptor, root }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn owner_hex_is_lowercase_and_stable() {
        let net = NetworkDescriptor::new(vec![0xde, 0xad, 0xbe, 0xef], "home", "local");
        assert_eq!(net.owner_hex(), "deadbeef");
    }

    #[test]
    fn defaults_match_spec_recognized_options() {
        let options = NetworkOptions::default();
        assert_eq!(options.replication_factor, 1);
        assert_eq!(options.block_size, 1 << 20);
        assert_eq!(options.cache_disk_size, 0);
    }
}
