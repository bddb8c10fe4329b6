//! Volume configuration (spec.md §6 `volumes/<name>`): binds a mounted
//! filesystem to a network and its root block, plus the mount-relevant
//! defaults spec.md §6's option list calls out (`max_embed_size`,
//! `block_size`).

use serde_derive::{Deserialize, Serialize};

use crate::address::Address;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VolumeConfig {
    pub name: String,
    pub network: String,
    pub root: Address,
    pub block_size: u64,
    pub max_embed_size: u64,
    pub default_mode: u32,
}

impl VolumeConfig {
    pub fn new(name: impl Into<String>, network: impl Into<String>, root: Address) -> Self {
        VolumeConfig {
            name: name.into(),
            network: network.into(),
            root,
            block_size: 1 << 20,
            max_embed_size: 8192,
            default_mode: 0o755,
        }
    }
}
