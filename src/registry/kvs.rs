//! Key-value store configuration (spec.md §6 `kvs/<name>`): a named,
//! network-backed key-value namespace layered over the same block
//! storage as the filesystem, for applications that want direct
//! key-value access without the POSIX surface.

use serde_derive::{Deserialize, Serialize};

use crate::address::Address;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct KvsConfig {
    pub name: String,
    pub network: String,
    pub root: Address,
}

impl KvsConfig {
    pub fn new(name: impl Into<String>, network: impl Into<String>, root: Address) -> Self {
        KvsConfig {
            name: name.into(),
            network: network.into(),
            root,
        }
    }
}
