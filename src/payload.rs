//! The decrypted payload shapes carried inside directory and file ACBs
//! (spec.md §3: "Directory block" and "File block"). Lives outside both
//! `fs` and `resolver` so that resolvers can replay edits against a
//! payload without `resolver` depending on the filesystem layer (and vice
//! versa) — the two historically-entangled teacher modules
//! (`metadata/dir.rs`, `metadata/file.rs`) are generalized here into
//! plain, consensus-agnostic data.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::Result;

/// What a directory entry points at (spec.md §3).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum EntryType {
    /// Reserved while a create is in flight but not yet committed.
    Pending,
    /// A regular file.
    File,
    /// A subdirectory.
    Directory,
    /// A symbolic link.
    Symlink,
}

/// One entry in a directory's entry map.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DirEntry {
    /// What kind of node this is.
    pub entry_type: EntryType,
    /// The address of the child's block.
    pub address: Address,
}

/// POSIX metadata common to directories and files.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Header {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub atime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub ctime: DateTime<Utc>,
    pub block_size: u32,
}

/// A directory's ACB payload (spec.md §3).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DirectoryPayload {
    pub header: Header,
    /// `name -> entry`.
    pub entries: HashMap<String, DirEntry>,
    /// `user.infinit.*`-style extended attributes (spec.md §4.5.4).
    pub xattrs: HashMap<String, Vec<u8>>,
    /// Whether children created here copy this directory's ACL at
    /// creation (spec.md §4.6).
    pub inherit_auth: bool,
}

impl DirectoryPayload {
    /// A freshly created, empty directory.
    pub fn new(uid: u32, gid: u32, mode: u32, block_size: u32, now: DateTime<Utc>) -> Self {
        DirectoryPayload {
            header: Header {
                uid,
                gid,
                mode,
                atime: now,
                mtime: now,
                ctime: now,
                block_size,
            },
            entries: HashMap::new(),
            xattrs: HashMap::new(),
            inherit_auth: false,
        }
    }

    /// Serialize for storage as the ACB's decrypted payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("directory payload serialization is infallible")
    }

    /// Deserialize from an ACB's decrypted payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// One FAT entry: a chunk's content address and its per-chunk symmetric
/// key (spec.md §3). A zero address marks a hole.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FatEntry {
    pub address: Address,
    pub key: [u8; 32],
}

impl FatEntry {
    /// A hole: no content has ever been written to this chunk.
    pub fn hole() -> Self {
        FatEntry {
            address: Address::new([0u8; 32], false, false),
            key: [0u8; 32],
        }
    }

    /// Whether this entry is a hole.
    pub fn is_hole(&self) -> bool {
        *self.address.hash_bytes() == [0u8; 32]
    }
}

/// A file's ACB payload (spec.md §3).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FilePayload {
    pub header: Header,
    /// Logical file size in bytes.
    pub size: u64,
    /// Embedded prefix, used in full for small files (spec.md §4.5.2).
    pub inline_data: Vec<u8>,
    /// Fixed-size chunks beyond the inline prefix.
    pub fat: Vec<FatEntry>,
    pub xattrs: HashMap<String, Vec<u8>>,
}

impl FilePayload {
    /// A freshly created, empty file.
    pub fn new(uid: u32, gid: u32, mode: u32, block_size: u32, now: DateTime<Utc>) -> Self {
        FilePayload {
            header: Header {
                uid,
                gid,
                mode,
                atime: now,
                mtime: now,
                ctime: now,
                block_size,
            },
            size: 0,
            inline_data: Vec::new(),
            fat: Vec::new(),
            xattrs: HashMap::new(),
        }
    }

    /// Serialize for storage as the ACB's decrypted payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("file payload serialization is infallible")
    }

    /// Deserialize from an ACB's decrypted payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
