//! Directory operations (spec.md §4.5.1), grounded in the teacher's
//! `metadata/dir.rs` entry manipulation, generalized onto
//! [`crate::resolver::DirectoryEdit`] so that concurrent writers racing on
//! the same parent resolve instead of clobbering each other.

use chrono::Utc;
use log::warn;

use super::{no_acl, Filesystem};
use crate::address::Address;
use crate::block::{Acb, Block};
use crate::consensus::Consensus;
use crate::error::{Error, Result};
use crate::payload::{DirectoryPayload, EntryType, FilePayload};
use crate::permissions::Need;
use crate::resolver::DirectoryEdit;
use crate::silo::SetMode;

/// One entry as seen by a directory listing.
#[derive(Clone, Debug)]
pub struct Entry {
    pub name: String,
    pub address: Address,
    pub entry_type: EntryType,
}

impl<C: Consensus + 'static> Filesystem<C> {
    /// Create an empty subdirectory at `path` with the given `mode`,
    /// failing if an entry by that name already exists in the parent.
    pub fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        let (parent_acb, parent_payload, parent_key) = self.fetch_directory(parent)?;
        self.authorize(&parent_acb, Need::Write)?;

        let new_payload = DirectoryPayload::new(
            parent_payload.header.uid,
            parent_payload.header.gid,
            mode,
            parent_payload.header.block_size,
            Utc::now(),
        );

        let child = self.create_child_acb(&parent_acb, parent_payload.inherit_auth, parent_key, &new_payload.to_bytes())?;
        let address = child.address();
        self.consensus.store(Block::Acb(child), SetMode::InsertOnly, None)?;

        let edit = DirectoryEdit::insert_exclusive(name, address, EntryType::Directory);
        if let Err(e) = self.apply_resolver(parent, edit.into_resolver()) {
            let _ = self.consensus.remove(address);
            return Err(e);
        }
        Ok(())
    }

    /// Create an empty regular file at `path`, failing if an entry by that
    /// name already exists in the parent.
    pub fn create_file(&self, path: &str, mode: u32) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        let (parent_acb, parent_payload, parent_key) = self.fetch_directory(parent)?;
        self.authorize(&parent_acb, Need::Write)?;

        let new_payload = FilePayload::new(
            parent_payload.header.uid,
            parent_payload.header.gid,
            mode,
            parent_payload.header.block_size,
            Utc::now(),
        );

        let child = self.create_child_acb(&parent_acb, parent_payload.inherit_auth, parent_key, &new_payload.to_bytes())?;
        let address = child.address();
        self.consensus.store(Block::Acb(child), SetMode::InsertOnly, None)?;

        let edit = DirectoryEdit::insert_exclusive(name, address, EntryType::File);
        if let Err(e) = self.apply_resolver(parent, edit.into_resolver()) {
            let _ = self.consensus.remove(address);
            return Err(e);
        }
        Ok(())
    }

    fn create_child_acb(&self, parent_acb: &Acb, inherit_auth: bool, parent_key: [u8; 32], plaintext: &[u8]) -> Result<Acb> {
        if inherit_auth {
            Ok(Acb::create_with_key(
                plaintext,
                &self.identity,
                &self.agreement.public_key(),
                parent_acb.acl_ref,
                parent_key,
            ))
        } else {
            Ok(Acb::create(plaintext, &self.identity, &self.agreement.public_key(), no_acl()))
        }
    }

    /// Remove a regular file or symlink's directory entry and its block.
    pub fn unlink(&self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        let (address, kind) = self.resolve(path)?;
        if kind == EntryType::Directory {
            return Err(Error::InvalidArgument("unlink target is a directory".into()));
        }
        let (parent_acb, _, _) = self.fetch_directory(parent)?;
        self.authorize(&parent_acb, Need::Write)?;
        self.apply_resolver(parent, DirectoryEdit::remove(name).into_resolver())?;
        if let Err(e) = self.consensus.remove(address) {
            warn!("fs: unlink of {:?} left the block behind: {}", address, e);
        }
        Ok(())
    }

    /// Remove an empty subdirectory's entry and its block.
    pub fn rmdir(&self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        let (address, kind) = self.resolve(path)?;
        if kind != EntryType::Directory {
            return Err(Error::InvalidArgument("rmdir target is not a directory".into()));
        }
        let (_, payload, _) = self.fetch_directory(address)?;
        if !payload.entries.is_empty() {
            return Err(Error::NotEmpty(address));
        }
        let (parent_acb, _, _) = self.fetch_directory(parent)?;
        self.authorize(&parent_acb, Need::Write)?;
        self.apply_resolver(parent, DirectoryEdit::remove(name).into_resolver())?;
        if let Err(e) = self.consensus.remove(address) {
            warn!("fs: rmdir of {:?} left the block behind: {}", address, e);
        }
        Ok(())
    }

    /// Move `from` to `to`. Within a single parent this is one update to
    /// that parent's entry map; across parents it is an insert into the
    /// destination followed by a remove from the source (spec.md §4.5.1).
    /// A pre-existing destination file is unlinked first; a pre-existing
    /// destination directory must be empty.
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (src_parent, src_name) = self.resolve_parent(from)?;
        let (dst_parent, dst_name) = self.resolve_parent(to)?;
        let (address, kind) = self.resolve(from)?;

        let (src_parent_acb, _, _) = self.fetch_directory(src_parent)?;
        self.authorize(&src_parent_acb, Need::Write)?;
        if dst_parent != src_parent {
            let (dst_parent_acb, _, _) = self.fetch_directory(dst_parent)?;
            self.authorize(&dst_parent_acb, Need::Write)?;
        }

        if let Ok((existing_address, existing_kind)) = self.resolve(to) {
            match existing_kind {
                EntryType::Directory => {
                    let (_, existing_payload, _) = self.fetch_directory(existing_address)?;
                    if !existing_payload.entries.is_empty() {
                        return Err(Error::NotEmpty(existing_address));
                    }
                    self.apply_resolver(dst_parent, DirectoryEdit::remove(dst_name.clone()).into_resolver())?;
                    let _ = self.consensus.remove(existing_address);
                }
                _ => {
                    self.apply_resolver(dst_parent, DirectoryEdit::remove(dst_name.clone()).into_resolver())?;
                    let _ = self.consensus.remove(existing_address);
                }
            }
        }

        if src_parent == dst_parent {
            self.apply_transform(src_parent, None, |current| {
                let remove = DirectoryEdit::remove(src_name.clone());
                let insert = DirectoryEdit::insert(dst_name.clone(), address, kind);
                let combined = remove.resolve(current)?;
                insert.resolve(&combined)
            })?;
        } else {
            self.apply_resolver(dst_parent, DirectoryEdit::insert(dst_name, address, kind).into_resolver())?;
            self.apply_resolver(src_parent, DirectoryEdit::remove(src_name).into_resolver())?;
        }
        Ok(())
    }

    /// List a directory's entries, kicking off background prefetch of
    /// each child's block (spec.md §4.5.1: "up to N concurrent background
    /// tasks fetch child blocks to warm the cache").
    pub fn list_directory(&self, path: &str) -> Result<Vec<Entry>> {
        let (address, kind) = self.resolve(path)?;
        if kind != EntryType::Directory {
            return Err(Error::InvalidArgument("not a directory".into()));
        }
        let (_, payload, _) = self.fetch_directory(address)?;
        let entries: Vec<Entry> = payload
            .entries
            .iter()
            .map(|(name, entry)| Entry {
                name: name.clone(),
                address: entry.address,
                entry_type: entry.entry_type,
            })
            .collect();
        self.prefetch(entries.iter().map(|e| e.address));
        Ok(entries)
    }

    /// Open a directory for a `readdir`/`releasedir` session.
    pub fn opendir(&self, path: &str) -> Result<super::FileHandle> {
        let (address, kind) = self.resolve(path)?;
        if kind != EntryType::Directory {
            return Err(Error::InvalidArgument("not a directory".into()));
        }
        let handle = self.handles.allocate();
        self.open_dirs.lock().unwrap().insert(handle, address);
        Ok(handle)
    }

    /// List the entries of a directory opened via [`Filesystem::opendir`].
    pub fn readdir_handle(&self, handle: super::FileHandle) -> Result<Vec<Entry>> {
        let address = *self
            .open_dirs
            .lock()
            .unwrap()
            .get(&handle)
            .ok_or_else(|| Error::InvalidArgument("unknown directory handle".into()))?;
        let (_, payload, _) = self.fetch_directory(address)?;
        let entries: Vec<Entry> = payload
            .entries
            .iter()
            .map(|(name, entry)| Entry {
                name: name.clone(),
                address: entry.address,
                entry_type: entry.entry_type,
            })
            .collect();
        self.prefetch(entries.iter().map(|e| e.address));
        Ok(entries)
    }

    /// Close a directory handle opened via [`Filesystem::opendir`].
    pub fn releasedir(&self, handle: super::FileHandle) {
        self.open_dirs.lock().unwrap().remove(&handle);
    }
}
