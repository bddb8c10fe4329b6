//! Extended attributes (spec.md §4.5.4): arbitrary name/value pairs stored
//! alongside a directory or file's payload, plus a small set of
//! `user.infinit.*` operational attributes that the filesystem translates
//! into ACL/block operations instead of storing verbatim: permission
//! manipulation (`auth.setr`/`auth.setw`/`auth.setrw`/`auth.clear`,
//! `auth_others`, `auth.inherit`), group management
//! (`group.create`/`group.delete`/`group.<name>.add`/`group.<name>.remove`),
//! volume introspection (`block`, `blockof.<name>`, `sync`), and repair
//! (`fsck.*`, not supported in this build).

use super::Filesystem;
use crate::address::Address;
use crate::block::acl::Acl;
use crate::block::{Block, Chb};
use crate::consensus::Consensus;
use crate::error::{Error, Result};
use crate::payload::{DirectoryPayload, EntryType, FilePayload};
use crate::permissions::{Group, Need};
use crate::resolver::permissions_edit::PayloadKind;
use crate::resolver::PermissionsEdit;
use crate::silo::SetMode;

const NS: &str = "user.infinit.";

impl<C: Consensus + 'static> Filesystem<C> {
    /// Read one extended attribute's value.
    pub fn getxattr(&self, path: &str, name: &str) -> Result<Vec<u8>> {
        let (address, kind) = self.resolve(path)?;

        if let Some(op) = name.strip_prefix(NS) {
            return self.get_operational_xattr(address, kind, op);
        }

        let xattrs = match kind {
            EntryType::Directory => self.fetch_directory(address)?.1.xattrs,
            _ => self.fetch_file(address)?.1.xattrs,
        };
        xattrs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::InvalidArgument(format!("no such attribute: {}", name)))
    }

    /// List the names of every extended attribute set on `path`.
    pub fn listxattr(&self, path: &str) -> Result<Vec<String>> {
        let (address, kind) = self.resolve(path)?;
        let xattrs = match kind {
            EntryType::Directory => self.fetch_directory(address)?.1.xattrs,
            _ => self.fetch_file(address)?.1.xattrs,
        };
        Ok(xattrs
            .into_keys()
            .filter(|name| !name.starts_with("__group__"))
            .collect())
    }

    /// Set one extended attribute's value.
    pub fn setxattr(&self, path: &str, name: &str, value: &[u8]) -> Result<()> {
        let (address, kind) = self.resolve(path)?;

        if let Some(op) = name.strip_prefix(NS) {
            return self.set_operational_xattr(address, kind, op, value);
        }

        let acb = self.fetch_acb(address)?;
        self.authorize(&acb, Need::Write)?;

        let name = name.to_string();
        let value = value.to_vec();
        match kind {
            EntryType::Directory => {
                self.apply_transform(address, None, |current| {
                    let mut payload = DirectoryPayload::from_bytes(current)?;
                    payload.xattrs.insert(name.clone(), value.clone());
                    Ok(payload.to_bytes())
                })?;
            }
            _ => {
                self.apply_transform(address, None, |current| {
                    let mut payload = FilePayload::from_bytes(current)?;
                    payload.xattrs.insert(name.clone(), value.clone());
                    Ok(payload.to_bytes())
                })?;
            }
        }
        Ok(())
    }

    /// Remove one extended attribute.
    pub fn removexattr(&self, path: &str, name: &str) -> Result<()> {
        let (address, kind) = self.resolve(path)?;

        if name.starts_with(NS) {
            return Err(Error::InvalidArgument(format!(
                "{} is an operational attribute and cannot be removed directly",
                name
            )));
        }

        let acb = self.fetch_acb(address)?;
        self.authorize(&acb, Need::Write)?;

        let name = name.to_string();
        match kind {
            EntryType::Directory => {
                self.apply_transform(address, None, |current| {
                    let mut payload = DirectoryPayload::from_bytes(current)?;
                    payload.xattrs.remove(&name);
                    Ok(payload.to_bytes())
                })?;
            }
            _ => {
                self.apply_transform(address, None, |current| {
                    let mut payload = FilePayload::from_bytes(current)?;
                    payload.xattrs.remove(&name);
                    Ok(payload.to_bytes())
                })?;
            }
        }
        Ok(())
    }

    fn get_operational_xattr(&self, address: Address, kind: EntryType, op: &str) -> Result<Vec<u8>> {
        if op == "block" {
            return Ok(address.hash_bytes().to_vec());
        }

        if let Some(child_name) = op.strip_prefix("blockof.") {
            if kind != EntryType::Directory {
                return Err(Error::InvalidArgument("blockof.* only applies to directories".into()));
            }
            let (_, payload, _) = self.fetch_directory(address)?;
            let entry = payload
                .entries
                .get(child_name)
                .ok_or_else(|| Error::InvalidArgument(format!("no such entry: {}", child_name)))?;
            return Ok(entry.address.hash_bytes().to_vec());
        }

        if op == "sync" {
            let acb = self.fetch_acb(address)?;
            return Ok(acb.version.to_le_bytes().to_vec());
        }

        if op == "auth_others" {
            let acb = self.fetch_acb(address)?;
            let mut bits = String::new();
            if acb.world_read {
                bits.push('r');
            }
            if acb.world_write {
                bits.push('w');
            }
            return Ok(bits.into_bytes());
        }

        if op == "auth.inherit" {
            if kind != EntryType::Directory {
                return Err(Error::InvalidArgument("auth.inherit only applies to directories".into()));
            }
            let (_, payload, _) = self.fetch_directory(address)?;
            return Ok(vec![payload.inherit_auth as u8]);
        }

        if let Some(rest) = op.strip_prefix("group.") {
            if kind != EntryType::Directory {
                return Err(Error::InvalidArgument("group.* only applies to directories".into()));
            }
            let (_, payload, _) = self.fetch_directory(address)?;
            let key = format!("__group__{}", rest);
            return payload
                .xattrs
                .get(&key)
                .cloned()
                .ok_or_else(|| Error::InvalidArgument(format!("no such group: {}", rest)));
        }

        if op.starts_with("fsck.") {
            return Err(Error::InvalidArgument(format!("{}{} is not supported in this build", NS, op)));
        }

        Err(Error::InvalidArgument(format!("no such attribute: {}{}", NS, op)))
    }

    fn set_operational_xattr(&self, address: Address, kind: EntryType, op: &str, value: &[u8]) -> Result<()> {
        match op {
            "auth.setr" => self.set_acl_rights(address, value, true, false),
            "auth.setw" => self.set_acl_rights(address, value, false, true),
            "auth.setrw" => self.set_acl_rights(address, value, true, true),
            "auth.clear" => self.clear_acl_rights(address, value),
            "auth_others" => self.set_world_permissions(address, value),
            "auth.inherit" => self.set_inherit(address, kind, value),
            "group.create" => self.group_create(address, kind, value),
            "group.delete" => self.group_delete(address, kind, value),
            "block" | "sync" => Err(Error::InvalidArgument(format!("{}{} is read-only", NS, op))),
            _ if op.starts_with("blockof.") => Err(Error::InvalidArgument(format!("{}{} is read-only", NS, op))),
            _ if op.starts_with("fsck.") => Err(Error::InvalidArgument(format!("{}{} is not supported in this build", NS, op))),
            _ if op.starts_with("group.") && op.ends_with(".add") => {
                let name = &op[("group.".len())..op.len() - ".add".len()];
                self.group_add_member(address, kind, name, value)
            }
            _ if op.starts_with("group.") && op.ends_with(".remove") => {
                let name = &op[("group.".len())..op.len() - ".remove".len()];
                self.group_remove_member(address, kind, name, value)
            }
            _ => Err(Error::InvalidArgument(format!("unknown attribute: {}{}", NS, op))),
        }
    }

    /// `auth.setr`/`auth.setw`/`auth.setrw`: `value` is the 64-byte
    /// concatenation of the target user's signing public key and their
    /// X25519 agreement public key, since an ACL entry needs both to seal
    /// a token they can later unseal (spec.md §3).
    fn set_acl_rights(&self, address: Address, value: &[u8], read: bool, write: bool) -> Result<()> {
        let (user_key, user_agreement_key) = parse_identity(value)?;
        let acb = self.fetch_acb(address)?;
        self.require_owner(&acb)?;
        let payload_key = self.resolve_key(&acb)?;
        let mut acl = self.acl_for_address(acb.acl_ref)?;
        acl.upsert(user_key, user_agreement_key, read, write, &payload_key);
        self.commit_acl(address, acl, payload_key)
    }

    fn clear_acl_rights(&self, address: Address, value: &[u8]) -> Result<()> {
        if value.len() != 32 {
            return Err(Error::InvalidArgument("auth.clear expects a 32-byte signing public key".into()));
        }
        let acb = self.fetch_acb(address)?;
        self.require_owner(&acb)?;
        let payload_key = self.resolve_key(&acb)?;
        let mut acl = self.acl_for_address(acb.acl_ref)?;
        acl.remove(value);
        self.commit_acl(address, acl, payload_key)
    }

    /// Reseal every entry to `payload_key` and store the ACL as a fresh
    /// CHB, then rewrite the ACB to point at it (spec.md §3: "Any edit
    /// that changes the ACL must re-seal the payload with a fresh
    /// symmetric key and re-issue all tokens").
    fn commit_acl(&self, address: Address, mut acl: Acl, old_payload_key: [u8; 32]) -> Result<()> {
        let acb = self.fetch_acb(address)?;
        let plaintext = acb.decrypt(&old_payload_key)?;
        let new_payload_key = crate::crypto::random_key();
        acl.reseal(&new_payload_key);
        let chb = Chb::seal(acl.to_bytes(), &self.identity);
        self.consensus.store(Block::Chb(chb.clone()), SetMode::InsertOnly, None)?;
        let next = acb.next_version_with_acl(
            &plaintext,
            &self.identity,
            &self.agreement.public_key(),
            chb.address(),
            new_payload_key,
        );
        self.consensus.store(Block::Acb(next.clone()), SetMode::Upsert, None)?;
        self.cache_put(next, new_payload_key);
        Ok(())
    }

    fn set_world_permissions(&self, address: Address, value: &[u8]) -> Result<()> {
        let bits = std::str::from_utf8(value).map_err(|_| Error::InvalidArgument("auth_others value must be ascii".into()))?;
        let world_read = bits.contains('r');
        let world_write = bits.contains('w');
        let acb = self.fetch_acb(address)?;
        self.require_owner(&acb)?;
        let payload_key = self.resolve_key(&acb)?;
        let next = acb.next_version_with_world_permissions(&self.identity, &payload_key, world_read, world_write);
        self.consensus.store(Block::Acb(next.clone()), SetMode::Upsert, None)?;
        self.cache_put(next, payload_key);
        Ok(())
    }

    fn set_inherit(&self, address: Address, kind: EntryType, value: &[u8]) -> Result<()> {
        if kind != EntryType::Directory {
            return Err(Error::InvalidArgument("auth.inherit only applies to directories".into()));
        }
        let inherit = matches!(value, b"true" | b"1");
        let acb = self.fetch_acb(address)?;
        self.authorize(&acb, Need::Write)?;
        let edit = PermissionsEdit::new(PayloadKind::Directory, None, Some(inherit));
        self.apply_resolver(address, edit.into_resolver())?;
        Ok(())
    }

    fn group_create(&self, address: Address, kind: EntryType, value: &[u8]) -> Result<()> {
        if kind != EntryType::Directory {
            return Err(Error::InvalidArgument("group.create only applies to directories".into()));
        }
        let name = std::str::from_utf8(value).map_err(|_| Error::InvalidArgument("group name must be ascii".into()))?;
        let acb = self.fetch_acb(address)?;
        self.authorize(&acb, Need::Write)?;

        let (group, membership_chb) = Group::create(&self.identity, &self.agreement.public_key());
        self.consensus.store(Block::Chb(membership_chb), SetMode::InsertOnly, None)?;
        self.consensus.store(Block::Acb(group.acb().clone()), SetMode::InsertOnly, None)?;

        let key = format!("__group__{}", name);
        let group_address = group.address().hash_bytes().to_vec();
        self.apply_transform(address, None, |current| {
            let mut payload = DirectoryPayload::from_bytes(current)?;
            payload.xattrs.insert(key.clone(), group_address.clone());
            Ok(payload.to_bytes())
        })?;
        Ok(())
    }

    fn group_delete(&self, address: Address, kind: EntryType, value: &[u8]) -> Result<()> {
        if kind != EntryType::Directory {
            return Err(Error::InvalidArgument("group.delete only applies to directories".into()));
        }
        let name = std::str::from_utf8(value).map_err(|_| Error::InvalidArgument("group name must be ascii".into()))?;
        let acb = self.fetch_acb(address)?;
        self.authorize(&acb, Need::Write)?;
        let key = format!("__group__{}", name);
        self.apply_transform(address, None, |current| {
            let mut payload = DirectoryPayload::from_bytes(current)?;
            payload.xattrs.remove(&key);
            Ok(payload.to_bytes())
        })?;
        Ok(())
    }

    fn group_address(&self, directory: Address, name: &str) -> Result<Address> {
        let (_, payload, _) = self.fetch_directory(directory)?;
        let key = format!("__group__{}", name);
        let hash = payload
            .xattrs
            .get(&key)
            .ok_or_else(|| Error::InvalidArgument(format!("no such group: {}", name)))?;
        let mut bytes = [0u8; 32];
        if hash.len() != 32 {
            return Err(Error::ValidationFailed("corrupt group address xattr".into()));
        }
        bytes.copy_from_slice(hash);
        Ok(Address::new(bytes, true, false))
    }

    fn group_add_member(&self, directory: Address, kind: EntryType, name: &str, value: &[u8]) -> Result<()> {
        if kind != EntryType::Directory {
            return Err(Error::InvalidArgument("group.*.add only applies to directories".into()));
        }
        let dir_acb = self.fetch_acb(directory)?;
        self.authorize(&dir_acb, Need::Write)?;
        let (member_key, member_agreement_key) = parse_identity(value)?;

        let group_address = self.group_address(directory, name)?;
        let group_acb = self.fetch_acb(group_address)?;
        let membership = self.acl_for_address(group_acb.acl_ref)?;
        let group = Group::from_acb(group_acb);
        let (next_group, membership_chb, _) = group.rekey_token_for(
            &self.identity,
            &self.agreement.public_key(),
            &membership,
            member_key,
            member_agreement_key,
            true,
            false,
        );
        self.consensus.store(Block::Chb(membership_chb), SetMode::InsertOnly, None)?;
        self.consensus.store(Block::Acb(next_group.acb().clone()), SetMode::Upsert, None)?;
        Ok(())
    }

    fn group_remove_member(&self, directory: Address, kind: EntryType, name: &str, value: &[u8]) -> Result<()> {
        if kind != EntryType::Directory {
            return Err(Error::InvalidArgument("group.*.remove only applies to directories".into()));
        }
        if value.len() != 32 {
            return Err(Error::InvalidArgument("group member removal expects a 32-byte signing public key".into()));
        }
        let dir_acb = self.fetch_acb(directory)?;
        self.authorize(&dir_acb, Need::Write)?;

        let group_address = self.group_address(directory, name)?;
        let group_acb = self.fetch_acb(group_address)?;
        let membership = self.acl_for_address(group_acb.acl_ref)?;
        let group = Group::from_acb(group_acb);
        let (next_group, membership_chb, _) =
            group.remove_member(&self.identity, &self.agreement.public_key(), &membership, value);
        self.consensus.store(Block::Chb(membership_chb), SetMode::InsertOnly, None)?;
        self.consensus.store(Block::Acb(next_group.acb().clone()), SetMode::Upsert, None)?;
        Ok(())
    }

    fn acl_for_address(&self, acl_ref: Address) -> Result<Acl> {
        match self.consensus.fetch(acl_ref)? {
            Block::Chb(chb) => {
                chb.validate()?;
                Acl::from_bytes(&chb.data).map_err(Error::from)
            }
            _ => Err(Error::ValidationFailed("acl_ref did not resolve to a CHB".into())),
        }
    }

    /// ACL/world-bit/group mutations are only ever signed by the owner's
    /// key (spec.md §4.6) — an admin or world-writer cleared by
    /// `authorize` still cannot produce a valid signature over a new ACB
    /// version, since [`crate::block::Acb::validate`] only accepts the
    /// owner or a listed ACL editor.
    fn require_owner(&self, acb: &crate::block::Acb) -> Result<()> {
        if acb.header.owner_key == self.identity.public_key() {
            Ok(())
        } else {
            Err(Error::PermissionDenied("only the owner may change ACL or world permissions".into()))
        }
    }
}

/// Split a 64-byte xattr value into a 32-byte signing public key and a
/// 32-byte X25519 agreement public key.
fn parse_identity(value: &[u8]) -> Result<(Vec<u8>, [u8; 32])> {
    if value.len() != 64 {
        return Err(Error::InvalidArgument(
            "expected a 64-byte value: 32-byte signing key followed by 32-byte agreement key".into(),
        ));
    }
    let user_key = value[..32].to_vec();
    let mut user_agreement_key = [0u8; 32];
    user_agreement_key.copy_from_slice(&value[32..]);
    Ok((user_key, user_agreement_key))
}
