//! Permission and inheritance edits (spec.md §4.3: "Permissions edit:
//! re-applies world permissions or inherit flag"), grounded in the
//! teacher's `metadata/permissions.rs` world-readable/world-writable bits
//! and `metadata/dir.rs`'s `inherit_auth` flag.

use serde_derive::{Deserialize, Serialize};

use super::{ConflictResolver, Resolver, Squashable};
use crate::error::Result;
use crate::payload::{DirectoryPayload, FilePayload};

/// Which payload shape a [`PermissionsEdit`] should deserialize the
/// current block as, since directories and files don't share a wire
/// format (spec.md §3).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PayloadKind {
    Directory,
    File,
}

/// Re-applies `mode` bits and, for directories, the ACL-inheritance flag.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PermissionsEdit {
    pub target_kind: PayloadKind,
    pub mode: Option<u32>,
    pub inherit_auth: Option<bool>,
}

impl PermissionsEdit {
    pub fn new(target_kind: PayloadKind, mode: Option<u32>, inherit_auth: Option<bool>) -> Self {
        PermissionsEdit {
            target_kind,
            mode,
            inherit_auth,
        }
    }

    pub fn into_resolver(self) -> Resolver {
        Resolver::PermissionsEdit(self)
    }
}

impl ConflictResolver for PermissionsEdit {
    fn resolve(&self, current: &[u8]) -> Result<Vec<u8>> {
        match self.target_kind {
            PayloadKind::Directory => {
                let mut payload = DirectoryPayload::from_bytes(current)?;
                if let Some(mode) = self.mode {
                    payload.header.mode = mode;
                }
                if let Some(inherit) = self.inherit_auth {
                    payload.inherit_auth = inherit;
                }
                payload.header.ctime = chrono::Utc::now();
                Ok(payload.to_bytes())
            }
            PayloadKind::File => {
                let mut payload = FilePayload::from_bytes(current)?;
                if let Some(mode) = self.mode {
                    payload.header.mode = mode;
                }
                payload.header.ctime = chrono::Utc::now();
                Ok(payload.to_bytes())
            }
        }
    }

    fn squashable(&self, other: &Resolver) -> Squashable {
        match other {
            Resolver::PermissionsEdit(o) if o.target_kind == self.target_kind => {
                Squashable::AtLastPositionStop
            }
            _ => Squashable::Stop,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    #[test]
    fn applies_mode_to_directory() {
        let base = DirectoryPayload::new(0, 0, 0o755, 4096, Utc::now()).to_bytes();
        let edit = PermissionsEdit::new(PayloadKind::Directory, Some(0o700), Some(true));
        let next = edit.resolve(&base).unwrap();
        let payload = DirectoryPayload::from_bytes(&next).unwrap();
        assert_eq!(payload.header.mode, 0o700);
        assert!(payload.inherit_auth);
    }

    #[test]
    fn applies_mode_to_file_without_touching_inherit() {
        let base = FilePayload::new(0, 0, 0o644, 4096, Utc::now()).to_bytes();
        let edit = PermissionsEdit::new(PayloadKind::File, Some(0o600), None);
        let next = edit.resolve(&base).unwrap();
        let payload = FilePayload::from_bytes(&next).unwrap();
        assert_eq!(payload.header.mode, 0o600);
    }
}
