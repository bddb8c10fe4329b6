//! The combined read/write decision for a block access (spec.md §4.6):
//! the block's own ACL, the network's admin keys, and its world
//! read/write bits are all consulted, in that order of how cheap they
//! are to check.

use crate::block::acl::Acl;
use crate::error::{Error, Result};

use super::admin::AdminKeys;

/// What right is being requested.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Need {
    Read,
    Write,
}

/// Decide whether `requester_key` may access a block, given its ACL and
/// world bits plus the network's admin keys. `acl` is `None` for an
/// owner-direct access, which always succeeds (the owner can always
/// access their own block).
pub fn check(
    acl: Option<&Acl>,
    admins: &AdminKeys,
    world_read: bool,
    world_write: bool,
    requester_key: &[u8],
    need: Need,
) -> Result<()> {
    if let Some(write) = admins.rights_for(requester_key) {
        if need == Need::Read || write {
            return Ok(());
        }
    }

    if let Some(acl) = acl {
        if let Some(entry) = acl.entries.iter().find(|e| e.user_key == requester_key) {
            let granted = match need {
                Need::Read => entry.read,
                Need::Write => entry.write,
            };
            if granted {
                return Ok(());
            }
        }
    }

    let world_granted = match need {
        Need::Read => world_read,
        Need::Write => world_write,
    };
    if world_granted {
        return Ok(());
    }

    Err(Error::PermissionDenied(
        "neither the ACL, admin keys, nor world bits grant this access".into(),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::acl::Acl;
    use crate::crypto::{random_key, AgreementKeyPair};

    #[test]
    fn world_read_grants_access_absent_acl_entry() {
        let acl = Acl::new();
        let admins = AdminKeys::new();
        assert!(check(Some(&acl), &admins, true, false, b"anyone", Need::Read).is_ok());
        assert!(check(Some(&acl), &admins, true, false, b"anyone", Need::Write).is_err());
    }

    #[test]
    fn admin_write_overrides_missing_acl_entry() {
        let acl = Acl::new();
        let mut admins = AdminKeys::new();
        admins.grant(b"root".to_vec(), true);
        assert!(check(Some(&acl), &admins, false, false, b"root", Need::Write).is_ok());
    }

    #[test]
    fn read_only_admin_cannot_write() {
        let acl = Acl::new();
        let mut admins = AdminKeys::new();
        admins.grant(b"auditor".to_vec(), false);
        assert!(check(Some(&acl), &admins, false, false, b"auditor", Need::Read).is_ok());
        assert!(check(Some(&acl), &admins, false, false, b"auditor", Need::Write).is_err());
    }

    #[test]
    fn acl_entry_grants_over_world_bits() {
        let mut acl = Acl::new();
        let agreement = AgreementKeyPair::generate();
        acl.upsert(b"dave".to_vec(), agreement.public_key(), true, true, &random_key());
        let admins = AdminKeys::new();
        assert!(check(Some(&acl), &admins, false, false, b"dave", Need::Write).is_ok());
    }

    #[test]
    fn no_grant_anywhere_is_denied() {
        let acl = Acl::new();
        let admins = AdminKeys::new();
        assert!(check(Some(&acl), &admins, false, false, b"nobody", Need::Read).is_err());
    }
}
