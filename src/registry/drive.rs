//! Drives (spec.md §6 `drives/<name>`): a named share binding a volume to
//! a fixed set of invited users and the rights each was invited with,
//! distinct from the volume's own ACL-based permissions in that a drive
//! is the registry-level record of "who was invited," used to drive
//! passport issuance rather than block access itself.

use serde_derive::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DriveInvitee {
    pub user: String,
    pub allow_write: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Drive {
    pub name: String,
    pub volume: String,
    pub invitees: Vec<DriveInvitee>,
}

impl Drive {
    pub fn new(name: impl Into<String>, volume: impl Into<String>) -> Self {
        Drive {
            name: name.into(),
            volume: volume.into(),
            invitees: Vec::new(),
        }
    }

    pub fn invite(&mut self, user: impl Into<String>, allow_write: bool) {
        let user = user.into();
        if let Some(existing) = self.invitees.iter_mut().find(|i| i.user == user) {
            existing.allow_write = allow_write;
        } else {
            self.invitees.push(DriveInvitee { user, allow_write });
        }
    }

    pub fn revoke(&mut self, user: &str) {
        self.invitees.retain(|i| i.user != user);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn invite_then_revoke() {
        let mut drive = Drive::new("team", "shared");
        drive.invite("bob", true);
        assert_eq!(drive.invitees.len(), 1);
        drive.revoke("bob");
        assert!(drive.invitees.is_empty());
    }
}
