//! Groups (spec.md §4.6): "a group is addressed by a well-known block
//! whose ACL lists the group's members; referencing `@group` in a
//! permission operation adds the group's public key ... to the target
//! ACL."
//!
//! A group is an ordinary [`Acb`] whose `acl_ref` points at a membership
//! [`Acl`] exactly the way a directory or file's `acl_ref` does (spec.md
//! §3) — the only difference is what the identity is used for. The
//! group's resolved payload key doubles as the seed for an
//! [`AgreementKeyPair`] (`AgreementKeyPair::from_bytes(payload_key)`): any
//! member who can recover that payload key, by finding their own entry in
//! the membership ACL and unsealing it, can reconstruct the same
//! agreement keypair and therefore unseal tokens sealed to the group's
//! public key in any *other* ACL that lists it — the mechanism
//! `@group`-references rely on.
//!
//! Open design point, recorded here rather than left as a silent gap:
//! this gives group membership transitive *read* access, but transitive
//! *write* does not flow through [`crate::block::Acb`]'s `editor_index`
//! signature check, since nobody holds a private signing key for a
//! group's opaque identity. A target ACL entry for a group with
//! `write: true` only becomes real write access once a member's own key
//! is also spliced into that ACL directly (by the filesystem layer or an
//! admin) — `rekey_token_for` documents the membership-change side of
//! this same boundary.

use crate::address::Address;
use crate::block::acl::Acl;
use crate::block::chb::Chb;
use crate::block::Acb;
use crate::crypto::{self, AgreementKeyPair, KeyPair};
use crate::error::{Error, Result};

/// A group's identity as it appears in someone else's ACL: an opaque
/// "user key" (the group block's address bytes, since no one holds a
/// private key for it) plus the agreement public key derived from the
/// group's payload key.
#[derive(Clone, Debug)]
pub struct GroupIdentity {
    pub control_key: Vec<u8>,
    pub agreement_public: [u8; 32],
}

/// A group block together with its current membership list.
pub struct Group {
    acb: Acb,
}

impl Group {
    /// Create a new, empty group administered by `owner`. Returns the
    /// group and the membership CHB that must be stored alongside it at
    /// `acl_ref`.
    pub fn create(owner: &KeyPair, owner_agreement_public: &[u8; 32]) -> (Self, Chb) {
        let acl = Acl::new();
        let chb = Chb::seal(acl.to_bytes(), owner);
        let acb = Acb::create(&[], owner, owner_agreement_public, chb.address());
        (Group { acb }, chb)
    }

    /// Rehydrate from a previously-stored group ACB.
    pub fn from_acb(acb: Acb) -> Self {
        Group { acb }
    }

    pub fn address(&self) -> Address {
        self.acb.address()
    }

    pub fn acb(&self) -> &Acb {
        &self.acb
    }

    /// Recover the group's payload key as its owner.
    pub fn owner_payload_key(&self, owner_agreement: &AgreementKeyPair) -> Result<[u8; 32]> {
        crypto::unseal(owner_agreement, &self.acb.owner_token)
            .map_err(|_| Error::PermissionDenied("not the group's owner".into()))
    }

    /// Recover the group's payload key from a member's own entry in the
    /// current membership ACL.
    pub fn member_payload_key(
        &self,
        membership: &Acl,
        member_key: &[u8],
        member_agreement: &AgreementKeyPair,
    ) -> Option<[u8; 32]> {
        membership.unseal_for(member_key, member_agreement)
    }

    /// The identity this group presents when spliced into another ACL:
    /// an opaque control key (the group block's own address bytes) and
    /// the agreement public key a member can reconstruct from the
    /// group's payload key.
    pub fn identity(&self, payload_key: &[u8; 32]) -> GroupIdentity {
        GroupIdentity {
            control_key: self.acb.address().hash_bytes().to_vec(),
            agreement_public: AgreementKeyPair::from_bytes(*payload_key).public_key(),
        }
    }

    /// Splice this group's identity into `target`, granting `read`/
    /// `write` to every current member transitively (spec.md §4.6:
    /// "referencing `@group` ... adds the group's public key to the
    /// target ACL").
    pub fn splice_into(&self, target: &mut Acl, payload_key: &[u8; 32], target_payload_key: &[u8; 32], read: bool, write: bool) {
        let identity = self.identity(payload_key);
        target.upsert(identity.control_key, identity.agreement_public, read, write, target_payload_key);
    }

    /// Add or update a member. Returns the next group ACB version, the
    /// new membership CHB to store at its `acl_ref`, and the new payload
    /// key — the old one stops working for anyone who isn't also in the
    /// new membership list.
    ///
    /// This is the lazy rekey spec.md §4.6 and the overall design call
    /// under "group membership rekey" both describe: membership changes
    /// rotate the group's own payload key immediately, but blocks that
    /// reference the group's *old* agreement public key in their own
    /// ACL are not swept and rewritten — they keep granting access under
    /// the stale identity until they are next written for an unrelated
    /// reason, at which point the writer should re-resolve the group's
    /// current identity via `identity` and splice it in fresh. There is
    /// therefore a window, bounded only by how often a given block is
    /// otherwise written, in which a removed member's access to blocks
    /// they were granted under the old group identity outlives their
    /// group membership. Fixing this exactly would require a network
    /// sweep of every referencing block on every membership change,
    /// which spec.md §9's open-question decision explicitly rejects in
    /// favor of this lazy scheme.
    pub fn rekey_token_for(
        &self,
        owner: &KeyPair,
        owner_agreement_public: &[u8; 32],
        current_membership: &Acl,
        member_key: Vec<u8>,
        member_agreement_key: [u8; 32],
        read: bool,
        write: bool,
    ) -> (Self, Chb, [u8; 32]) {
        let mut acl = current_membership.clone();
        let payload_key = crypto::random_key();
        acl.upsert(member_key, member_agreement_key, read, write, &payload_key);
        acl.reseal(&payload_key);
        let chb = Chb::seal(acl.to_bytes(), owner);
        let next = self
            .acb
            .next_version_with_acl(&[], owner, owner_agreement_public, chb.address(), payload_key);
        (Group { acb: next }, chb, payload_key)
    }

    /// Remove a member and rekey, exactly like `rekey_token_for` but
    /// dropping an entry rather than upserting one.
    pub fn remove_member(
        &self,
        owner: &KeyPair,
        owner_agreement_public: &[u8; 32],
        current_membership: &Acl,
        member_key: &[u8],
    ) -> (Self, Chb, [u8; 32]) {
        let mut acl = current_membership.clone();
        acl.remove(member_key);
        let payload_key = crypto::random_key();
        acl.reseal(&payload_key);
        let chb = Chb::seal(acl.to_bytes(), owner);
        let next = self
            .acb
            .next_version_with_acl(&[], owner, owner_agreement_public, chb.address(), payload_key);
        (Group { acb: next }, chb, payload_key)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn member_added_then_splice_grants_transitive_access() {
        let owner = KeyPair::generate().unwrap();
        let owner_agree = AgreementKeyPair::generate();
        let (group, membership_chb) = Group::create(&owner, &owner_agree.public_key());
        let membership = Acl::from_bytes(&membership_chb.data).unwrap();

        let member = KeyPair::generate().unwrap();
        let member_agree = AgreementKeyPair::generate();
        let (group, membership_chb, payload_key) = group.rekey_token_for(
            &owner,
            &owner_agree.public_key(),
            &membership,
            member.public_key(),
            member_agree.public_key(),
            true,
            false,
        );
        let membership = Acl::from_bytes(&membership_chb.data).unwrap();

        let recovered = group
            .member_payload_key(&membership, &member.public_key(), &member_agree)
            .unwrap();
        assert_eq!(recovered, payload_key);

        let mut target_acl = Acl::new();
        let target_key = crypto::random_key();
        group.splice_into(&mut target_acl, &payload_key, &target_key, true, false);

        let identity = group.identity(&payload_key);
        let recovered_agreement = AgreementKeyPair::from_bytes(recovered);
        let group_identity_recovered_key = target_acl
            .unseal_for(&identity.control_key, &recovered_agreement)
            .unwrap();
        assert_eq!(group_identity_recovered_key, target_key);
    }

    #[test]
    fn removing_a_member_rekeys_so_their_old_copy_stops_working() {
        let owner = KeyPair::generate().unwrap();
        let owner_agree = AgreementKeyPair::generate();
        let (group, membership_chb) = Group::create(&owner, &owner_agree.public_key());
        let membership = Acl::from_bytes(&membership_chb.data).unwrap();

        let member = KeyPair::generate().unwrap();
        let member_agree = AgreementKeyPair::generate();
        let (group, membership_chb, _) = group.rekey_token_for(
            &owner,
            &owner_agree.public_key(),
            &membership,
            member.public_key(),
            member_agree.public_key(),
            true,
            false,
        );
        let membership = Acl::from_bytes(&membership_chb.data).unwrap();

        let (_group, membership_chb, new_key) =
            group.remove_member(&owner, &owner_agree.public_key(), &membership, &member.public_key());
        let membership = Acl::from_bytes(&membership_chb.data).unwrap();

        assert!(membership
            .unseal_for(&member.public_key(), &member_agree)
            .is_none());
        let _ = new_key;
    }
}
