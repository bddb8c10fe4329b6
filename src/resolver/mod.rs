//! Conflict resolvers (spec.md §4.3, §9).
//!
//! The consensus stack's retry loop (spec.md §4.4.1) is: fetch the current
//! block, call `resolve(current) -> new_payload`, resubmit. A resolver
//! captures *what the caller meant to do* rather than the bytes it meant to
//! write, so that a write which lost a race can be safely replayed against
//! whatever the winner left behind.
//!
//! spec.md §9 maps the original's deep virtual-inheritance resolver
//! hierarchy onto "tagged enums for the closed set of variants the core
//! ships, plus trait objects at the one seam (journal squashing) that
//! needs to stay open to operations the core doesn't know about." The
//! closed set lives here as the `Resolver` enum, serialized with a `kind`
//! discriminant; `ConflictResolver` is the trait it implements, so a future
//! out-of-tree resolver only has to implement the trait, not extend the
//! enum.

pub mod directory_edit;
pub mod file_edit;
pub mod insert;
pub mod merge;
pub mod permissions_edit;

use std::fmt;

use serde_derive::{Deserialize, Serialize};

use crate::error::Result;

pub use directory_edit::{DirOp, DirectoryEdit};
pub use file_edit::FileEdit;
pub use insert::Insert;
pub use permissions_edit::PermissionsEdit;

/// How the async journal (spec.md §4.4.1) may combine two queued edits to
/// the same address into fewer resubmissions. Named for the position of
/// the *other* resolver in the queue relative to `self`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Squashable {
    /// The pair cannot be combined; keep both queued, in order.
    Stop,
    /// `other` is made redundant by `self` and can be dropped outright
    /// (e.g. two `Insert`s of the same content).
    Skip,
    /// Combine by keeping `self`'s position in the queue and folding
    /// `other` into it, then stop scanning further.
    AtFirstPositionStop,
    /// Combine at `self`'s position, but keep scanning for more to fold
    /// in (e.g. a run of directory edits to distinct names).
    AtFirstPositionContinue,
    /// Combine by keeping `other`'s position and folding `self` forward
    /// into it, then stop scanning.
    AtLastPositionStop,
    /// Combine at `other`'s position, and keep scanning.
    AtLastPositionContinue,
}

/// A resolver: replays an intended edit against whatever the current block
/// content turns out to be.
pub trait ConflictResolver: fmt::Debug {
    /// Produce the new payload bytes to resubmit, given the block's
    /// current decrypted payload (the one that won the race).
    fn resolve(&self, current: &[u8]) -> Result<Vec<u8>>;

    /// Whether `self`, queued ahead of `other` for the same address, can
    /// be combined with it before either is sent over the wire.
    fn squashable(&self, other: &Resolver) -> Squashable;
}

/// The closed set of resolver variants the core ships (spec.md §4.3):
/// directory edit, file edit, permissions edit, a composition of two
/// resolvers, and idempotent insert.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "kind")]
pub enum Resolver {
    DirectoryEdit(DirectoryEdit),
    FileEdit(FileEdit),
    PermissionsEdit(PermissionsEdit),
    Merge(Box<Resolver>, Box<Resolver>),
    Insert(Insert),
}

impl ConflictResolver for Resolver {
    fn resolve(&self, current: &[u8]) -> Result<Vec<u8>> {
        match self {
            Resolver::DirectoryEdit(r) => r.resolve(current),
            Resolver::FileEdit(r) => r.resolve(current),
            Resolver::PermissionsEdit(r) => r.resolve(current),
            Resolver::Merge(first, second) => second.resolve(&first.resolve(current)?),
            Resolver::Insert(r) => r.resolve(current),
        }
    }

    fn squashable(&self, other: &Resolver) -> Squashable {
        match self {
            Resolver::DirectoryEdit(r) => r.squashable(other),
            Resolver::FileEdit(r) => r.squashable(other),
            Resolver::PermissionsEdit(r) => r.squashable(other),
            Resolver::Merge(_, second) => second.squashable(other),
            Resolver::Insert(r) => r.squashable(other),
        }
    }
}

impl Resolver {
    /// Combine two queued resolvers into one, preserving "apply `self`
    /// then `other`" semantics (spec.md §8: squash composition is
    /// semantics-preserving).
    pub fn merge(self, other: Resolver) -> Resolver {
        Resolver::Merge(Box::new(self), Box::new(other))
    }
}
