//! Authorization beyond a single block's own ACL (spec.md §4.6): network
//! admin keys, world-readable/world-writable bits, and groups. None of
//! this replaces [`crate::block::acl::Acl`] — it all resolves down to
//! ordinary ACL entries or the two world bits already carried on every
//! [`crate::block::Acb`] envelope.

pub mod admin;
pub mod group;
pub mod rights;

pub use admin::AdminKeys;
pub use group::Group;
pub use rights::{check, Need};
