//! Idempotent block insertion (spec.md §4.3: "Insert: idempotent block
//! insertion (retry-safe)"), grounded in spec.md §4.4.1's journal retry
//! loop: a client that timed out waiting for an insert's acknowledgement
//! must be able to resend it without risking a spurious collision error
//! if the original insert actually landed.

use serde_derive::{Deserialize, Serialize};

use super::{ConflictResolver, Resolver, Squashable};
use crate::error::Result;

/// Retries an insert whose acknowledgement was lost. If the block already
/// holds the expected content, resolving is a no-op; if it holds something
/// else, the conflict is real and is left to `error`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Insert {
    pub expected: Vec<u8>,
}

impl Insert {
    pub fn new(expected: Vec<u8>) -> Self {
        Insert { expected }
    }

    pub fn into_resolver(self) -> Resolver {
        Resolver::Insert(self)
    }
}

impl ConflictResolver for Insert {
    fn resolve(&self, current: &[u8]) -> Result<Vec<u8>> {
        if current == self.expected.as_slice() {
            Ok(current.to_vec())
        } else {
            Err(crate::error::Error::ValidationFailed(
                "insert collided with different content".into(),
            ))
        }
    }

    fn squashable(&self, other: &Resolver) -> Squashable {
        match other {
            Resolver::Insert(o) if o.expected == self.expected => Squashable::Skip,
            Resolver::Insert(_) => Squashable::Stop,
            _ => Squashable::Stop,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolves_to_noop_when_content_already_matches() {
        let insert = Insert::new(b"payload".to_vec());
        assert_eq!(insert.resolve(b"payload").unwrap(), b"payload");
    }

    #[test]
    fn rejects_a_genuine_collision() {
        let insert = Insert::new(b"payload".to_vec());
        assert!(insert.resolve(b"different").is_err());
    }

    #[test]
    fn identical_inserts_are_skippable() {
        let a = Insert::new(b"payload".to_vec());
        let b = Resolver::Insert(Insert::new(b"payload".to_vec()));
        assert_eq!(a.squashable(&b), Squashable::Skip);
    }
}
