//! Composition of two queued resolvers into one (spec.md §4.3: "Merge:
//! composes two resolvers in order"). `Resolver::Merge` is the variant
//! itself (defined in `mod.rs`, since it has to recurse into `Resolver`);
//! this module carries its construction helper and the testable property
//! from spec.md §8 ("squash composition is semantics-preserving: `squash(r1,
//! r2)` applied to base equals applying `r1` then `r2`").

use super::Resolver;

/// Compose `first` and `second`: resolving the merge against a payload is
/// equivalent to resolving `first` against it, then `second` against the
/// result.
pub fn merge(first: Resolver, second: Resolver) -> Resolver {
    first.merge(second)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::address::Address;
    use crate::payload::{DirectoryPayload, EntryType};
    use crate::resolver::{ConflictResolver, DirectoryEdit};
    use chrono::Utc;

    #[test]
    fn merge_is_equivalent_to_sequential_application() {
        let base = DirectoryPayload::new(0, 0, 0o755, 4096, Utc::now()).to_bytes();
        let addr_a = Address::derive(&[b"a"], false, false);
        let addr_b = Address::derive(&[b"b"], false, false);

        let r1 = DirectoryEdit::insert("a", addr_a, EntryType::File).into_resolver();
        let r2 = DirectoryEdit::insert("b", addr_b, EntryType::File).into_resolver();

        let sequential = r2.resolve(&r1.resolve(&base).unwrap()).unwrap();
        let merged = merge(
            DirectoryEdit::insert("a", addr_a, EntryType::File).into_resolver(),
            DirectoryEdit::insert("b", addr_b, EntryType::File).into_resolver(),
        )
        .resolve(&base)
        .unwrap();

        assert_eq!(sequential, merged);
    }
}
