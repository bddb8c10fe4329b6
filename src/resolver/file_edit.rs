//! File content edits (spec.md §4.3: "File edit: rewrites data on top of
//! the current block, preserving the current ACL"). The ACL lives one
//! layer up, at the ACB itself (spec.md §4.6), so a payload-level resolver
//! never touches it — only the FAT and inline prefix it's handed here. By
//! the time an edit reaches this resolver, its chunk content has already
//! been sealed and pushed to a silo as fresh CHBs (teacher's
//! `io/tree_writer.rs` commit step); this only splices the resulting FAT
//! entries into whatever the directory's/file's current payload turns out
//! to be, so concurrent writers touching disjoint chunks never clobber
//! each other.

use serde_derive::{Deserialize, Serialize};

use super::{ConflictResolver, Resolver, Squashable};
use crate::error::Result;
use crate::payload::{FatEntry, FilePayload};

/// A rewrite of one file's content: a set of already-sealed FAT chunks to
/// splice in at specific indices, an optional replacement inline prefix,
/// and the new logical size.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FileEdit {
    pub touched: Vec<(usize, FatEntry)>,
    pub new_inline: Option<Vec<u8>>,
    pub new_size: u64,
}

impl FileEdit {
    pub fn new(touched: Vec<(usize, FatEntry)>, new_inline: Option<Vec<u8>>, new_size: u64) -> Self {
        FileEdit {
            touched,
            new_inline,
            new_size,
        }
    }

    pub fn into_resolver(self) -> Resolver {
        Resolver::FileEdit(self)
    }
}

impl ConflictResolver for FileEdit {
    fn resolve(&self, current: &[u8]) -> Result<Vec<u8>> {
        let mut payload = FilePayload::from_bytes(current)?;

        if let Some(inline) = &self.new_inline {
            payload.inline_data = inline.clone();
        }

        for (index, entry) in &self.touched {
            while payload.fat.len() <= *index {
                payload.fat.push(FatEntry::hole());
            }
            payload.fat[*index] = entry.clone();
        }

        payload.size = payload.size.max(self.new_size);
        payload.header.mtime = chrono::Utc::now();
        Ok(payload.to_bytes())
    }

    fn squashable(&self, other: &Resolver) -> Squashable {
        match other {
            Resolver::FileEdit(o) => {
                let disjoint = self
                    .touched
                    .iter()
                    .all(|(i, _)| !o.touched.iter().any(|(j, _)| i == j));
                if disjoint && self.new_inline.is_none() && o.new_inline.is_none() {
                    Squashable::AtFirstPositionContinue
                } else {
                    Squashable::AtLastPositionStop
                }
            }
            _ => Squashable::Stop,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::address::Address;
    use chrono::Utc;

    fn empty_file() -> Vec<u8> {
        FilePayload::new(0, 0, 0o644, 4096, Utc::now()).to_bytes()
    }

    fn fat_entry(tag: u8) -> FatEntry {
        FatEntry {
            address: Address::derive(&[&[tag]], false, false),
            key: [tag; 32],
        }
    }

    #[test]
    fn splices_touched_chunks_by_index() {
        let edit = FileEdit::new(vec![(2, fat_entry(9))], None, 4096 * 3);
        let next = edit.resolve(&empty_file()).unwrap();
        let payload = FilePayload::from_bytes(&next).unwrap();
        assert_eq!(payload.fat.len(), 3);
        assert!(payload.fat[0].is_hole());
        assert!(payload.fat[1].is_hole());
        assert_eq!(payload.fat[2], fat_entry(9));
    }

    #[test]
    fn size_never_shrinks_from_a_stale_concurrent_write() {
        let base = empty_file();
        let grow = FileEdit::new(vec![], None, 8192).resolve(&base).unwrap();
        let stale = FileEdit::new(vec![], None, 100);
        let next = stale.resolve(&grow).unwrap();
        let payload = FilePayload::from_bytes(&next).unwrap();
        assert_eq!(payload.size, 8192);
    }

    #[test]
    fn disjoint_chunk_edits_are_squashable() {
        let a = FileEdit::new(vec![(0, fat_entry(1))], None, 4096);
        let b = Resolver::FileEdit(FileEdit::new(vec![(1, fat_entry(2))], None, 8192));
        assert_eq!(a.squashable(&b), Squashable::AtFirstPositionContinue);
    }

    #[test]
    fn overlapping_chunk_edits_are_not_squashable() {
        let a = FileEdit::new(vec![(0, fat_entry(1))], None, 4096);
        let b = Resolver::FileEdit(FileEdit::new(vec![(0, fat_entry(2))], None, 4096));
        assert_eq!(a.squashable(&b), Squashable::AtLastPositionStop);
    }
}
