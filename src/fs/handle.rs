//! Open-file/open-directory handles, grounded in the teacher's
//! `fsimpl.rs` (`open_files: HashMap<FileHandle, File>`,
//! `open_file_counter`).

use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque handle returned by `open`/`opendir`, used by subsequent
/// `read`/`write`/`readdir`/`release` calls (spec.md §4.5).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FileHandle(u64);

impl FileHandle {
    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

/// Hands out strictly increasing handle values for the lifetime of one
/// mounted [`super::Filesystem`].
#[derive(Default)]
pub(crate) struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    pub(crate) fn new() -> Self {
        HandleAllocator {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn allocate(&self) -> FileHandle {
        FileHandle(self.next.fetch_add(1, Ordering::SeqCst))
    }
}
