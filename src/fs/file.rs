//! File content (spec.md §4.5.2): an inline prefix for small files, plus a
//! FAT of fixed-size chunks once a file outgrows the embed threshold.
//! Conceptually descended from the teacher's `io/tree_writer.rs`
//! dirty-buffer-then-commit pattern, replacing its block-tree addressing
//! with flat chunk indices since this model has no block-number space to
//! walk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::warn;
use lru_cache::LruCache;

use super::{handle::FileHandle, Filesystem};
use crate::address::Address;
use crate::block::{Block, Chb};
use crate::consensus::Consensus;
use crate::crypto;
use crate::error::{Error, Result};
use crate::payload::{FatEntry, FilePayload};
use crate::permissions::Need;
use crate::resolver::FileEdit;
use crate::silo::SetMode;

const CHUNK_CACHE_SIZE: usize = 64;

/// An open file's in-memory state: the chunks and inline prefix touched
/// since the last commit, plus a small read cache of recently-fetched
/// chunks.
pub struct FileBuffer {
    address: Address,
    block_size: usize,
    max_embed_size: usize,
    payload: FilePayload,
    dirty_chunks: HashMap<usize, Vec<u8>>,
    dirty_inline: bool,
    chunk_cache: LruCache<usize, Vec<u8>>,
    pending_removals: Vec<Address>,
}

impl FileBuffer {
    fn new(address: Address, max_embed_size: usize, payload: FilePayload) -> Self {
        let block_size = payload.header.block_size as usize;
        FileBuffer {
            address,
            block_size,
            max_embed_size,
            payload,
            dirty_chunks: HashMap::new(),
            dirty_inline: false,
            chunk_cache: LruCache::new(CHUNK_CACHE_SIZE),
            pending_removals: Vec::new(),
        }
    }

    fn is_chunked(&self) -> bool {
        !self.payload.fat.is_empty() || self.payload.size as usize > self.max_embed_size
    }

    fn chunk_index(&self, pos: u64) -> usize {
        ((pos as usize).saturating_sub(self.inline_len())) / self.block_size
    }

    fn inline_len(&self) -> usize {
        if self.is_chunked() {
            self.max_embed_size.min(self.payload.size as usize)
        } else {
            self.payload.inline_data.len()
        }
    }

    fn fetch_chunk<C: Consensus>(&mut self, consensus: &C, index: usize) -> Result<Vec<u8>> {
        if let Some(dirty) = self.dirty_chunks.get(&index) {
            return Ok(dirty.clone());
        }
        if let Some(cached) = self.chunk_cache.get_mut(&index) {
            return Ok(cached.clone());
        }
        let entry = match self.payload.fat.get(index) {
            Some(e) if !e.is_hole() => e.clone(),
            _ => return Ok(vec![0u8; self.block_size]),
        };
        let block = consensus.fetch(entry.address)?;
        let chb = match block {
            Block::Chb(chb) => chb,
            _ => return Err(Error::ValidationFailed("file chunk is not a CHB".into())),
        };
        chb.validate()?;
        if chb.data.len() < 24 {
            return Err(Error::ValidationFailed("chunk ciphertext missing nonce frame".into()));
        }
        let (nonce, body) = chb.data.split_at(24);
        let mut plaintext = body.to_vec();
        crypto::decrypt(&entry.key, nonce, 0, &mut plaintext);
        self.chunk_cache.insert(index, plaintext.clone());
        Ok(plaintext)
    }

    /// Read `len` bytes starting at `offset`, reading holes and
    /// past-end-of-file positions as zeros.
    pub fn read<C: Consensus>(&mut self, consensus: &C, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        let mut pos = offset;
        let end = offset.saturating_add(len as u64).min(self.payload.size);

        while pos < end {
            if !self.is_chunked() || (pos as usize) < self.inline_len() {
                let avail = self.payload.inline_data.len() as u64;
                if pos >= avail {
                    out.push(0);
                    pos += 1;
                    continue;
                }
                let take = (end - pos).min(avail - pos) as usize;
                out.extend_from_slice(&self.payload.inline_data[pos as usize..pos as usize + take]);
                pos += take as u64;
                continue;
            }

            let index = self.chunk_index(pos);
            let chunk_start = self.inline_len() as u64 + (index as u64) * self.block_size as u64;
            let within = (pos - chunk_start) as usize;
            let chunk = self.fetch_chunk(consensus, index)?;
            let take = ((end - pos) as usize).min(self.block_size - within).min(chunk.len().saturating_sub(within));
            if take == 0 {
                let zeros = (self.block_size - within).min((end - pos) as usize);
                out.extend(std::iter::repeat(0u8).take(zeros));
                pos += zeros as u64;
                continue;
            }
            out.extend_from_slice(&chunk[within..within + take]);
            pos += take as u64;
        }

        if out.len() < len {
            out.resize(len, 0);
        }
        Ok(out)
    }

    /// Write `data` at `offset`, converting to chunked storage the moment
    /// the file grows past `max_embed_size` (spec.md §4.5.2: "the inline
    /// region is fixed at first overflow").
    pub fn write<C: Consensus>(&mut self, consensus: &C, offset: u64, data: &[u8]) -> Result<usize> {
        let new_size = offset + data.len() as u64;

        if !self.is_chunked() && new_size as usize <= self.max_embed_size {
            if self.payload.inline_data.len() < new_size as usize {
                self.payload.inline_data.resize(new_size as usize, 0);
            }
            self.payload.inline_data[offset as usize..offset as usize + data.len()].copy_from_slice(data);
            self.dirty_inline = true;
            self.payload.size = self.payload.size.max(new_size);
            return Ok(data.len());
        }

        if !self.is_chunked() {
            // First overflow past the embed threshold: freeze the current
            // inline prefix and start chunking everything from here on.
            self.payload.inline_data.resize(self.max_embed_size, 0);
            self.dirty_inline = true;
        }

        let mut written = 0;
        let mut pos = offset;
        let end = new_size;
        while pos < end {
            let index = self.chunk_index(pos);
            let chunk_start = self.inline_len() as u64 + (index as u64) * self.block_size as u64;
            let within = (pos - chunk_start) as usize;
            let take = ((end - pos) as usize).min(self.block_size - within);

            let mut chunk = self.fetch_chunk(consensus, index)?;
            if chunk.len() < within + take {
                chunk.resize(self.block_size, 0);
            }
            let src_start = written;
            chunk[within..within + take].copy_from_slice(&data[src_start..src_start + take]);
            self.dirty_chunks.insert(index, chunk.clone());
            self.chunk_cache.insert(index, chunk);

            written += take;
            pos += take as u64;
        }

        self.payload.size = self.payload.size.max(new_size);
        Ok(written)
    }

    /// Truncate (or extend with a hole) to `size`, scheduling the removal
    /// of any chunk addresses made unreachable.
    pub fn truncate(&mut self, size: u64) {
        if size >= self.payload.size {
            self.payload.size = size;
            return;
        }

        if self.is_chunked() {
            let keep_chunks = if (size as usize) <= self.inline_len() {
                0
            } else {
                ((size as usize - self.inline_len()) + self.block_size - 1) / self.block_size
            };
            for (index, entry) in self.payload.fat.iter().enumerate().skip(keep_chunks) {
                if !entry.is_hole() {
                    self.pending_removals.push(entry.address);
                }
            }
            self.payload.fat.truncate(keep_chunks);
            self.dirty_chunks.retain(|index, _| *index < keep_chunks);
        } else if (size as usize) < self.payload.inline_data.len() {
            self.payload.inline_data.truncate(size as usize);
            self.dirty_inline = true;
        }

        self.payload.size = size;
    }

    /// Whether any content has been written since the last commit.
    pub fn is_dirty(&self) -> bool {
        self.dirty_inline || !self.dirty_chunks.is_empty()
    }
}

impl<C: Consensus + 'static> Filesystem<C> {
    /// Open `path` for reading and/or writing, returning a handle for
    /// subsequent `read`/`write`/`fsync`/`release` calls.
    pub fn open(&self, path: &str) -> Result<FileHandle> {
        let (address, kind) = self.resolve(path)?;
        if kind == crate::payload::EntryType::Directory {
            return Err(Error::InvalidArgument("cannot open a directory as a file".into()));
        }
        let acb = self.fetch_acb(address)?;
        self.authorize(&acb, Need::Read)?;

        let buffer = {
            let mut buffers = self.file_buffers.lock().unwrap();
            match buffers.get_mut(&address) {
                Some((buffer, refcount)) => {
                    *refcount += 1;
                    buffer.clone()
                }
                None => {
                    let (_, payload, _) = self.fetch_file(address)?;
                    let buffer = Arc::new(Mutex::new(FileBuffer::new(address, self.max_embed_size, payload)));
                    buffers.insert(address, (buffer.clone(), 1));
                    buffer
                }
            }
        };

        let handle = self.handles.allocate();
        self.open_files.lock().unwrap().insert(handle, buffer);
        Ok(handle)
    }

    fn buffer_for(&self, handle: FileHandle) -> Result<Arc<Mutex<FileBuffer>>> {
        self.open_files
            .lock()
            .unwrap()
            .get(&handle)
            .cloned()
            .ok_or_else(|| Error::InvalidArgument("unknown file handle".into()))
    }

    /// Read up to `len` bytes at `offset` from an open file.
    pub fn read(&self, handle: FileHandle, offset: u64, len: usize) -> Result<Vec<u8>> {
        let buffer = self.buffer_for(handle)?;
        let mut buffer = buffer.lock().unwrap();
        buffer.read(self.consensus.as_ref(), offset, len)
    }

    /// Write `data` at `offset` into an open file's buffer. Not durable
    /// until [`Filesystem::fsync`] or [`Filesystem::release`] commits it.
    pub fn write(&self, handle: FileHandle, offset: u64, data: &[u8]) -> Result<usize> {
        let buffer = self.buffer_for(handle)?;
        let address = buffer.lock().unwrap().address;
        let acb = self.fetch_acb(address)?;
        self.authorize(&acb, Need::Write)?;
        let mut buffer = buffer.lock().unwrap();
        buffer.write(self.consensus.as_ref(), offset, data)
    }

    /// Truncate an open file to `size`.
    pub fn truncate(&self, handle: FileHandle, size: u64) {
        let buffer = match self.buffer_for(handle) {
            Ok(b) => b,
            Err(_) => return,
        };
        let address = buffer.lock().unwrap().address;
        if let Ok(acb) = self.fetch_acb(address) {
            if self.authorize(&acb, Need::Write).is_err() {
                return;
            }
        }
        buffer.lock().unwrap().truncate(size);
    }

    /// Commit every dirty chunk and the inline prefix, in the three-step
    /// protocol from spec.md §4.5.2: seal and store fresh chunks, splice
    /// their FAT entries into the file's payload via a `FileEdit`, then
    /// best-effort remove whatever chunks that replaced.
    pub fn fsync(&self, handle: FileHandle) -> Result<()> {
        let buffer = self.buffer_for(handle)?;
        let mut buffer = buffer.lock().unwrap();
        if !buffer.is_dirty() {
            return Ok(());
        }

        let acb = self.fetch_acb(buffer.address)?;
        self.authorize(&acb, Need::Write)?;

        let mut touched = Vec::new();
        for (index, chunk) in buffer.dirty_chunks.drain() {
            let key = crypto::random_key();
            let nonce = crypto::random_nonce();
            let mut ciphertext = chunk.clone();
            crypto::encrypt(&key, &nonce, 0, &mut ciphertext);
            let mut framed = nonce.to_vec();
            framed.extend_from_slice(&ciphertext);
            let chb = Chb::seal(framed, &self.identity);
            let address = chb.address();
            self.consensus.store(Block::Chb(chb), SetMode::InsertOnly, None)?;
            touched.push((index, FatEntry { address, key }));
        }

        let new_inline = if buffer.dirty_inline {
            Some(buffer.payload.inline_data.clone())
        } else {
            None
        };
        let new_size = buffer.payload.size;
        let pending_removals = std::mem::take(&mut buffer.pending_removals);
        let edit = FileEdit::new(touched.clone(), new_inline.clone(), new_size);
        buffer.dirty_inline = false;

        // Splice the same FAT entries into our own still-open buffer so a
        // read or later truncate through this handle sees what was just
        // committed, instead of whatever fell out of the LRU chunk cache.
        if let Some(inline) = &new_inline {
            buffer.payload.inline_data = inline.clone();
        }
        for (index, entry) in &touched {
            while buffer.payload.fat.len() <= *index {
                buffer.payload.fat.push(FatEntry::hole());
            }
            buffer.payload.fat[*index] = entry.clone();
        }
        buffer.payload.size = buffer.payload.size.max(new_size);

        self.apply_resolver(buffer.address, edit.into_resolver())?;

        for address in pending_removals {
            if let Err(e) = self.consensus.remove(address) {
                warn!("fs: fsync left a superseded chunk at {:?}: {}", address, e);
            }
        }
        Ok(())
    }

    /// Close a file handle, committing any outstanding writes first.
    pub fn release(&self, handle: FileHandle) -> Result<()> {
        self.fsync(handle)?;
        let buffer = self.open_files.lock().unwrap().remove(&handle);
        if let Some(buffer) = buffer {
            let address = buffer.lock().unwrap().address;
            let mut buffers = self.file_buffers.lock().unwrap();
            if let Some((_, refcount)) = buffers.get_mut(&address) {
                *refcount -= 1;
                if *refcount == 0 {
                    buffers.remove(&address);
                }
            }
        }
        Ok(())
    }
}
