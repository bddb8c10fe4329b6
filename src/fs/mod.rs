//! The filesystem layer (spec.md §4.5): a POSIX-like tree of directory and
//! file ACBs, threaded through one [`Filesystem`] value per mount rather
//! than reached via a global or `static` (spec.md §9, "model as a
//! `Filesystem` value threaded through operations"). Generalizes the
//! teacher's `fsimpl.rs`/`metadata/dir.rs`/`metadata/file.rs` fixed-disk
//! tree onto the content-addressed, ACL-gated block model in
//! [`crate::block`] and [`crate::payload`].

pub mod directory;
pub mod file;
pub mod handle;
pub mod path;
pub mod xattr;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use crossbeam::crossbeam_channel::{self, Receiver, Sender};
use log::trace;
use lru_cache::LruCache;

pub use file::FileBuffer;
pub use handle::FileHandle;
use handle::HandleAllocator;

use crate::address::Address;
use crate::block::acl::Acl;
use crate::block::{Acb, Block};
use crate::consensus::Consensus;
use crate::crypto::{self, AgreementKeyPair, KeyPair};
use crate::error::{Error, Result};
use crate::payload::{DirectoryPayload, EntryType, FilePayload};
use crate::permissions::{self, AdminKeys, Need};
use crate::resolver::{ConflictResolver, Resolver};
use crate::silo::SetMode;

/// Default symmetric chunk size backing a file's FAT entries beyond the
/// inline prefix (spec.md §4.5.2); also doubles as the crypto-offload
/// threshold from spec.md §5.
pub const DEFAULT_BLOCK_SIZE: u32 = 1 << 18;

/// Inline prefix ceiling before a file starts growing a FAT (spec.md
/// §4.5.2: "If total size <= max_embed_size ... data lives in inline_data").
pub const DEFAULT_MAX_EMBED_SIZE: usize = 4096;

/// Attributes reported by [`Filesystem::getattr`].
#[derive(Clone, Copy, Debug)]
pub struct Attributes {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub size: u64,
    pub is_dir: bool,
    pub atime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub ctime: DateTime<Utc>,
}

/// A partial update applied by [`Filesystem::setattr`]; `None` fields are
/// left untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct AttributeUpdate {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: Option<DateTime<Utc>>,
    pub mtime: Option<DateTime<Utc>>,
}

struct CachedBlock {
    acb: Acb,
    payload_key: [u8; 32],
}

fn no_acl() -> Address {
    Address::new([0u8; 32], false, false)
}

/// One mounted tree: owns the identity used to sign writes, the consensus
/// stack blocks are read from and written to, and the per-mount caches and
/// handle tables (spec.md §4.5: "owning the block cache of parsed
/// directory/file data indexed by address, not a global/static").
pub struct Filesystem<C: Consensus + 'static> {
    consensus: Arc<C>,
    identity: KeyPair,
    agreement: AgreementKeyPair,
    admins: AdminKeys,
    root: Address,
    block_size: u32,
    max_embed_size: usize,
    cache: Mutex<LruCache<Address, CachedBlock>>,
    handles: HandleAllocator,
    open_files: Mutex<HashMap<FileHandle, Arc<Mutex<FileBuffer>>>>,
    open_dirs: Mutex<HashMap<FileHandle, Address>>,
    /// Address-keyed, refcounted registry backing `open_files`: every
    /// handle opened against the same file address shares one
    /// `FileBuffer`, so a write through one handle is visible to another
    /// still-open handle on the same file (spec.md §4.5.2, §4.5.3).
    pub(crate) file_buffers: Mutex<HashMap<Address, (Arc<Mutex<FileBuffer>>, usize)>>,
    prefetch_tx: Sender<Address>,
    _prefetch_workers: Vec<JoinHandle<()>>,
}

impl<C: Consensus + 'static> Filesystem<C> {
    /// Mount `root`, signing writes as `identity` and sealing/unsealing
    /// payload keys as `agreement`. `prefetch_fanout` background workers
    /// (spec.md §4.5.1) warm the cache behind `list_directory`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        consensus: Arc<C>,
        identity: KeyPair,
        agreement: AgreementKeyPair,
        admins: AdminKeys,
        root: Address,
        block_size: u32,
        max_embed_size: usize,
        prefetch_fanout: usize,
    ) -> Self {
        let (prefetch_tx, prefetch_rx): (Sender<Address>, Receiver<Address>) = crossbeam_channel::unbounded();
        let mut prefetch_workers = Vec::new();
        for _ in 0..prefetch_fanout.max(1) {
            let consensus = Arc::clone(&consensus);
            let rx = prefetch_rx.clone();
            prefetch_workers.push(thread::spawn(move || {
                for address in rx {
                    if let Err(e) = consensus.fetch(address) {
                        trace!("fs: prefetch of {:?} failed: {}", address, e);
                    }
                }
            }));
        }

        Filesystem {
            consensus,
            identity,
            agreement,
            admins,
            root,
            block_size,
            max_embed_size,
            cache: Mutex::new(LruCache::new(256)),
            handles: HandleAllocator::new(),
            open_files: Mutex::new(HashMap::new()),
            open_dirs: Mutex::new(HashMap::new()),
            file_buffers: Mutex::new(HashMap::new()),
            prefetch_tx,
            _prefetch_workers: prefetch_workers,
        }
    }

    /// Create and store a fresh, empty, owner-only root directory, for a
    /// volume being formatted (spec.md §6, `volumes/<owner>/<name>`).
    pub fn create_root(consensus: &C, identity: &KeyPair, agreement: &AgreementKeyPair, mode: u32) -> Result<Address> {
        let payload = DirectoryPayload::new(0, 0, mode, DEFAULT_BLOCK_SIZE, Utc::now());
        let acb = Acb::create(&payload.to_bytes(), identity, &agreement.public_key(), no_acl());
        let address = acb.address();
        consensus.store(Block::Acb(acb), SetMode::InsertOnly, None)?;
        Ok(address)
    }

    /// The mounted tree's root address.
    pub fn root(&self) -> Address {
        self.root
    }

    /// The default chunk size new files in this mount are created with.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    fn prefetch(&self, addresses: impl IntoIterator<Item = Address>) {
        for address in addresses {
            let _ = self.prefetch_tx.send(address);
        }
    }

    fn resolve(&self, target: &str) -> Result<(Address, EntryType)> {
        let mut current = self.root;
        let mut kind = EntryType::Directory;
        for name in path::components(target) {
            if kind != EntryType::Directory {
                return Err(Error::InvalidArgument(format!("{} is not a directory", name)));
            }
            let (_, payload, _) = self.fetch_directory(current)?;
            let entry = payload
                .entries
                .get(name)
                .ok_or_else(|| Error::InvalidArgument(format!("no such entry: {}", name)))?;
            current = entry.address;
            kind = entry.entry_type;
        }
        Ok((current, kind))
    }

    fn resolve_parent(&self, target: &str) -> Result<(Address, String)> {
        let mut components = path::components(target);
        let name = components
            .pop()
            .ok_or_else(|| Error::InvalidArgument("path has no final component".into()))?
            .to_string();
        let parent_path = components.join("/");
        let (parent, kind) = self.resolve(&parent_path)?;
        if kind != EntryType::Directory {
            return Err(Error::InvalidArgument("parent is not a directory".into()));
        }
        Ok((parent, name))
    }

    fn fetch_acb(&self, address: Address) -> Result<Acb> {
        let block = self.consensus.fetch(address)?;
        let consensus = Arc::clone(&self.consensus);
        block.validate(move |acl_address| consensus.fetch(acl_address))?;
        match block {
            Block::Acb(acb) => Ok(acb),
            _ => Err(Error::InvalidArgument("expected an ACL-controlled block".into())),
        }
    }

    pub(crate) fn fetch_directory(&self, address: Address) -> Result<(Acb, DirectoryPayload, [u8; 32])> {
        let acb = self.fetch_acb(address)?;
        let key = self.resolve_key(&acb)?;
        let plaintext = acb.decrypt(&key)?;
        let payload = DirectoryPayload::from_bytes(&plaintext)?;
        Ok((acb, payload, key))
    }

    pub(crate) fn fetch_file(&self, address: Address) -> Result<(Acb, FilePayload, [u8; 32])> {
        let acb = self.fetch_acb(address)?;
        let key = self.resolve_key(&acb)?;
        let plaintext = acb.decrypt(&key)?;
        let payload = FilePayload::from_bytes(&plaintext)?;
        Ok((acb, payload, key))
    }

    fn acl_for(&self, acb: &Acb) -> Result<Acl> {
        let acl_block = self.consensus.fetch(acb.acl_ref)?;
        match acl_block {
            Block::Chb(chb) => {
                chb.validate()?;
                Acl::from_bytes(&chb.data).map_err(Error::from)
            }
            _ => Err(Error::ValidationFailed("acl_ref did not resolve to a CHB".into())),
        }
    }

    fn resolve_key(&self, acb: &Acb) -> Result<[u8; 32]> {
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(cached) = cache.get_mut(&acb.address()) {
                if cached.acb.version == acb.version {
                    return Ok(cached.payload_key);
                }
            }
        }
        let key = if acb.header.owner_key == self.identity.public_key() {
            crypto::unseal(&self.agreement, &acb.owner_token)?
        } else {
            let acl_key = self
                .acl_for(acb)
                .ok()
                .and_then(|acl| acl.unseal_for(&self.identity.public_key(), &self.agreement));
            match acl_key {
                Some(key) => key,
                // Not the owner, not in the ACL: the only way left in is
                // the world-accessible token (spec.md §4.6), present only
                // when `world_read`/`world_write` actually granted it.
                None => match &acb.world_token {
                    Some(token) => crypto::unseal(&crypto::world_agreement_keypair(), token)?,
                    None => {
                        return Err(Error::PermissionDenied(
                            "no ACL entry or world bit grants access to this block".into(),
                        ))
                    }
                },
            }
        };
        self.cache_put(acb.clone(), key);
        Ok(key)
    }

    /// Check `need` against `acb`'s own ACL, the network's admin keys, and
    /// its world bits (spec.md §4.6), in addition to (not instead of) the
    /// key-recovery check `resolve_key` already performs. The owner always
    /// passes without an ACL fetch.
    fn authorize(&self, acb: &Acb, need: Need) -> Result<()> {
        if acb.header.owner_key == self.identity.public_key() {
            return Ok(());
        }
        let acl = self.acl_for(acb).ok();
        permissions::check(
            acl.as_ref(),
            &self.admins,
            acb.world_read,
            acb.world_write,
            &self.identity.public_key(),
            need,
        )
    }

    fn cache_put(&self, acb: Acb, payload_key: [u8; 32]) {
        self.cache.lock().unwrap().insert(acb.address(), CachedBlock { acb, payload_key });
    }

    fn sign_next(&self, current: &Acb, payload_key: &[u8; 32], plaintext: Vec<u8>) -> Result<Acb> {
        if current.header.owner_key == self.identity.public_key() {
            Ok(current.next_version_as_owner(&plaintext, &self.identity, payload_key))
        } else {
            let acl = self.acl_for(current)?;
            let index = acl
                .index_of(&self.identity.public_key())
                .ok_or_else(|| Error::PermissionDenied("identity not present in ACL".into()))?;
            Ok(current.next_version_as_editor(&plaintext, &self.identity, index, payload_key))
        }
    }

    /// Fetch the current block, replay `transform` over its decrypted
    /// payload, sign and resubmit the next version, retrying against
    /// whatever won the race if the first attempt conflicts (spec.md
    /// §4.3/§4.4.1). `resolver` is threaded through to the consensus layer
    /// so a durable journal can squash this write against others still
    /// queued for `address` (spec.md §4.4.1) — pass `None` for an edit with
    /// no `Resolver` representation.
    fn apply_transform<F>(&self, address: Address, resolver: Option<Resolver>, transform: F) -> Result<Acb>
    where
        F: Fn(&[u8]) -> Result<Vec<u8>>,
    {
        let initial = self.fetch_acb(address)?;
        let key = self.resolve_key(&initial)?;
        let plaintext = initial.decrypt(&key)?;
        let new_plaintext = transform(&plaintext)?;
        let next = self.sign_next(&initial, &key, new_plaintext)?;

        match self
            .consensus
            .store(Block::Acb(next.clone()), SetMode::Upsert, resolver.clone())
        {
            Ok(()) => {
                self.cache_put(next.clone(), key);
                Ok(next)
            }
            Err(Error::Conflict { .. }) => {
                let result = crate::consensus::journal::retry_store(
                    self.consensus.as_ref(),
                    address,
                    SetMode::Upsert,
                    resolver,
                    |block| {
                        let acb = match block {
                            Block::Acb(a) => a,
                            _ => return Err(Error::InvalidArgument("expected an ACL-controlled block".into())),
                        };
                        let key = self.resolve_key(&acb)?;
                        let plaintext = acb.decrypt(&key)?;
                        let new_plaintext = transform(&plaintext)?;
                        self.sign_next(&acb, &key, new_plaintext).map(Block::Acb)
                    },
                    8,
                )?;
                match result {
                    Block::Acb(acb) => {
                        let key = self.resolve_key(&acb)?;
                        self.cache_put(acb.clone(), key);
                        Ok(acb)
                    }
                    _ => Err(Error::InvalidArgument("expected an ACL-controlled block".into())),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn apply_resolver(&self, address: Address, resolver: Resolver) -> Result<Acb> {
        self.apply_transform(address, Some(resolver.clone()), |current| resolver.resolve(current))
    }

    /// `stat`-equivalent (spec.md §4.5.1).
    pub fn getattr(&self, path: &str) -> Result<Attributes> {
        let (address, kind) = self.resolve(path)?;
        match kind {
            EntryType::Directory => {
                let (acb, payload, _) = self.fetch_directory(address)?;
                self.authorize(&acb, Need::Read)?;
                Ok(Attributes {
                    uid: payload.header.uid,
                    gid: payload.header.gid,
                    mode: payload.header.mode,
                    size: 0,
                    is_dir: true,
                    atime: payload.header.atime,
                    mtime: payload.header.mtime,
                    ctime: payload.header.ctime,
                })
            }
            EntryType::File | EntryType::Symlink => {
                let (acb, payload, _) = self.fetch_file(address)?;
                self.authorize(&acb, Need::Read)?;
                Ok(Attributes {
                    uid: payload.header.uid,
                    gid: payload.header.gid,
                    mode: payload.header.mode,
                    size: payload.size,
                    is_dir: false,
                    atime: payload.header.atime,
                    mtime: payload.header.mtime,
                    ctime: payload.header.ctime,
                })
            }
            EntryType::Pending => Err(Error::InvalidArgument("entry is pending creation".into())),
        }
    }

    /// `chmod`/`chown`/`utimens` all funnel through here (spec.md §4.5.1).
    pub fn setattr(&self, path: &str, update: AttributeUpdate) -> Result<Attributes> {
        let (address, kind) = self.resolve(path)?;
        let acb = self.fetch_acb(address)?;
        self.authorize(&acb, Need::Write)?;
        match kind {
            EntryType::Directory => {
                self.apply_transform(address, None, |current| {
                    let mut payload = DirectoryPayload::from_bytes(current)?;
                    if let Some(mode) = update.mode {
                        payload.header.mode = mode;
                    }
                    if let Some(uid) = update.uid {
                        payload.header.uid = uid;
                    }
                    if let Some(gid) = update.gid {
                        payload.header.gid = gid;
                    }
                    if let Some(atime) = update.atime {
                        payload.header.atime = atime;
                    }
                    if let Some(mtime) = update.mtime {
                        payload.header.mtime = mtime;
                    }
                    payload.header.ctime = Utc::now();
                    Ok(payload.to_bytes())
                })?;
            }
            _ => {
                self.apply_transform(address, None, |current| {
                    let mut payload = FilePayload::from_bytes(current)?;
                    if let Some(mode) = update.mode {
                        payload.header.mode = mode;
                    }
                    if let Some(uid) = update.uid {
                        payload.header.uid = uid;
                    }
                    if let Some(gid) = update.gid {
                        payload.header.gid = gid;
                    }
                    if let Some(atime) = update.atime {
                        payload.header.atime = atime;
                    }
                    if let Some(mtime) = update.mtime {
                        payload.header.mtime = mtime;
                    }
                    payload.header.ctime = Utc::now();
                    Ok(payload.to_bytes())
                })?;
            }
        }
        self.getattr(path)
    }

    pub fn chmod(&self, path: &str, mode: u32) -> Result<Attributes> {
        self.setattr(
            path,
            AttributeUpdate {
                mode: Some(mode),
                ..Default::default()
            },
        )
    }

    pub fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<Attributes> {
        self.setattr(path, AttributeUpdate { uid, gid, ..Default::default() })
    }

    pub fn utimens(&self, path: &str, atime: Option<DateTime<Utc>>, mtime: Option<DateTime<Utc>>) -> Result<Attributes> {
        self.setattr(path, AttributeUpdate { atime, mtime, ..Default::default() })
    }
}
