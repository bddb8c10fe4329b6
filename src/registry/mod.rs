//! The registry (spec.md §6): JSON configuration structs persisted under
//! a per-user data root, describing networks, volumes, drives, silos,
//! users, passports, and third-party credentials. Grounded in the
//! teacher's `metadata/user.rs` (one JSON-serializable struct per
//! registry entry, loaded and saved as a whole) generalized from a single
//! `User` kind to the full surface spec.md §6 names.

pub mod credentials;
pub mod drive;
pub mod kvs;
pub mod layout;
pub mod network;
pub mod passport;
pub mod user;
pub mod volume;

pub use credentials::Credentials;
pub use drive::Drive;
pub use kvs::KvsConfig;
pub use layout::Layout;
pub use network::{LinkedNetwork, NetworkDescriptor, SiloConfig, SiloKind};
pub use passport::Passport;
pub use user::UserIdentity;
pub use volume::VolumeConfig;

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serialize `value` as JSON and write it to `path`, creating parent
/// directories as needed.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Like `save_json`, but restricts the file to owner read/write only
/// (spec.md §6: `users/<name>` is "mode 0600"). Applied to any registry
/// entry carrying private key material or credentials.
#[cfg(unix)]
pub fn save_json_private<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    save_json(path, value)?;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(0o600);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn save_json_private<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    save_json(path, value)
}

/// Read and parse a JSON registry entry from `path`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
