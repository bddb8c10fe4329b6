//! On-disk layout under a per-user data root (spec.md §6). Generalizes
//! the teacher's single `bundle_path` (a directory holding one file
//! system's blocks) into the wider set of registry categories this core
//! persists alongside block data.

use std::path::{Path, PathBuf};

/// Resolves the path for each registry category under a data root.
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Layout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn network(&self, owner_hex: &str, name: &str) -> PathBuf {
        self.root.join("networks").join(owner_hex).join(name)
    }

    pub fn linked_network(&self, user: &str, owner_hex: &str, name: &str) -> PathBuf {
        self.root
            .join("linked_networks")
            .join(user)
            .join(owner_hex)
            .join(name)
    }

    pub fn passport(&self, owner_hex: &str, network: &str, user: &str) -> PathBuf {
        self.root
            .join("passports")
            .join(owner_hex)
            .join(network)
            .join(user)
    }

    pub fn user(&self, name: &str) -> PathBuf {
        self.root.join("users").join(name)
    }

    pub fn silo(&self, name: &str) -> PathBuf {
        self.root.join("silos").join(name)
    }

    pub fn volume(&self, name: &str) -> PathBuf {
        self.root.join("volumes").join(name)
    }

    pub fn drive(&self, name: &str) -> PathBuf {
        self.root.join("drives").join(name)
    }

    pub fn credentials(&self, service: &str, uid: &str) -> PathBuf {
        self.root.join("credentials").join(service).join(uid)
    }

    pub fn kvs(&self, name: &str) -> PathBuf {
        self.root.join("kvs").join(name)
    }

    pub fn async_writes_dir(&self, network: &str) -> PathBuf {
        self.root.join("asynchronous-writes").join(network)
    }

    pub fn blocks_dir(&self, silo: &str) -> PathBuf {
        self.root.join("blocks").join(silo)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn paths_nest_under_root_as_spec_names_them() {
        let layout = Layout::new("/data");
        assert_eq!(layout.network("abcd", "home"), Path::new("/data/networks/abcd/home"));
        assert_eq!(layout.user("alice"), Path::new("/data/users/alice"));
        assert_eq!(layout.blocks_dir("local"), Path::new("/data/blocks/local"));
    }
}
