//! Error kinds surfaced by the core.
//!
//! The teacher crate reaches for `failure::format_err!` ad hoc at every call
//! site; this core needs a closed set of matchable kinds (spec.md §7) so the
//! consensus layer can pattern-match on `Conflict` vs. everything else, so we
//! use a `failure_derive` enum instead, the way `tychobrache-kepler`'s
//! `core::error` does for its own chain errors.

use failure_derive::Fail;

use crate::address::Address;

/// Errors that can escape the core to a caller.
#[derive(Debug, Fail)]
pub enum Error {
    /// Requested block not present at any replica.
    #[fail(display = "block not found: {:?}", _0)]
    MissingBlock(Address),

    /// Insert-only store on an already-present address.
    #[fail(display = "block already exists: {:?}", _0)]
    Collision(Address),

    /// Cryptographic check failed or authorization denied.
    #[fail(display = "block validation failed: {}", _0)]
    ValidationFailed(String),

    /// Version mismatch on a mutable block; a resolver should be invoked.
    #[fail(display = "version conflict on {:?}: expected {}, found {}", address, expected, found)]
    Conflict {
        /// Address of the conflicting block.
        address: Address,
        /// Version the writer expected to supersede.
        expected: u32,
        /// Version actually present.
        found: u32,
    },

    /// POSIX-level EACCES; no ACL entry grants the needed right.
    #[fail(display = "permission denied: {}", _0)]
    PermissionDenied(String),

    /// Transport or silo failure.
    #[fail(display = "I/O error: {}", _0)]
    IoError(String),

    /// Malformed block, attribute, or path.
    #[fail(display = "invalid argument: {}", _0)]
    InvalidArgument(String),

    /// Directory not empty (ENOTEMPTY), kept distinct from `InvalidArgument`
    /// because it is exercised by a dedicated testable property (spec.md §8).
    #[fail(display = "directory not empty: {:?}", _0)]
    NotEmpty(Address),
}

impl Error {
    /// Map this error to the POSIX errno the filesystem boundary should
    /// report, per spec.md §7's propagation policy.
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Error::MissingBlock(_) => libc::EIO,
            Error::Collision(_) => libc::EEXIST,
            Error::ValidationFailed(_) => libc::EACCES,
            Error::Conflict { .. } => libc::EAGAIN,
            Error::PermissionDenied(_) => libc::EACCES,
            Error::IoError(_) => libc::EIO,
            Error::InvalidArgument(_) => libc::EINVAL,
            Error::NotEmpty(_) => libc::ENOTEMPTY,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::InvalidArgument(format!("malformed block: {}", e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidArgument(format!("malformed registry entry: {}", e))
    }
}

/// Convenience alias used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;
