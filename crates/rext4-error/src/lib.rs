#![forbid(unsafe_code)]
//! Error types for rext4.
//!
//! Defines `Rext4Error` and a `Result<T>` alias used throughout the
//! workspace. Includes errno mappings for FUSE response codes.

use rext4_types::ParseError;
use thiserror::Error;

/// Unified error type for all rext4 operations.
///
/// Every failure surfaces through one of these variants; nothing is
/// swallowed. Checksum failures are fatal for the structure they cover.
#[derive(Debug, Error)]
pub enum Rext4Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic in {structure}: expected {expected:#x}, got {actual:#x}")]
    BadMagic {
        structure: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("superblock checksum mismatch: computed {computed:#010x}, stored {stored:#010x}")]
    ChecksumMismatch { computed: u32, stored: u32 },

    #[error("unsupported incompatible features: {unknown_bits:#x}")]
    UnsupportedFeature { unknown_bits: u32 },

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    #[error("corrupt metadata: {0}")]
    Corrupt(String),

    #[error("logical block {logical_block} has no extent mapping")]
    OutOfRange { logical_block: u32 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory")]
    NotADirectory,

    #[error("access denied")]
    AccessDenied,
}

impl Rext4Error {
    /// Convert this error into a POSIX errno suitable for FUSE replies.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::BadMagic { .. } | Self::ChecksumMismatch { .. } | Self::Corrupt(_) => libc::EIO,
            Self::UnsupportedFeature { .. } | Self::NotSupported(_) => libc::ENOTSUP,
            Self::OutOfRange { .. } => libc::ERANGE,
            Self::NotFound(_) => libc::ENOENT,
            Self::NotADirectory => libc::ENOTDIR,
            Self::AccessDenied => libc::EACCES,
        }
    }
}

impl From<ParseError> for Rext4Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::InvalidMagic { expected, actual } => Self::BadMagic {
                structure: "record",
                expected,
                actual,
            },
            other => Self::Corrupt(other.to_string()),
        }
    }
}

/// Result alias using `Rext4Error`.
pub type Result<T> = std::result::Result<T, Rext4Error>;
