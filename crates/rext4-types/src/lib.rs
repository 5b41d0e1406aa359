#![forbid(unsafe_code)]
//! Shared types for rext4.
//!
//! Newtype wrappers for on-disk quantities, little-endian field readers used
//! by the parsing layer, `ParseError`, and the ext4 constants the rest of the
//! workspace keys off.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Byte offset of the first (and only consulted) superblock copy.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// On-disk size of the superblock record.
pub const SUPERBLOCK_SIZE: usize = 1024;
/// `s_magic` value identifying an ext-family superblock.
pub const SUPER_MAGIC: u16 = 0xEF53;
/// `eh_magic` value at the head of every extent-tree node.
pub const EXTENT_MAGIC: u16 = 0xF30A;
/// Byte offset of `s_checksum` within the superblock; the CRC covers
/// everything before it.
pub const SUPERBLOCK_CHECKSUM_OFFSET: usize = 0x3FC;
/// Size of the decoded inode core (base 128 bytes plus the extended
/// timestamp area consumed by this reader).
pub const INODE_CORE_SIZE: usize = 160;
/// Size of the `i_block` area holding the inline extent-tree root.
pub const EXTENT_ROOT_SIZE: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeNumber(pub u32);

impl InodeNumber {
    /// The root directory is always inode 2 in ext4.
    pub const ROOT: Self = Self(2);
}

/// Block group index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupNumber(pub u32);

/// Byte offset on a `ByteDevice` (pread semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteOffset(pub u64);

impl ByteOffset {
    pub const ZERO: Self = Self(0);

    /// Add a byte count, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

/// Validated block size (power of two in 1024..=65536, per the ext4 format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockSize(u32);

impl BlockSize {
    pub fn new(value: u32) -> Result<Self, ParseError> {
        if !value.is_power_of_two() || !(1024..=65536).contains(&value) {
            return Err(ParseError::InvalidField {
                field: "block_size",
                reason: "must be power of two in 1024..=65536",
            });
        }
        Ok(Self(value))
    }

    /// Decode `s_log_block_size`: the block size is 1024 shifted left by it.
    pub fn from_log(log_block_size: u32) -> Result<Self, ParseError> {
        let shift = 10_u32
            .checked_add(log_block_size)
            .ok_or(ParseError::InvalidField {
                field: "s_log_block_size",
                reason: "invalid shift",
            })?;
        let value = 1_u32.checked_shl(shift).ok_or(ParseError::InvalidField {
            field: "s_log_block_size",
            reason: "invalid shift",
        })?;
        Self::new(value)
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        u64::from(self.0)
    }

    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Convert a byte offset to the logical block containing it (truncating).
    #[must_use]
    pub fn byte_to_block(self, byte_offset: u64) -> u64 {
        byte_offset / self.as_u64()
    }

    /// Convert a block number to its byte offset.
    #[must_use]
    pub fn block_to_byte(self, block: BlockNumber) -> Option<ByteOffset> {
        block.0.checked_mul(self.as_u64()).map(ByteOffset)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid magic: expected {expected:#x}, got {actual:#x}")]
    InvalidMagic { expected: u32, actual: u32 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, ParseError> {
    Ok(ensure_slice(data, offset, 1)?[0])
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Decode a NUL-padded fixed field (volume label and the like).
#[must_use]
pub fn trim_nul_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

// ── POSIX file mode constants ────────────────────────────────────────────────

/// File type mask (upper 4 bits of mode).
pub const S_IFMT: u16 = 0o170_000;
/// Named pipe (FIFO).
pub const S_IFIFO: u16 = 0o010_000;
/// Character device.
pub const S_IFCHR: u16 = 0o020_000;
/// Directory.
pub const S_IFDIR: u16 = 0o040_000;
/// Block device.
pub const S_IFBLK: u16 = 0o060_000;
/// Regular file.
pub const S_IFREG: u16 = 0o100_000;
/// Symbolic link.
pub const S_IFLNK: u16 = 0o120_000;
/// Socket.
pub const S_IFSOCK: u16 = 0o140_000;

// ── ext4 inode flags (i_flags) ──────────────────────────────────────────────

/// Hash-indexed directory (htree/DX).
pub const EXT4_INDEX_FL: u32 = 0x0000_1000;
/// Inode uses extents.
pub const EXT4_EXTENTS_FL: u32 = 0x0008_0000;
/// Inode has inline data.
pub const EXT4_INLINE_DATA_FL: u32 = 0x1000_0000;

// ── ext4 incompat feature flags ─────────────────────────────────────────────

pub const FEATURE_INCOMPAT_FILETYPE: u32 = 0x0002;
pub const FEATURE_INCOMPAT_RECOVER: u32 = 0x0004;
pub const FEATURE_INCOMPAT_EXTENTS: u32 = 0x0040;
pub const FEATURE_INCOMPAT_64BIT: u32 = 0x0080;
pub const FEATURE_INCOMPAT_MMP: u32 = 0x0100;
pub const FEATURE_INCOMPAT_FLEX_BG: u32 = 0x0200;

/// The incompat bits this reader understands. Anything outside this set
/// rejects the volume.
pub const FEATURE_INCOMPAT_SUPPORTED: u32 = FEATURE_INCOMPAT_FILETYPE
    | FEATURE_INCOMPAT_RECOVER
    | FEATURE_INCOMPAT_EXTENTS
    | FEATURE_INCOMPAT_64BIT
    | FEATURE_INCOMPAT_MMP
    | FEATURE_INCOMPAT_FLEX_BG;

// ── Inode/group index math ──────────────────────────────────────────────────

/// Compute the block group holding an inode.
///
/// Inode numbers are 1-indexed; group assignment uses
/// `(ino - 1) / inodes_per_group`.
#[must_use]
pub fn inode_to_group(ino: InodeNumber, inodes_per_group: u32) -> GroupNumber {
    GroupNumber(ino.0.saturating_sub(1) / inodes_per_group)
}

/// Compute the index of an inode within its block group.
#[must_use]
pub fn inode_index_in_group(ino: InodeNumber, inodes_per_group: u32) -> u32 {
    ino.0.saturating_sub(1) % inodes_per_group
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ByteOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
