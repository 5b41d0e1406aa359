//! Directory entry and htree root-header parsing.

use rext4_types::{ParseError, ensure_slice, read_le_u16, read_le_u32, read_u8};
use serde::{Deserialize, Serialize};

/// Fixed header bytes before the name in `ext4_dir_entry_2`.
const DIR_ENTRY_HEADER: usize = 8;

/// File type codes stored in directory entries (FILETYPE feature).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DirEntryKind {
    Unknown = 0,
    RegularFile = 1,
    Directory = 2,
    CharDevice = 3,
    BlockDevice = 4,
    Fifo = 5,
    Socket = 6,
    Symlink = 7,
}

impl DirEntryKind {
    #[must_use]
    pub fn from_raw(val: u8) -> Self {
        match val {
            1 => Self::RegularFile,
            2 => Self::Directory,
            3 => Self::CharDevice,
            4 => Self::BlockDevice,
            5 => Self::Fifo,
            6 => Self::Socket,
            7 => Self::Symlink,
            _ => Self::Unknown,
        }
    }
}

/// A decoded `ext4_dir_entry_2` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub inode: u32,
    pub rec_len: u16,
    pub file_type: DirEntryKind,
    pub name: Vec<u8>,
}

impl DirEntry {
    /// The name as a UTF-8 string (lossy). Comparison during path
    /// resolution stays on the raw bytes.
    #[must_use]
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Parse the directory entries of a single directory block.
///
/// `rec_len` is the authoritative stride; `name_len` bounds only the name
/// slice. An entry with `inode == 0` terminates the block (the remaining
/// bytes are tail padding). Structural inconsistencies are fatal for the
/// whole block: once a `rec_len` is untrustworthy, so is everything after
/// it.
pub fn parse_dir_block(block: &[u8]) -> Result<Vec<DirEntry>, ParseError> {
    let mut entries = Vec::new();
    let mut offset = 0_usize;

    while offset + DIR_ENTRY_HEADER <= block.len() {
        let inode = read_le_u32(block, offset)?;
        let rec_len = usize::from(read_le_u16(block, offset + 4)?);
        let name_len = usize::from(read_u8(block, offset + 6)?);
        let file_type = read_u8(block, offset + 7)?;

        if inode == 0 {
            break;
        }

        if rec_len < DIR_ENTRY_HEADER {
            return Err(ParseError::InvalidField {
                field: "de_rec_len",
                reason: "directory entry rec_len < 8",
            });
        }
        let entry_end = offset
            .checked_add(rec_len)
            .ok_or(ParseError::InvalidField {
                field: "de_rec_len",
                reason: "overflow",
            })?;
        if entry_end > block.len() {
            return Err(ParseError::InvalidField {
                field: "de_rec_len",
                reason: "directory entry extends past block boundary",
            });
        }
        if DIR_ENTRY_HEADER + name_len > rec_len {
            return Err(ParseError::InvalidField {
                field: "de_name_len",
                reason: "name extends past rec_len",
            });
        }

        let name = ensure_slice(block, offset + DIR_ENTRY_HEADER, name_len)?.to_vec();

        entries.push(DirEntry {
            inode,
            rec_len: rec_len as u16,
            file_type: DirEntryKind::from_raw(file_type),
            name,
        });

        offset = entry_end;
    }

    Ok(entries)
}

/// The htree root header at the start of an indexed directory's first block.
///
/// This reader never uses the index for lookup; the header is decoded only
/// to reject multi-level trees it cannot guarantee a linear walk for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtreeRootInfo {
    pub hash_version: u8,
    pub info_length: u8,
    pub indirect_levels: u8,
    pub limit: u16,
    pub count: u16,
}

/// Parse the `dx_root` header from an indexed directory's first block.
///
/// Layout: fake `.` and `..` entries (12 bytes each), then `dx_root_info`
/// (reserved u32, hash_version, info_length, indirect_levels, unused_flags),
/// then the `dx_countlimit` pair occupying the first index slot.
pub fn parse_htree_root(block: &[u8]) -> Result<HtreeRootInfo, ParseError> {
    Ok(HtreeRootInfo {
        hash_version: read_u8(block, 0x1C)?,
        info_length: read_u8(block, 0x1D)?,
        indirect_levels: read_u8(block, 0x1E)?,
        limit: read_le_u16(block, 0x20)?,
        count: read_le_u16(block, 0x22)?,
    })
}
