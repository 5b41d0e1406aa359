//! Inode core parsing.

use rext4_types::{
    EXT4_EXTENTS_FL, EXT4_INDEX_FL, EXT4_INLINE_DATA_FL, EXTENT_ROOT_SIZE, INODE_CORE_SIZE,
    ParseError, S_IFDIR, S_IFMT, S_IFREG, read_fixed, read_le_u16, read_le_u32,
};
use serde::{Deserialize, Serialize};

/// The decoded ext4 inode core: the base 128 bytes plus the extended
/// timestamp words. The 60-byte `i_block` area is carried verbatim — under
/// the EXTENTS flag it holds the extent-tree root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub links_count: u16,
    pub flags: u32,

    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub atime_extra: u32,
    pub ctime_extra: u32,
    pub mtime_extra: u32,

    #[serde(with = "serde_extent_root")]
    pub extent_root: [u8; EXTENT_ROOT_SIZE],
}

impl Inode {
    /// Parse the inode core from raw inode-table bytes.
    ///
    /// Requires the 160-byte core. The `*_extra` timestamp words live in the
    /// extended area and read as zero on filesystems with 128-byte inodes,
    /// where the caller passes a zero-padded buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < INODE_CORE_SIZE {
            return Err(ParseError::InsufficientData {
                needed: INODE_CORE_SIZE,
                offset: 0,
                actual: bytes.len(),
            });
        }

        let uid_lo = u32::from(read_le_u16(bytes, 0x02)?);
        let uid_hi = u32::from(read_le_u16(bytes, 0x78)?);
        let gid_lo = u32::from(read_le_u16(bytes, 0x18)?);
        let gid_hi = u32::from(read_le_u16(bytes, 0x7A)?);
        let size_lo = u64::from(read_le_u32(bytes, 0x04)?);
        let size_high = u64::from(read_le_u32(bytes, 0x6C)?);

        Ok(Self {
            mode: read_le_u16(bytes, 0x00)?,
            uid: uid_lo | (uid_hi << 16),
            gid: gid_lo | (gid_hi << 16),
            size: size_lo | (size_high << 32),
            links_count: read_le_u16(bytes, 0x1A)?,
            flags: read_le_u32(bytes, 0x20)?,

            atime: read_le_u32(bytes, 0x08)?,
            ctime: read_le_u32(bytes, 0x0C)?,
            mtime: read_le_u32(bytes, 0x10)?,
            ctime_extra: read_le_u32(bytes, 0x84)?,
            mtime_extra: read_le_u32(bytes, 0x88)?,
            atime_extra: read_le_u32(bytes, 0x8C)?,

            extent_root: read_fixed::<EXTENT_ROOT_SIZE>(bytes, 0x28)?,
        })
    }

    #[must_use]
    pub fn uses_extents(&self) -> bool {
        (self.flags & EXT4_EXTENTS_FL) != 0
    }

    #[must_use]
    pub fn has_htree_index(&self) -> bool {
        (self.flags & EXT4_INDEX_FL) != 0
    }

    #[must_use]
    pub fn has_inline_data(&self) -> bool {
        (self.flags & EXT4_INLINE_DATA_FL) != 0
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        (self.mode & S_IFMT) == S_IFDIR
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        (self.mode & S_IFMT) == S_IFREG
    }

    /// Decode a timestamp and its `_extra` word into (seconds, nanoseconds).
    ///
    /// The extra word packs two epoch-extension bits (low) and a 30-bit
    /// nanosecond count (high): `seconds = (extra & 0x3) << 32 | base`,
    /// `nanos = extra >> 2`.
    #[must_use]
    pub fn timestamp_parts(base: u32, extra: u32) -> (i64, u32) {
        let seconds = (i64::from(extra & 0x3) << 32) | i64::from(base);
        (seconds, extra >> 2)
    }

    /// Access time as (seconds since epoch, nanoseconds).
    #[must_use]
    pub fn atime_parts(&self) -> (i64, u32) {
        Self::timestamp_parts(self.atime, self.atime_extra)
    }

    /// Modification time as (seconds since epoch, nanoseconds).
    #[must_use]
    pub fn mtime_parts(&self) -> (i64, u32) {
        Self::timestamp_parts(self.mtime, self.mtime_extra)
    }

    /// Inode change time as (seconds since epoch, nanoseconds).
    #[must_use]
    pub fn ctime_parts(&self) -> (i64, u32) {
        Self::timestamp_parts(self.ctime, self.ctime_extra)
    }
}

mod serde_extent_root {
    use rext4_types::EXTENT_ROOT_SIZE;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &[u8; EXTENT_ROOT_SIZE],
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        ser.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<[u8; EXTENT_ROOT_SIZE], D::Error> {
        let raw = Vec::<u8>::deserialize(de)?;
        raw.try_into()
            .map_err(|_| D::Error::custom("extent root must be 60 bytes"))
    }
}
