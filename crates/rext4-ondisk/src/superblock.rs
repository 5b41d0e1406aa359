//! Superblock and block-group descriptor parsing.

use rext4_types::{
    BlockNumber, BlockSize, FEATURE_INCOMPAT_64BIT, FEATURE_INCOMPAT_SUPPORTED, ParseError,
    SUPER_MAGIC, SUPERBLOCK_SIZE, ensure_slice, read_fixed, read_le_u16, read_le_u32, read_u8,
    trim_nul_padded,
};
use serde::{Deserialize, Serialize};

/// Parsed ext4 superblock, reduced to the fields this reader consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub magic: u16,
    pub block_size: BlockSize,
    pub inode_size: u16,
    pub inodes_count: u32,
    pub blocks_count: u64,
    pub free_blocks_count: u64,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub desc_size: u16,
    pub feature_incompat: u32,
    pub checksum_type: u8,
    pub checksum: u32,
    pub uuid: [u8; 16],
    pub volume_name: String,
}

impl Superblock {
    /// Parse a superblock from its 1024-byte on-disk region.
    pub fn parse(region: &[u8]) -> Result<Self, ParseError> {
        if region.len() < SUPERBLOCK_SIZE {
            return Err(ParseError::InsufficientData {
                needed: SUPERBLOCK_SIZE,
                offset: 0,
                actual: region.len(),
            });
        }

        let magic = read_le_u16(region, 0x38)?;
        if magic != SUPER_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: u32::from(SUPER_MAGIC),
                actual: u32::from(magic),
            });
        }

        let block_size = BlockSize::from_log(read_le_u32(region, 0x18)?)?;

        let blocks_lo = u64::from(read_le_u32(region, 0x04)?);
        let blocks_hi = u64::from(read_le_u32(region, 0x150)?);
        let free_blocks_lo = u64::from(read_le_u32(region, 0x0C)?);
        let free_blocks_hi = u64::from(read_le_u32(region, 0x158)?);

        Ok(Self {
            magic,
            block_size,
            inode_size: read_le_u16(region, 0x58)?,
            inodes_count: read_le_u32(region, 0x00)?,
            blocks_count: blocks_lo | (blocks_hi << 32),
            free_blocks_count: free_blocks_lo | (free_blocks_hi << 32),
            free_inodes_count: read_le_u32(region, 0x10)?,
            first_data_block: read_le_u32(region, 0x14)?,
            blocks_per_group: read_le_u32(region, 0x20)?,
            inodes_per_group: read_le_u32(region, 0x28)?,
            desc_size: read_le_u16(region, 0xFE)?,
            feature_incompat: read_le_u32(region, 0x60)?,
            checksum_type: read_u8(region, 0x175)?,
            checksum: read_le_u32(region, 0x3FC)?,
            uuid: read_fixed::<16>(region, 0x68)?,
            volume_name: trim_nul_padded(&read_fixed::<16>(region, 0x78)?),
        })
    }

    #[must_use]
    pub fn is_64bit(&self) -> bool {
        (self.feature_incompat & FEATURE_INCOMPAT_64BIT) != 0
    }

    /// Size of one group descriptor: 32 bytes, or `s_desc_size` when the
    /// 64BIT feature is present.
    #[must_use]
    pub fn group_desc_size(&self) -> u16 {
        if self.is_64bit() {
            self.desc_size.max(32)
        } else {
            32
        }
    }

    /// Incompat bits outside the accepted set (zero for a usable volume).
    #[must_use]
    pub fn unknown_incompat_bits(&self) -> u32 {
        self.feature_incompat & !FEATURE_INCOMPAT_SUPPORTED
    }

    /// Whether the superblock declares a CRC32C checksum.
    #[must_use]
    pub fn has_crc32c_checksum(&self) -> bool {
        self.checksum_type == 1
    }

    /// Block holding the start of the group descriptor table.
    ///
    /// The expression `1024 / block_size + 1` lands on block 2 for 1 KiB
    /// blocks (the superblock occupies block 1) and block 1 otherwise.
    #[must_use]
    pub fn descriptor_table_block(&self) -> BlockNumber {
        BlockNumber(1024 / self.block_size.as_u64() + 1)
    }
}

/// Parsed block-group descriptor. This reader only needs the inode table
/// location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDesc {
    pub inode_table: BlockNumber,
}

impl GroupDesc {
    /// Parse a group descriptor from `desc_size` raw bytes.
    ///
    /// The inode table block is `bg_inode_table_lo`, extended with
    /// `bg_inode_table_hi` when the descriptor is 64 bytes or larger.
    pub fn parse(bytes: &[u8], desc_size: u16) -> Result<Self, ParseError> {
        let desc_size = usize::from(desc_size);
        if desc_size < 32 {
            return Err(ParseError::InvalidField {
                field: "s_desc_size",
                reason: "descriptor size must be >= 32",
            });
        }
        ensure_slice(bytes, 0, desc_size)?;

        let inode_table_lo = u64::from(read_le_u32(bytes, 0x08)?);
        let inode_table_hi = if desc_size >= 64 {
            u64::from(read_le_u32(bytes, 0x28)?)
        } else {
            0
        };

        Ok(Self {
            inode_table: BlockNumber(inode_table_lo | (inode_table_hi << 32)),
        })
    }
}
