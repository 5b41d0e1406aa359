//! Volume open/validation, group descriptor lookup, and inode resolution.

use rext4_block::{ByteDevice, CachedBlockReader, read_superblock_region};
use rext4_error::{Result, Rext4Error};
use rext4_ondisk::{GroupDesc, Inode, Superblock, superblock_checksum};
use rext4_types::{
    BlockSize, GroupNumber, INODE_CORE_SIZE, InodeNumber, ParseError, SUPER_MAGIC,
    inode_index_in_group, inode_to_group,
};
use tracing::{debug, warn};

/// An opened ext4 volume.
///
/// Owns the device; everything below it (streams, directory decoders, path
/// resolution) borrows the volume. Created once per image, immutable
/// thereafter.
pub struct Volume {
    blocks: CachedBlockReader,
    sb: Superblock,
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume").field("sb", &self.sb).finish()
    }
}

impl Volume {
    /// Open a volume: read the first superblock copy at byte 1024, verify
    /// magic and (when declared) the CRC32C checksum, and reject any
    /// incompatible feature outside the accepted set.
    ///
    /// Backup superblock copies are never consulted.
    pub fn open(dev: Box<dyn ByteDevice>) -> Result<Self> {
        let region = read_superblock_region(&*dev)?;
        let sb = Superblock::parse(&region).map_err(|err| match err {
            ParseError::InvalidMagic { actual, .. } => Rext4Error::BadMagic {
                structure: "superblock",
                expected: u32::from(SUPER_MAGIC),
                actual,
            },
            other => Rext4Error::Corrupt(other.to_string()),
        })?;

        if sb.has_crc32c_checksum() {
            let computed = superblock_checksum(&region);
            if computed != sb.checksum {
                return Err(Rext4Error::ChecksumMismatch {
                    computed,
                    stored: sb.checksum,
                });
            }
        } else if sb.checksum_type != 0 {
            // Only CRC32C is ever verified; an unrecognized declaration is
            // noted and the superblock accepted as-is.
            warn!(
                target: "rext4::volume",
                checksum_type = sb.checksum_type,
                "unsupported superblock checksum type, skipping verification"
            );
        }

        let unknown_bits = sb.unknown_incompat_bits();
        if unknown_bits != 0 {
            return Err(Rext4Error::UnsupportedFeature { unknown_bits });
        }

        debug!(
            target: "rext4::volume",
            block_size = sb.block_size.get(),
            inode_size = sb.inode_size,
            inodes_per_group = sb.inodes_per_group,
            desc_size = sb.group_desc_size(),
            "volume opened"
        );

        let block_size = sb.block_size;
        Ok(Self {
            blocks: CachedBlockReader::new(dev, block_size),
            sb,
        })
    }

    #[must_use]
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    #[must_use]
    pub fn block_size(&self) -> BlockSize {
        self.sb.block_size
    }

    #[must_use]
    pub(crate) fn blocks(&self) -> &CachedBlockReader {
        &self.blocks
    }

    /// Resolve a block-group index to its descriptor.
    pub fn group_desc(&self, group: GroupNumber) -> Result<GroupDesc> {
        let desc_size = self.sb.group_desc_size();
        let table_byte = self
            .sb
            .block_size
            .block_to_byte(self.sb.descriptor_table_block())
            .ok_or_else(|| Rext4Error::Corrupt("descriptor table offset overflows u64".to_owned()))?;
        let offset = table_byte
            .checked_add(u64::from(group.0) * u64::from(desc_size))
            .ok_or_else(|| Rext4Error::Corrupt("group descriptor offset overflows u64".to_owned()))?;

        let mut buf = vec![0_u8; usize::from(desc_size)];
        self.blocks.read_exact_at(offset, &mut buf)?;
        Ok(GroupDesc::parse(&buf, desc_size)?)
    }

    /// Resolve an inode number to its decoded record.
    ///
    /// Block-mapped inodes (EXTENTS flag clear) and inline-data inodes are
    /// out of scope and rejected.
    pub fn read_inode(&self, ino: InodeNumber) -> Result<Inode> {
        if ino.0 == 0 {
            return Err(Rext4Error::Corrupt("inode 0 is invalid in ext4".to_owned()));
        }

        let group = inode_to_group(ino, self.sb.inodes_per_group);
        let index = inode_index_in_group(ino, self.sb.inodes_per_group);
        let gd = self.group_desc(group)?;

        let table_byte = self
            .sb
            .block_size
            .block_to_byte(gd.inode_table)
            .ok_or_else(|| Rext4Error::Corrupt("inode table offset overflows u64".to_owned()))?;
        let offset = table_byte
            .checked_add(u64::from(index) * u64::from(self.sb.inode_size))
            .ok_or_else(|| Rext4Error::Corrupt("inode offset overflows u64".to_owned()))?;

        // Read exactly inode_size bytes; with 128-byte inodes the extended
        // timestamp words decode as zero from the padding.
        let inode_size = usize::from(self.sb.inode_size);
        let mut buf = vec![0_u8; inode_size.max(INODE_CORE_SIZE)];
        self.blocks.read_exact_at(offset, &mut buf[..inode_size])?;
        let inode = Inode::parse(&buf)?;

        if inode.has_inline_data() {
            return Err(Rext4Error::NotSupported("inode with inline data"));
        }
        if !inode.uses_extents() {
            return Err(Rext4Error::NotSupported("inode without extents flag"));
        }

        Ok(inode)
    }
}
