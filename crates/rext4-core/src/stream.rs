//! Byte-stream reader over an inode.

use crate::extents::map_logical_block;
use crate::volume::Volume;
use rext4_error::{Result, Rext4Error};
use rext4_ondisk::Inode;
use rext4_types::ByteOffset;

/// Stateful cursor over an inode's byte content.
///
/// Holds a snapshot of the decoded inode and a shared reference to the
/// volume. Reads advance the cursor; a single `read` never crosses an
/// extent boundary, so callers wanting a full range loop until an empty
/// result.
pub struct InodeStream<'v> {
    volume: &'v Volume,
    inode: Inode,
    offset: u64,
}

impl<'v> InodeStream<'v> {
    #[must_use]
    pub fn new(volume: &'v Volume, inode: Inode) -> Self {
        Self {
            volume,
            inode,
            offset: 0,
        }
    }

    #[must_use]
    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Set the cursor. Seeking past the end is allowed; the next read
    /// returns no bytes.
    pub fn seek(&mut self, pos: u64) {
        self.offset = pos;
    }

    /// Read up to `max` bytes from the current offset.
    ///
    /// The returned length is the minimum of the remaining bytes in the
    /// covering extent, `max`, and the remaining file size. An empty result
    /// means end of file.
    pub fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let file_size = self.inode.size;
        if self.offset >= file_size {
            return Ok(Vec::new());
        }

        let bs = self.volume.block_size().as_u64();
        let block_offset = u32::try_from(self.offset / bs)
            .map_err(|_| Rext4Error::Corrupt("file offset exceeds 32-bit block space".to_owned()))?;
        let extent = map_logical_block(self.volume, &self.inode, block_offset)?;

        let logical_start = u64::from(extent.logical_block) * bs;
        let offset_into_extent = self.offset - logical_start;
        let physical_start = extent
            .physical_start
            .checked_mul(bs)
            .ok_or_else(|| Rext4Error::Corrupt("extent start overflows u64".to_owned()))?;

        let extent_remaining = u64::from(extent.len()) * bs - offset_into_extent;
        let take = extent_remaining
            .min(max as u64)
            .min(file_size - self.offset);

        let mut buf = vec![0_u8; take as usize];
        self.volume
            .blocks()
            .read_exact_at(ByteOffset(physical_start + offset_into_extent), &mut buf)?;
        self.offset += take;
        Ok(buf)
    }

    /// Read from the current offset to end of file.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read(64 * 1024)?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }
}
