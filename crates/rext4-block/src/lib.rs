#![forbid(unsafe_code)]
//! Device access for rext4.
//!
//! Provides the `ByteDevice` trait (pread-style positioned reads), a
//! file-backed implementation, an in-memory implementation for tests, and a
//! bounded read-through block cache. The image is immutable for the lifetime
//! of a session, so cached blocks never need invalidation.

use parking_lot::Mutex;
use rext4_error::{Result, Rext4Error};
use rext4_types::{BlockNumber, BlockSize, ByteOffset, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Byte-addressed device for fixed-offset reads (pread semantics).
///
/// No seek state is observable across operations; a short read is an error.
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()>;
}

/// File-backed byte device using `pread`-style I/O.
///
/// `std::os::unix::fs::FileExt::read_exact_at` is thread-safe and does not
/// require a shared seek position.
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
}

impl FileByteDevice {
    /// Open a device read-only. The reader never writes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
        })
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or_else(|| Rext4Error::Corrupt("read range overflows u64".to_owned()))?;
        if end.0 > self.len {
            return Err(Rext4Error::Corrupt(format!(
                "read out of bounds: offset={offset} len={} device_len={}",
                buf.len(),
                self.len
            )));
        }
        self.file.read_exact_at(buf, offset.0)?;
        Ok(())
    }
}

/// In-memory byte device backed by a `Vec<u8>`.
#[derive(Debug, Clone)]
pub struct MemoryByteDevice {
    bytes: Arc<Vec<u8>>,
}

impl MemoryByteDevice {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(bytes),
        }
    }
}

impl ByteDevice for MemoryByteDevice {
    fn len_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset.0)
            .map_err(|_| Rext4Error::Corrupt("offset exceeds addressable range".to_owned()))?;
        let end = start
            .checked_add(buf.len())
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                Rext4Error::Corrupt(format!(
                    "read out of bounds: offset={offset} len={} device_len={}",
                    buf.len(),
                    self.bytes.len()
                ))
            })?;
        buf.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }
}

/// Read the raw superblock region (1024 bytes at offset 1024).
pub fn read_superblock_region(dev: &dyn ByteDevice) -> Result<[u8; SUPERBLOCK_SIZE]> {
    let mut region = [0_u8; SUPERBLOCK_SIZE];
    dev.read_exact_at(ByteOffset(SUPERBLOCK_OFFSET), &mut region)?;
    Ok(region)
}

/// Default bound on cached blocks (a few MiB at 4 KiB blocks).
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Read-through block cache over a `ByteDevice`.
///
/// FIFO eviction; the underlying image never changes during a session so a
/// cached block stays valid until evicted.
pub struct CachedBlockReader {
    dev: Box<dyn ByteDevice>,
    block_size: BlockSize,
    cache: Mutex<BlockCache>,
}

struct BlockCache {
    blocks: HashMap<BlockNumber, Arc<Vec<u8>>>,
    order: VecDeque<BlockNumber>,
    capacity: usize,
}

impl CachedBlockReader {
    #[must_use]
    pub fn new(dev: Box<dyn ByteDevice>, block_size: BlockSize) -> Self {
        Self::with_capacity(dev, block_size, DEFAULT_CACHE_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(dev: Box<dyn ByteDevice>, block_size: BlockSize, capacity: usize) -> Self {
        Self {
            dev,
            block_size,
            cache: Mutex::new(BlockCache {
                blocks: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    #[must_use]
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    #[must_use]
    pub fn device(&self) -> &dyn ByteDevice {
        &*self.dev
    }

    /// Read a whole block, consulting the cache first.
    pub fn read_block(&self, block: BlockNumber) -> Result<Arc<Vec<u8>>> {
        if let Some(cached) = self.cache.lock().blocks.get(&block) {
            trace!(target: "rext4::block", event = "cache_hit", block = block.0);
            return Ok(Arc::clone(cached));
        }

        let offset = self
            .block_size
            .block_to_byte(block)
            .ok_or_else(|| Rext4Error::Corrupt(format!("block {block} offset overflows u64")))?;
        let mut buf = vec![0_u8; self.block_size.as_usize()];
        self.dev.read_exact_at(offset, &mut buf)?;
        trace!(target: "rext4::block", event = "cache_miss", block = block.0);

        let data = Arc::new(buf);
        let mut cache = self.cache.lock();
        if cache.blocks.len() >= cache.capacity {
            if let Some(evicted) = cache.order.pop_front() {
                cache.blocks.remove(&evicted);
            }
        }
        if cache.blocks.insert(block, Arc::clone(&data)).is_none() {
            cache.order.push_back(block);
        }
        Ok(data)
    }

    /// Read `buf.len()` bytes at an arbitrary byte offset, bypassing the
    /// block cache. Used for records that straddle no block boundary of
    /// interest (inode table slots, group descriptors).
    pub fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        self.dev.read_exact_at(offset, buf)
    }
}
