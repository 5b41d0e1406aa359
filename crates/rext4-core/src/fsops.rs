//! Adapter surface consumed by the FUSE layer and the CLI.

use crate::dir::DirectoryDecoder;
use crate::resolve::resolve_path;
use crate::stream::InodeStream;
use crate::volume::Volume;
use rext4_block::{ByteDevice, FileByteDevice};
use rext4_error::{Result, Rext4Error};
use rext4_ondisk::{DirEntryKind, Inode};
use rext4_types::{
    InodeNumber, S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK,
};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// File kind derived from an inode's mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    RegularFile,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

impl FileKind {
    #[must_use]
    pub fn from_mode(mode: u16) -> Option<Self> {
        match mode & S_IFMT {
            S_IFREG => Some(Self::RegularFile),
            S_IFDIR => Some(Self::Directory),
            S_IFLNK => Some(Self::Symlink),
            S_IFBLK => Some(Self::BlockDevice),
            S_IFCHR => Some(Self::CharDevice),
            S_IFIFO => Some(Self::Fifo),
            S_IFSOCK => Some(Self::Socket),
            _ => None,
        }
    }
}

/// Attributes handed to the filesystem adapter.
#[derive(Debug, Clone)]
pub struct InodeAttr {
    pub ino: InodeNumber,
    pub size: u64,
    pub kind: FileKind,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub blksize: u32,
}

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub ino: InodeNumber,
    pub kind: DirEntryKind,
    pub name: Vec<u8>,
}

impl DirEntryInfo {
    #[must_use]
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Operations the filesystem adapter needs from the reader.
pub trait FsOps: Send + Sync {
    /// Attributes of an inode.
    fn getattr(&self, ino: InodeNumber) -> Result<InodeAttr>;

    /// Find `name` in a directory; returns the child's attributes.
    fn lookup(&self, parent: InodeNumber, name: &[u8]) -> Result<InodeAttr>;

    /// All entries of a directory, including `.` and `..`.
    fn readdir(&self, ino: InodeNumber) -> Result<Vec<DirEntryInfo>>;

    /// Open an inode for reading. Any write intent fails `AccessDenied`.
    fn open(&self, ino: InodeNumber, write_requested: bool) -> Result<u64>;

    /// Read up to `size` bytes at `offset` from a file inode.
    fn read(&self, ino: InodeNumber, offset: u64, size: u32) -> Result<Vec<u8>>;
}

/// The reader packaged behind [`FsOps`].
pub struct Ext4Fs {
    volume: Volume,
}

impl Ext4Fs {
    #[must_use]
    pub fn new(volume: Volume) -> Self {
        Self { volume }
    }

    /// Open a reader over an arbitrary byte device.
    pub fn open_device(dev: Box<dyn ByteDevice>) -> Result<Self> {
        Ok(Self::new(Volume::open(dev)?))
    }

    /// Open a reader over an image file.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_device(Box::new(FileByteDevice::open(path)?))
    }

    #[must_use]
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    /// Attributes of the root directory.
    pub fn root_attributes(&self) -> Result<InodeAttr> {
        self.getattr(InodeNumber::ROOT)
    }

    /// Resolve an absolute path to its inode.
    pub fn resolve(&self, path: &str) -> Result<(InodeNumber, Inode)> {
        resolve_path(&self.volume, path)
    }

    /// Stream a file's full contents, given its path.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let (_, inode) = self.resolve(path)?;
        InodeStream::new(&self.volume, inode).read_to_end()
    }

    fn attr_for(&self, ino: InodeNumber, inode: &Inode) -> Result<InodeAttr> {
        let kind = FileKind::from_mode(inode.mode)
            .ok_or(Rext4Error::NotSupported("unknown file type in inode mode"))?;
        let (atime_s, atime_ns) = inode.atime_parts();
        let (mtime_s, mtime_ns) = inode.mtime_parts();
        let (ctime_s, ctime_ns) = inode.ctime_parts();
        Ok(InodeAttr {
            ino,
            size: inode.size,
            kind,
            perm: inode.mode & 0o7777,
            nlink: u32::from(inode.links_count),
            uid: inode.uid,
            gid: inode.gid,
            atime: epoch_time(atime_s, atime_ns),
            mtime: epoch_time(mtime_s, mtime_ns),
            ctime: epoch_time(ctime_s, ctime_ns),
            blksize: self.volume.block_size().get(),
        })
    }
}

/// Convert decoded (seconds, nanoseconds) into a `SystemTime`.
///
/// The decoded seconds are a non-negative composition of unsigned fields.
fn epoch_time(seconds: i64, nanos: u32) -> SystemTime {
    let seconds = u64::try_from(seconds).unwrap_or(0);
    SystemTime::UNIX_EPOCH + Duration::new(seconds, nanos)
}

impl FsOps for Ext4Fs {
    fn getattr(&self, ino: InodeNumber) -> Result<InodeAttr> {
        let inode = self.volume.read_inode(ino)?;
        self.attr_for(ino, &inode)
    }

    fn lookup(&self, parent: InodeNumber, name: &[u8]) -> Result<InodeAttr> {
        let parent_inode = self.volume.read_inode(parent)?;
        for entry in DirectoryDecoder::new(&self.volume, parent_inode)? {
            let entry = entry?;
            if entry.name == name {
                let ino = InodeNumber(entry.inode);
                let inode = self.volume.read_inode(ino)?;
                return self.attr_for(ino, &inode);
            }
        }
        Err(Rext4Error::NotFound(
            String::from_utf8_lossy(name).into_owned(),
        ))
    }

    fn readdir(&self, ino: InodeNumber) -> Result<Vec<DirEntryInfo>> {
        let inode = self.volume.read_inode(ino)?;
        let mut entries = Vec::new();
        for entry in DirectoryDecoder::new(&self.volume, inode)? {
            let entry = entry?;
            entries.push(DirEntryInfo {
                ino: InodeNumber(entry.inode),
                kind: entry.file_type,
                name: entry.name,
            });
        }
        Ok(entries)
    }

    fn open(&self, ino: InodeNumber, write_requested: bool) -> Result<u64> {
        if write_requested {
            return Err(Rext4Error::AccessDenied);
        }
        // Handles are stateless; opening just confirms the inode decodes.
        self.volume.read_inode(ino)?;
        Ok(0)
    }

    fn read(&self, ino: InodeNumber, offset: u64, size: u32) -> Result<Vec<u8>> {
        let inode = self.volume.read_inode(ino)?;
        let mut stream = InodeStream::new(&self.volume, inode);
        stream.seek(offset);

        let wanted = size as usize;
        let mut out = Vec::with_capacity(wanted.min(64 * 1024));
        while out.len() < wanted {
            let chunk = stream.read(wanted - out.len())?;
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}
