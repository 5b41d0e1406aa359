#![forbid(unsafe_code)]
//! FUSE adapter for rext4.
//!
//! A thin translation layer: kernel FUSE requests arrive via the `fuser`
//! crate, get forwarded to a [`FsOps`] implementation, and errors are mapped
//! to POSIX errnos via `Rext4Error::to_errno`. The mount is always
//! read-only.

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyData,
    ReplyDirectory, ReplyEntry, ReplyOpen, Request,
};
use rext4_core::{DirEntryInfo, DirEntryKind, FileKind, FsOps, InodeAttr};
use rext4_types::InodeNumber;
use std::ffi::OsStr;
use std::os::raw::c_int;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// TTL for cached attributes and entries.
///
/// The image is immutable for the session, so a generous TTL is safe.
const ATTR_TTL: Duration = Duration::from_secs(60);

// ── Error type ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MountError {
    #[error("invalid mountpoint: {0}")]
    InvalidMountpoint(String),
    #[error("mount I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Type conversions ────────────────────────────────────────────────────────

fn to_fuser_file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::RegularFile => FileType::RegularFile,
        FileKind::Directory => FileType::Directory,
        FileKind::Symlink => FileType::Symlink,
        FileKind::BlockDevice => FileType::BlockDevice,
        FileKind::CharDevice => FileType::CharDevice,
        FileKind::Fifo => FileType::NamedPipe,
        FileKind::Socket => FileType::Socket,
    }
}

fn entry_file_type(entry: &DirEntryInfo) -> FileType {
    match entry.kind {
        DirEntryKind::RegularFile | DirEntryKind::Unknown => FileType::RegularFile,
        DirEntryKind::Directory => FileType::Directory,
        DirEntryKind::Symlink => FileType::Symlink,
        DirEntryKind::BlockDevice => FileType::BlockDevice,
        DirEntryKind::CharDevice => FileType::CharDevice,
        DirEntryKind::Fifo => FileType::NamedPipe,
        DirEntryKind::Socket => FileType::Socket,
    }
}

fn to_file_attr(attr: &InodeAttr) -> FileAttr {
    FileAttr {
        ino: u64::from(attr.ino.0),
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.ctime,
        kind: to_fuser_file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: attr.blksize,
        flags: 0,
    }
}

// ── Mount options ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MountOptions {
    pub allow_other: bool,
    pub auto_unmount: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            allow_other: false,
            auto_unmount: true,
        }
    }
}

// ── FUSE filesystem adapter ─────────────────────────────────────────────────

/// FUSE adapter delegating all operations to a [`FsOps`] implementation.
///
/// Only `getattr`, `lookup`, `open`, `opendir`, `read`, and `readdir` are
/// overridden; everything else returns `ENOSYS` via fuser's defaults, which
/// is the correct answer for a read-only volume.
pub struct RextFuse {
    ops: Box<dyn FsOps>,
}

impl RextFuse {
    #[must_use]
    pub fn new(ops: Box<dyn FsOps>) -> Self {
        Self { ops }
    }

    /// Translate a kernel inode number. The kernel addresses the mount
    /// root as `FUSE_ROOT_ID` (1); on ext4 the root directory is inode 2.
    fn ino(raw: u64) -> Result<InodeNumber, c_int> {
        if raw == fuser::FUSE_ROOT_ID {
            return Ok(InodeNumber::ROOT);
        }
        u32::try_from(raw).map(InodeNumber).map_err(|_| libc::EINVAL)
    }
}

impl Filesystem for RextFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        Ok(())
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let ino = match Self::ino(ino) {
            Ok(ino) => ino,
            Err(errno) => return reply.error(errno),
        };
        match self.ops.getattr(ino) {
            Ok(attr) => reply.attr(&ATTR_TTL, &to_file_attr(&attr)),
            Err(e) => {
                warn!(ino = ino.0, error = %e, "getattr failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let parent = match Self::ino(parent) {
            Ok(ino) => ino,
            Err(errno) => return reply.error(errno),
        };
        match self.ops.lookup(parent, name.as_encoded_bytes()) {
            Ok(attr) => reply.entry(&ATTR_TTL, &to_file_attr(&attr), 0),
            Err(e) => {
                // Missing entries are routine; don't warn for those.
                if e.to_errno() != libc::ENOENT {
                    warn!(parent = parent.0, ?name, error = %e, "lookup failed");
                }
                reply.error(e.to_errno());
            }
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let ino = match Self::ino(ino) {
            Ok(ino) => ino,
            Err(errno) => return reply.error(errno),
        };
        let write_requested = (flags & libc::O_ACCMODE) != libc::O_RDONLY;
        match self.ops.open(ino, write_requested) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => {
                if e.to_errno() != libc::EACCES {
                    warn!(ino = ino.0, flags, error = %e, "open failed");
                }
                reply.error(e.to_errno());
            }
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        // Stateless directory handles.
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let ino = match Self::ino(ino) {
            Ok(ino) => ino,
            Err(errno) => return reply.error(errno),
        };
        let byte_offset = u64::try_from(offset).unwrap_or(0);
        match self.ops.read(ino, byte_offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                warn!(ino = ino.0, offset, size, error = %e, "read failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let ino = match Self::ino(ino) {
            Ok(ino) => ino,
            Err(errno) => return reply.error(errno),
        };
        let skip = usize::try_from(offset).unwrap_or(0);
        match self.ops.readdir(ino) {
            Ok(entries) => {
                for (index, entry) in entries.iter().enumerate().skip(skip) {
                    let next_offset = (index + 1) as i64;
                    let full = reply.add(
                        u64::from(entry.ino.0),
                        next_offset,
                        entry_file_type(entry),
                        OsStr::new(&entry.name_str()),
                    );
                    if full {
                        break;
                    }
                }
                reply.ok();
            }
            Err(e) => {
                warn!(ino = ino.0, offset, error = %e, "readdir failed");
                reply.error(e.to_errno());
            }
        }
    }
}

// ── Mount entrypoints ───────────────────────────────────────────────────────

fn build_mount_options(options: &MountOptions) -> Vec<MountOption> {
    let mut opts = vec![
        MountOption::FSName("rext4".to_owned()),
        MountOption::Subtype("rext4".to_owned()),
        MountOption::DefaultPermissions,
        MountOption::NoAtime,
        MountOption::RO,
    ];

    if options.allow_other {
        opts.push(MountOption::AllowOther);
    }
    if options.auto_unmount {
        opts.push(MountOption::AutoUnmount);
    }

    opts
}

fn check_mountpoint(mountpoint: &Path) -> Result<(), MountError> {
    if mountpoint.as_os_str().is_empty() {
        return Err(MountError::InvalidMountpoint(
            "mountpoint cannot be empty".to_owned(),
        ));
    }
    Ok(())
}

/// Mount a volume at the given mountpoint (blocking until unmounted).
pub fn mount(
    ops: Box<dyn FsOps>,
    mountpoint: impl AsRef<Path>,
    options: &MountOptions,
) -> Result<(), MountError> {
    let mountpoint = mountpoint.as_ref();
    check_mountpoint(mountpoint)?;
    let fuse_opts = build_mount_options(options);
    fuser::mount2(RextFuse::new(ops), mountpoint, &fuse_opts)?;
    Ok(())
}

/// Mount in the background, returning a session handle that unmounts on
/// drop.
pub fn mount_background(
    ops: Box<dyn FsOps>,
    mountpoint: impl AsRef<Path>,
    options: &MountOptions,
) -> Result<fuser::BackgroundSession, MountError> {
    let mountpoint = mountpoint.as_ref();
    check_mountpoint(mountpoint)?;
    let fuse_opts = build_mount_options(options);
    let session = fuser::spawn_mount2(RextFuse::new(ops), mountpoint, &fuse_opts)?;
    Ok(session)
}
