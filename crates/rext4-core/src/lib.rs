#![forbid(unsafe_code)]
//! Read-only access to ext4 volumes.
//!
//! The entry point is [`Volume::open`], which validates the superblock and
//! exposes inode resolution, extent mapping, streaming file reads, directory
//! enumeration, and path lookup on top of a [`rext4_block::ByteDevice`].
//! [`Ext4Fs`] packages those pieces behind the [`FsOps`] trait consumed by
//! the FUSE adapter and the CLI.
//!
//! The volume is treated as immutable for the lifetime of a session; no
//! write path exists anywhere in this crate.

mod dir;
mod extents;
mod fsops;
mod resolve;
mod stream;
mod volume;

pub use dir::DirectoryDecoder;
pub use rext4_ondisk::DirEntryKind;
pub use extents::{MAX_EXTENT_DEPTH, map_logical_block};
pub use fsops::{DirEntryInfo, Ext4Fs, FileKind, FsOps, InodeAttr};
pub use resolve::resolve_path;
pub use stream::InodeStream;
pub use volume::Volume;
