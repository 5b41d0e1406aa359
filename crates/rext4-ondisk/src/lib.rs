#![forbid(unsafe_code)]
//! On-disk format parsing for ext4 structures.
//!
//! Pure parsing crate — no I/O, no side effects. Parses byte slices into
//! typed Rust structures representing the superblock, group descriptors,
//! inodes, extent-tree nodes, directory entries, and the htree root header.

pub mod checksum;
pub mod dirent;
pub mod extent;
pub mod inode;
pub mod superblock;

pub use checksum::{checksum_with_seed, superblock_checksum};
pub use dirent::{DirEntry, DirEntryKind, HtreeRootInfo, parse_dir_block, parse_htree_root};
pub use extent::{Extent, ExtentHeader, ExtentIndex, ExtentNode, parse_extent_node};
pub use inode::Inode;
pub use superblock::{GroupDesc, Superblock};
