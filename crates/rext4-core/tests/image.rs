//! Integration tests against a hand-built ext4 image.
//!
//! The builder lays out a minimal but fully valid filesystem in memory:
//! 1 KiB blocks, one block group, a root directory with regular files, a
//! subdirectory, a file with a depth-1 extent tree, an htree-flagged
//! directory, and a file with an uninitialized extent.

use rext4_block::MemoryByteDevice;
use rext4_core::{DirectoryDecoder, Ext4Fs, FsOps, InodeStream, Volume, map_logical_block};
use rext4_error::Rext4Error;
use rext4_ondisk::{parse_dir_block, superblock_checksum};
use rext4_types::{
    BlockNumber, EXT4_EXTENTS_FL, EXT4_INDEX_FL, EXTENT_MAGIC, FEATURE_INCOMPAT_EXTENTS,
    FEATURE_INCOMPAT_FILETYPE, InodeNumber, SUPER_MAGIC,
};
use std::time::{Duration, SystemTime};

const BLOCK: usize = 1024;
const INODE_SIZE: usize = 256;
const INODE_TABLE_BLOCK: usize = 5;

const INO_ROOT: u32 = 2;
const INO_ABIN: u32 = 11;
const INO_SUB: u32 = 12;
const INO_BIG: u32 = 13;
const INO_HELLO: u32 = 14;
const INO_HDIR: u32 = 15;
const INO_UNINIT: u32 = 16;

const HELLO_CONTENT: &[u8] = b"hello from the subdirectory\n";

// ── Image builder ───────────────────────────────────────────────────────────

fn put16(img: &mut [u8], offset: usize, value: u16) {
    img[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put32(img: &mut [u8], offset: usize, value: u32) {
    img[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn inode_offset(ino: u32) -> usize {
    INODE_TABLE_BLOCK * BLOCK + (ino as usize - 1) * INODE_SIZE
}

struct InodeSpec {
    mode: u16,
    size: u64,
    flags: u32,
    links: u16,
    uid: u16,
    gid: u16,
    mtime: u32,
    mtime_extra: u32,
    atime: u32,
    atime_extra: u32,
}

impl Default for InodeSpec {
    fn default() -> Self {
        Self {
            mode: 0o100_644,
            size: 0,
            flags: EXT4_EXTENTS_FL,
            links: 1,
            uid: 1000,
            gid: 100,
            mtime: 1_700_000_000,
            mtime_extra: 0,
            atime: 1_700_000_000,
            atime_extra: 0,
        }
    }
}

fn write_inode(img: &mut [u8], ino: u32, spec: &InodeSpec, extent_root: &[u8]) {
    let base = inode_offset(ino);
    put16(img, base, spec.mode);
    put16(img, base + 0x02, spec.uid);
    put32(img, base + 0x04, spec.size as u32);
    put32(img, base + 0x08, spec.atime);
    put32(img, base + 0x10, spec.mtime);
    put16(img, base + 0x18, spec.gid);
    put16(img, base + 0x1A, spec.links);
    put32(img, base + 0x20, spec.flags);
    put32(img, base + 0x6C, (spec.size >> 32) as u32);
    put32(img, base + 0x88, spec.mtime_extra);
    put32(img, base + 0x8C, spec.atime_extra);
    img[base + 0x28..base + 0x28 + extent_root.len()].copy_from_slice(extent_root);
}

/// An extent node: header plus records, as laid out on disk.
fn extent_node(depth: u16, max: u16, records: &[(u32, u16, u64)]) -> Vec<u8> {
    let mut node = vec![0_u8; 12 + records.len() * 12];
    put16(&mut node, 0x00, EXTENT_MAGIC);
    put16(&mut node, 0x02, records.len() as u16);
    put16(&mut node, 0x04, max);
    put16(&mut node, 0x06, depth);
    for (i, (logical, len_or_unused, target)) in records.iter().enumerate() {
        let base = 12 + i * 12;
        put32(&mut node, base, *logical);
        if depth == 0 {
            // Leaf record: len, start_hi, start_lo.
            put16(&mut node, base + 4, *len_or_unused);
            put16(&mut node, base + 6, (*target >> 32) as u16);
            put32(&mut node, base + 8, *target as u32);
        } else {
            // Index record: leaf_lo, leaf_hi.
            put32(&mut node, base + 4, *target as u32);
            put16(&mut node, base + 8, (*target >> 32) as u16);
        }
    }
    node
}

fn write_dir_entry(
    img: &mut [u8],
    offset: usize,
    inode: u32,
    file_type: u8,
    name: &[u8],
    rec_len: u16,
) -> usize {
    put32(img, offset, inode);
    put16(img, offset + 4, rec_len);
    img[offset + 6] = name.len() as u8;
    img[offset + 7] = file_type;
    img[offset + 8..offset + 8 + name.len()].copy_from_slice(name);
    offset + usize::from(rec_len)
}

fn entry_len(name: &[u8]) -> u16 {
    ((8 + name.len() + 3) & !3) as u16
}

fn build_image(htree_indirect_levels: u8) -> Vec<u8> {
    let mut img = vec![0_u8; 64 * BLOCK];

    // ── Superblock at byte 1024 ─────────────────────────────────────────
    let sb = 1024;
    put16(&mut img, sb + 0x38, SUPER_MAGIC);
    put32(&mut img, sb + 0x18, 0); // log_block_size -> 1 KiB
    put32(&mut img, sb + 0x00, 16); // inodes_count
    put32(&mut img, sb + 0x04, 64); // blocks_count_lo
    put32(&mut img, sb + 0x14, 1); // first_data_block
    put32(&mut img, sb + 0x20, 64); // blocks_per_group
    put32(&mut img, sb + 0x28, 16); // inodes_per_group
    put16(&mut img, sb + 0x58, INODE_SIZE as u16);
    put32(
        &mut img,
        sb + 0x60,
        FEATURE_INCOMPAT_FILETYPE | FEATURE_INCOMPAT_EXTENTS,
    );
    img[sb + 0x78..sb + 0x7D].copy_from_slice(b"imgfs");

    // ── Group descriptor table at block 2 (1024/1024 + 1) ───────────────
    put32(&mut img, 2 * BLOCK + 0x08, INODE_TABLE_BLOCK as u32);

    // ── Root directory: block 9 ─────────────────────────────────────────
    write_inode(
        &mut img,
        INO_ROOT,
        &InodeSpec {
            mode: 0o040_755,
            size: BLOCK as u64,
            links: 4,
            uid: 0,
            gid: 0,
            ..InodeSpec::default()
        },
        &extent_node(0, 4, &[(0, 1, 9)]),
    );
    {
        let base = 9 * BLOCK;
        let mut at = base;
        at = write_dir_entry(&mut img, at, INO_ROOT, 2, b".", 12);
        at = write_dir_entry(&mut img, at, INO_ROOT, 2, b"..", 12);
        at = write_dir_entry(&mut img, at, INO_ABIN, 1, b"a.bin", entry_len(b"a.bin"));
        at = write_dir_entry(&mut img, at, INO_SUB, 2, b"sub", entry_len(b"sub"));
        at = write_dir_entry(&mut img, at, INO_BIG, 1, b"big.bin", entry_len(b"big.bin"));
        at = write_dir_entry(&mut img, at, INO_HDIR, 2, b"hdir", entry_len(b"hdir"));
        let remaining = (base + BLOCK - at) as u16;
        write_dir_entry(&mut img, at, INO_UNINIT, 1, b"uninit.bin", remaining);
    }

    // ── a.bin: 4 KiB of 0x00..0xFF repeated, blocks 10..14 ──────────────
    write_inode(
        &mut img,
        INO_ABIN,
        &InodeSpec {
            size: 4096,
            mtime: 1_700_000_200,
            mtime_extra: 250_000_000_u32 << 2,
            atime_extra: (7_u32 << 2) | 1, // epoch bit set
            ..InodeSpec::default()
        },
        &extent_node(0, 4, &[(0, 4, 10)]),
    );
    for i in 0..4096 {
        img[10 * BLOCK + i] = (i % 256) as u8;
    }

    // ── sub: directory with hello.txt, block 14 ─────────────────────────
    write_inode(
        &mut img,
        INO_SUB,
        &InodeSpec {
            mode: 0o040_755,
            size: BLOCK as u64,
            links: 2,
            ..InodeSpec::default()
        },
        &extent_node(0, 4, &[(0, 1, 14)]),
    );
    {
        let base = 14 * BLOCK;
        let mut at = base;
        at = write_dir_entry(&mut img, at, INO_SUB, 2, b".", 12);
        at = write_dir_entry(&mut img, at, INO_ROOT, 2, b"..", 12);
        let remaining = (base + BLOCK - at) as u16;
        write_dir_entry(&mut img, at, INO_HELLO, 1, b"hello.txt", remaining);
    }

    // ── big.bin: depth-1 extent tree over two non-contiguous runs ───────
    write_inode(
        &mut img,
        INO_BIG,
        &InodeSpec {
            size: 4096,
            ..InodeSpec::default()
        },
        &extent_node(1, 4, &[(0, 0, 20), (2, 0, 21)]),
    );
    {
        let leaf0 = extent_node(0, 84, &[(0, 2, 24)]);
        img[20 * BLOCK..20 * BLOCK + leaf0.len()].copy_from_slice(&leaf0);
        let leaf1 = extent_node(0, 84, &[(2, 2, 30)]);
        img[21 * BLOCK..21 * BLOCK + leaf1.len()].copy_from_slice(&leaf1);
    }
    for i in 0..2048 {
        img[24 * BLOCK + i] = (i % 251) as u8;
        img[30 * BLOCK + i] = (i % 241) as u8;
    }

    // ── hello.txt in sub, block 32 ──────────────────────────────────────
    write_inode(
        &mut img,
        INO_HELLO,
        &InodeSpec {
            size: HELLO_CONTENT.len() as u64,
            ..InodeSpec::default()
        },
        &extent_node(0, 4, &[(0, 1, 32)]),
    );
    img[32 * BLOCK..32 * BLOCK + HELLO_CONTENT.len()].copy_from_slice(HELLO_CONTENT);

    // ── hdir: htree-flagged directory, blocks 40..42 ────────────────────
    write_inode(
        &mut img,
        INO_HDIR,
        &InodeSpec {
            mode: 0o040_755,
            size: 2 * BLOCK as u64,
            links: 2,
            flags: EXT4_EXTENTS_FL | EXT4_INDEX_FL,
            ..InodeSpec::default()
        },
        &extent_node(0, 4, &[(0, 2, 40)]),
    );
    {
        // Root block: fake dot entries striding over the index records.
        let base = 40 * BLOCK;
        let mut at = base;
        at = write_dir_entry(&mut img, at, INO_HDIR, 2, b".", 12);
        write_dir_entry(&mut img, at, INO_ROOT, 2, b"..", (BLOCK - 12) as u16);
        img[base + 0x1C] = 1; // hash_version
        img[base + 0x1D] = 8; // info_length
        img[base + 0x1E] = htree_indirect_levels;
        put16(&mut img, base + 0x20, 124); // limit
        put16(&mut img, base + 0x22, 1); // count

        // Second block: ordinary linear entries.
        let base = 41 * BLOCK;
        let mut at = base;
        at = write_dir_entry(&mut img, at, INO_ABIN, 1, b"f1", 12);
        at = write_dir_entry(&mut img, at, INO_BIG, 1, b"f2", 12);
        let remaining = (base + BLOCK - at) as u16;
        write_dir_entry(&mut img, at, INO_HELLO, 1, b"f3", remaining);
    }

    // ── uninit.bin: extent with the uninitialized flag ──────────────────
    write_inode(
        &mut img,
        INO_UNINIT,
        &InodeSpec {
            size: BLOCK as u64,
            ..InodeSpec::default()
        },
        &extent_node(0, 4, &[(0, (1_u16 << 15) | 1, 33)]),
    );

    // ── Superblock checksum, declared and stored last ───────────────────
    img[sb + 0x175] = 1;
    let checksum = superblock_checksum(&img[sb..sb + 1024]);
    put32(&mut img, sb + 0x3FC, checksum);

    img
}

fn open_volume() -> Volume {
    Volume::open(Box::new(MemoryByteDevice::new(build_image(0)))).expect("open volume")
}

fn open_fs() -> Ext4Fs {
    Ext4Fs::open_device(Box::new(MemoryByteDevice::new(build_image(0)))).expect("open fs")
}

// ── Volume-level tests ──────────────────────────────────────────────────────

#[test]
fn volume_opens_with_valid_checksum() {
    let volume = open_volume();
    assert_eq!(volume.block_size().get(), 1024);
    assert_eq!(volume.superblock().inode_size, 256);
    assert_eq!(volume.superblock().volume_name, "imgfs");
    assert_eq!(volume.superblock().descriptor_table_block(), BlockNumber(2));
}

#[test]
fn corrupted_superblock_fails_checksum() {
    let mut img = build_image(0);
    img[1024 + 0x28] ^= 0xFF; // inodes_per_group, covered by the CRC
    let err = Volume::open(Box::new(MemoryByteDevice::new(img))).unwrap_err();
    assert!(matches!(err, Rext4Error::ChecksumMismatch { .. }));
}

#[test]
fn resolve_root_is_inode_two() {
    let volume = open_volume();
    let (ino, inode) = rext4_core::resolve_path(&volume, "/").expect("resolve root");
    assert_eq!(ino, InodeNumber::ROOT);
    assert!(inode.is_dir());
}

// ── Extent mapping ──────────────────────────────────────────────────────────

#[test]
fn single_extent_file_maps_block_zero() {
    let volume = open_volume();
    let inode = volume.read_inode(InodeNumber(INO_ABIN)).unwrap();
    let extent = map_logical_block(&volume, &inode, 0).expect("map block 0");
    assert_eq!(extent.logical_block, 0);
    assert_eq!(extent.len(), 4);
    assert_eq!(extent.physical_start, 10);
}

#[test]
fn depth_one_tree_follows_greatest_lower_index() {
    let volume = open_volume();
    let inode = volume.read_inode(InodeNumber(INO_BIG)).unwrap();

    for logical in 0..2 {
        let extent = map_logical_block(&volume, &inode, logical).expect("first leaf");
        assert_eq!(extent.physical_start, 24);
        assert!(extent.contains(logical));
    }
    for logical in 2..4 {
        let extent = map_logical_block(&volume, &inode, logical).expect("second leaf");
        assert_eq!(extent.physical_start, 30);
        assert!(extent.contains(logical));
    }

    let err = map_logical_block(&volume, &inode, 4).unwrap_err();
    assert!(matches!(err, Rext4Error::OutOfRange { logical_block: 4 }));
}

#[test]
fn uninitialized_extent_is_refused() {
    let volume = open_volume();
    let inode = volume.read_inode(InodeNumber(INO_UNINIT)).unwrap();
    let err = map_logical_block(&volume, &inode, 0).unwrap_err();
    assert!(matches!(err, Rext4Error::NotSupported(_)));

    let mut stream = InodeStream::new(&volume, inode);
    assert!(matches!(
        stream.read(16),
        Err(Rext4Error::NotSupported(_))
    ));
}

// ── Streaming reads ─────────────────────────────────────────────────────────

#[test]
fn full_read_reproduces_file_bytes() {
    let volume = open_volume();
    let inode = volume.read_inode(InodeNumber(INO_ABIN)).unwrap();
    let mut stream = InodeStream::new(&volume, inode);

    let data = stream.read(4096).expect("read file");
    assert_eq!(data.len(), 4096);
    for (i, b) in data.iter().enumerate() {
        assert_eq!(*b, (i % 256) as u8);
    }

    // Reads at end of file are empty.
    assert!(stream.read(1).unwrap().is_empty());
}

#[test]
fn read_is_short_at_extent_boundary() {
    let volume = open_volume();
    let inode = volume.read_inode(InodeNumber(INO_BIG)).unwrap();
    let mut stream = InodeStream::new(&volume, inode);

    stream.seek(2047);
    let chunk = stream.read(10).expect("read at boundary");
    assert_eq!(chunk.len(), 1, "read stops at the extent boundary");
    assert_eq!(stream.offset(), 2048);

    let chunk = stream.read(10).expect("read after boundary");
    assert_eq!(chunk.len(), 10);
    assert_eq!(chunk[0], 0); // first byte of the second run's pattern
}

#[test]
fn multi_extent_read_to_end_concatenates_runs() {
    let volume = open_volume();
    let inode = volume.read_inode(InodeNumber(INO_BIG)).unwrap();
    let data = InodeStream::new(&volume, inode).read_to_end().unwrap();
    assert_eq!(data.len(), 4096);
    for i in 0..2048 {
        assert_eq!(data[i], (i % 251) as u8);
        assert_eq!(data[2048 + i], (i % 241) as u8);
    }
}

#[test]
fn seek_past_end_reads_empty() {
    let volume = open_volume();
    let inode = volume.read_inode(InodeNumber(INO_ABIN)).unwrap();
    let mut stream = InodeStream::new(&volume, inode);
    stream.seek(1 << 40);
    assert!(stream.read(128).unwrap().is_empty());
}

// ── Directory decoding ──────────────────────────────────────────────────────

#[test]
fn root_listing_contains_all_entries() {
    let volume = open_volume();
    let inode = volume.read_inode(InodeNumber::ROOT).unwrap();
    let names: Vec<String> = DirectoryDecoder::new(&volume, inode)
        .unwrap()
        .map(|e| e.unwrap().name_str())
        .collect();
    assert_eq!(
        names,
        [".", "..", "a.bin", "sub", "big.bin", "hdir", "uninit.bin"]
    );
}

#[test]
fn dir_block_rec_lens_sum_to_block_size() {
    let img = build_image(0);
    let entries = parse_dir_block(&img[9 * BLOCK..10 * BLOCK]).unwrap();
    let total: usize = entries.iter().map(|e| usize::from(e.rec_len)).sum();
    assert_eq!(total, BLOCK);
}

#[test]
fn decoder_rejects_non_directory() {
    let volume = open_volume();
    let inode = volume.read_inode(InodeNumber(INO_ABIN)).unwrap();
    assert!(matches!(
        DirectoryDecoder::new(&volume, inode),
        Err(Rext4Error::NotADirectory)
    ));
}

#[test]
fn htree_directory_lists_linearly() {
    let volume = open_volume();
    let inode = volume.read_inode(InodeNumber(INO_HDIR)).unwrap();
    assert!(inode.has_htree_index());
    let names: Vec<String> = DirectoryDecoder::new(&volume, inode)
        .unwrap()
        .map(|e| e.unwrap().name_str())
        .collect();
    assert_eq!(names, [".", "..", "f1", "f2", "f3"]);
}

#[test]
fn htree_indirect_levels_rejected() {
    let img = build_image(1);
    let volume = Volume::open(Box::new(MemoryByteDevice::new(img))).unwrap();
    let inode = volume.read_inode(InodeNumber(INO_HDIR)).unwrap();
    assert!(matches!(
        DirectoryDecoder::new(&volume, inode),
        Err(Rext4Error::NotSupported(_))
    ));
}

// ── Path resolution ─────────────────────────────────────────────────────────

#[test]
fn resolve_nested_file_and_read() {
    let volume = open_volume();
    let (ino, inode) = rext4_core::resolve_path(&volume, "/sub/hello.txt").unwrap();
    assert_eq!(ino, InodeNumber(INO_HELLO));
    let data = InodeStream::new(&volume, inode).read_to_end().unwrap();
    assert_eq!(data, HELLO_CONTENT);
}

#[test]
fn missing_path_is_not_found() {
    let volume = open_volume();
    let err = rext4_core::resolve_path(&volume, "/does/not/exist").unwrap_err();
    assert!(matches!(err, Rext4Error::NotFound(_)));
}

#[test]
fn descending_through_file_is_not_a_directory() {
    let volume = open_volume();
    let err = rext4_core::resolve_path(&volume, "/a.bin/x").unwrap_err();
    assert!(matches!(err, Rext4Error::NotADirectory));
}

// ── FsOps surface ───────────────────────────────────────────────────────────

#[test]
fn getattr_exposes_inode_fields() {
    let fs = open_fs();
    let attr = fs.getattr(InodeNumber(INO_ABIN)).unwrap();
    assert_eq!(attr.size, 4096);
    assert_eq!(attr.uid, 1000);
    assert_eq!(attr.gid, 100);
    assert_eq!(attr.perm, 0o644);
    assert_eq!(attr.blksize, 1024);
    assert_eq!(
        attr.mtime,
        SystemTime::UNIX_EPOCH + Duration::new(1_700_000_200, 250_000_000)
    );
    // atime carries an epoch-extension bit.
    assert_eq!(
        attr.atime,
        SystemTime::UNIX_EPOCH + Duration::new((1_u64 << 32) + 1_700_000_000, 7)
    );
}

#[test]
fn root_attributes_are_a_directory() {
    let fs = open_fs();
    let attr = fs.root_attributes().unwrap();
    assert_eq!(attr.ino, InodeNumber::ROOT);
    assert_eq!(attr.kind, rext4_core::FileKind::Directory);
}

#[test]
fn lookup_finds_child_by_name() {
    let fs = open_fs();
    let attr = fs.lookup(InodeNumber::ROOT, b"sub").unwrap();
    assert_eq!(attr.ino, InodeNumber(INO_SUB));
    assert_eq!(attr.kind, rext4_core::FileKind::Directory);

    let err = fs.lookup(InodeNumber::ROOT, b"nope").unwrap_err();
    assert!(matches!(err, Rext4Error::NotFound(_)));
}

#[test]
fn open_rejects_write_intent() {
    let fs = open_fs();
    assert!(matches!(
        fs.open(InodeNumber(INO_ABIN), true),
        Err(Rext4Error::AccessDenied)
    ));
    assert_eq!(fs.open(InodeNumber(INO_ABIN), false).unwrap(), 0);
}

#[test]
fn windowed_reads_match_file_slices() {
    let fs = open_fs();
    let full = fs.read_file("/big.bin").unwrap();

    let window = fs.read(InodeNumber(INO_BIG), 2000, 100).unwrap();
    assert_eq!(window, &full[2000..2100], "window crossing the extent seam");

    let tail = fs.read(InodeNumber(INO_BIG), 4000, 500).unwrap();
    assert_eq!(tail, &full[4000..], "read truncated at end of file");

    assert!(fs.read(InodeNumber(INO_BIG), 4096, 10).unwrap().is_empty());
}

#[test]
fn readdir_reports_inode_numbers_and_kinds() {
    let fs = open_fs();
    let entries = fs.readdir(InodeNumber::ROOT).unwrap();
    let sub = entries
        .iter()
        .find(|e| e.name == b"sub")
        .expect("sub entry");
    assert_eq!(sub.ino, InodeNumber(INO_SUB));
    assert_eq!(sub.kind, rext4_ondisk::DirEntryKind::Directory);
}
