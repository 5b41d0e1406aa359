//! CRC32C (Castagnoli) metadata checksums.
//!
//! ext4 stores metadata checksums in the form `seed ^ crc32c(bytes)`, where
//! `crc32c` is the standard finalized CRC-32C. With `seed = 0xFFFF_FFFF`
//! this equals the kernel's raw `ext4_chksum(~0, bytes)` value.

use rext4_types::SUPERBLOCK_CHECKSUM_OFFSET;

/// Compute a seeded CRC32C over `prefix` followed by `data`.
///
/// The result is the standard CRC-32C of the concatenation, XORed with the
/// caller-supplied seed.
#[must_use]
pub fn checksum_with_seed(prefix: &[u8], data: &[u8], seed: u32) -> u32 {
    let crc = crc32c::crc32c_append(crc32c::crc32c(prefix), data);
    seed ^ crc
}

/// Compute the expected superblock checksum: CRC32C over everything before
/// the `s_checksum` field, seeded with `0xFFFF_FFFF`.
#[must_use]
pub fn superblock_checksum(region: &[u8]) -> u32 {
    let upto = SUPERBLOCK_CHECKSUM_OFFSET.min(region.len());
    checksum_with_seed(&[], &region[..upto], 0xFFFF_FFFF)
}
