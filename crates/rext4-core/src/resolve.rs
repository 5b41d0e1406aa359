//! Path resolution from the root inode.

use crate::dir::DirectoryDecoder;
use crate::volume::Volume;
use rext4_error::{Result, Rext4Error};
use rext4_ondisk::Inode;
use rext4_types::InodeNumber;

/// Walk a `/`-separated path from the root inode (2) to its target.
///
/// Empty segments (leading slash, doubled slashes, trailing slash) are
/// discarded. Name comparison is byte-for-byte; no normalization, no case
/// folding. Fails `NotFound` for an absent segment and `NotADirectory` when
/// descending through a non-directory.
pub fn resolve_path(volume: &Volume, path: &str) -> Result<(InodeNumber, Inode)> {
    let mut ino = InodeNumber::ROOT;
    let mut inode = volume.read_inode(ino)?;

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !inode.is_dir() {
            return Err(Rext4Error::NotADirectory);
        }

        let mut next = None;
        for entry in DirectoryDecoder::new(volume, inode.clone())? {
            let entry = entry?;
            if entry.name == segment.as_bytes() {
                next = Some(entry.inode);
                break;
            }
        }

        let Some(child) = next else {
            return Err(Rext4Error::NotFound(format!("{segment} (resolving {path})")));
        };
        ino = InodeNumber(child);
        inode = volume.read_inode(ino)?;
    }

    Ok((ino, inode))
}
