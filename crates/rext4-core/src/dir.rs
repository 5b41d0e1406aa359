//! Directory entry enumeration.

use crate::stream::InodeStream;
use crate::volume::Volume;
use rext4_error::{Result, Rext4Error};
use rext4_ondisk::{DirEntry, Inode, parse_dir_block, parse_htree_root};
use std::collections::VecDeque;
use tracing::trace;

/// Lazy, forward-only iterator over a directory inode's entries.
///
/// Decodes one block at a time from an [`InodeStream`]. Directories with an
/// htree index are still walked linearly: the fake `.`/`..` entries in the
/// root block stride over the index records, and subsequent blocks hold
/// ordinary linear entries. The index itself is never consulted.
pub struct DirectoryDecoder<'v> {
    stream: InodeStream<'v>,
    block_size: usize,
    pending: VecDeque<DirEntry>,
    finished: bool,
}

impl<'v> DirectoryDecoder<'v> {
    /// Start decoding a directory inode.
    ///
    /// Fails `NotADirectory` when the mode lacks the directory bit, and
    /// `NotSupported` when an htree root declares `indirect_levels > 0`
    /// (a multi-level index means the linear layout this decoder relies on
    /// is no longer guaranteed).
    pub fn new(volume: &'v Volume, inode: Inode) -> Result<Self> {
        if !inode.is_dir() {
            return Err(Rext4Error::NotADirectory);
        }

        let block_size = volume.block_size().as_usize();

        if inode.has_htree_index() {
            let mut probe = InodeStream::new(volume, inode.clone());
            let first = probe.read(block_size)?;
            if !first.is_empty() {
                let info = parse_htree_root(&first)?;
                trace!(
                    target: "rext4::dir",
                    hash_version = info.hash_version,
                    indirect_levels = info.indirect_levels,
                    count = info.count,
                    "htree root header skipped"
                );
                if info.indirect_levels > 0 {
                    return Err(Rext4Error::NotSupported("htree with indirect levels"));
                }
            }
        }

        Ok(Self {
            stream: InodeStream::new(volume, inode),
            block_size,
            pending: VecDeque::new(),
            finished: false,
        })
    }
}

impl Iterator for DirectoryDecoder<'_> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(Ok(entry));
            }
            if self.finished {
                return None;
            }

            let block = match self.stream.read(self.block_size) {
                Ok(block) => block,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            };
            if block.is_empty() {
                self.finished = true;
                return None;
            }

            match parse_dir_block(&block) {
                Ok(entries) => self.pending.extend(entries),
                Err(err) => {
                    // A bad rec_len poisons everything after it; stop the
                    // enumeration rather than guessing at a resync point.
                    self.finished = true;
                    return Some(Err(err.into()));
                }
            }
        }
    }
}
