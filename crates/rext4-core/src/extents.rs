//! Extent-tree traversal: logical block to physical extent.

use crate::volume::Volume;
use rext4_error::{Result, Rext4Error};
use rext4_ondisk::{Extent, ExtentNode, parse_extent_node};
use rext4_types::{BlockNumber, EXTENT_MAGIC, EXTENT_ROOT_SIZE, ParseError};
use std::sync::Arc;
use tracing::trace;

/// Maximum extent-tree depth this walker will follow (the on-disk format
/// never exceeds 5 levels), so a corrupt self-referencing tree terminates.
pub const MAX_EXTENT_DEPTH: u16 = 5;

/// The current node's backing storage during the walk: the 60-byte inline
/// root lives inside the inode record, every deeper node is a device-backed
/// block.
enum NodeSource {
    Inline([u8; EXTENT_ROOT_SIZE]),
    Block(Arc<Vec<u8>>),
}

impl NodeSource {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Inline(bytes) => bytes,
            Self::Block(block) => block,
        }
    }
}

/// Walk an inode's extent tree and return the extent covering
/// `logical_block`.
///
/// Interior levels select the index record with the greatest
/// `logical_block` not exceeding the target (records are sorted ascending
/// on disk). Fails `OutOfRange` when no record covers the target and
/// `NotSupported` when the covering extent carries the uninitialized flag.
pub fn map_logical_block(volume: &Volume, inode: &rext4_ondisk::Inode, logical_block: u32) -> Result<Extent> {
    let mut source = NodeSource::Inline(inode.extent_root);
    let mut expected_depth: Option<u16> = None;

    loop {
        let (header, node) = parse_extent_node(source.as_slice()).map_err(|err| match err {
            ParseError::InvalidMagic { actual, .. } => Rext4Error::BadMagic {
                structure: "extent header",
                expected: u32::from(EXTENT_MAGIC),
                actual,
            },
            other => Rext4Error::Corrupt(other.to_string()),
        })?;

        if header.depth > MAX_EXTENT_DEPTH {
            return Err(Rext4Error::Corrupt(
                "extent tree deeper than the format allows".to_owned(),
            ));
        }
        if let Some(expected) = expected_depth {
            if header.depth != expected {
                return Err(Rext4Error::Corrupt(
                    "child extent node depth inconsistent with parent".to_owned(),
                ));
            }
        }

        match node {
            ExtentNode::Leaf(extents) => {
                for ext in extents {
                    if ext.contains(logical_block) {
                        if ext.is_uninitialized() {
                            return Err(Rext4Error::NotSupported("uninitialized extent"));
                        }
                        return Ok(ext);
                    }
                }
                return Err(Rext4Error::OutOfRange { logical_block });
            }
            ExtentNode::Index(indexes) => {
                // Records are ordered by ascending logical block; take the
                // last one at or below the target.
                let mut chosen = None;
                for idx in &indexes {
                    if idx.logical_block <= logical_block {
                        chosen = Some(idx);
                    } else {
                        break;
                    }
                }
                let Some(idx) = chosen else {
                    return Err(Rext4Error::OutOfRange { logical_block });
                };

                trace!(
                    target: "rext4::extents",
                    logical_block,
                    child = idx.leaf_block,
                    depth = header.depth,
                    "descending extent index"
                );
                source = NodeSource::Block(volume.blocks().read_block(BlockNumber(idx.leaf_block))?);
                expected_depth = Some(header.depth - 1);
            }
        }
    }
}
