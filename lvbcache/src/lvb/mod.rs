//! Lock value block (LVB)
//!
//! Responsibilities:
//! - Hold the attributes cached on a lock resource: size, the three
//!   timestamps and the allocated block count of the backing object.
//! - Apply the per-field merge rule used by both the network and the disk
//!   phase of an update.
//! - Carry the init status explicitly instead of packing an errno into
//!   `blocks`; the packed form only exists on the wire (`wire_blocks`).
//!
//! Submodules:
//! - `wire`: decode/encode of the LVB record carried in glimpse replies
pub mod wire;

use log::debug;

use crate::resource::ResId;

/// Sentinel base placed in `blocks` on the wire when init failed.
pub const LVB_ERR_INIT: u64 = 0xffba_dbad_8000_0000;
/// Mask recognizing a sentinel-encoded `blocks` value.
pub const LVB_ERR_MASK: u64 = 0xffba_dbad_0000_0000;

/// Encode a negative errno into the `blocks` wire field.
pub fn lvb_set_err(rc: i32) -> u64 {
    LVB_ERR_INIT.wrapping_add(rc as i64 as u64)
}

pub fn is_lvb_err(blocks: u64) -> bool {
    blocks & LVB_ERR_MASK == LVB_ERR_MASK
}

/// Decode the errno packed by [`lvb_set_err`].
pub fn lvb_err(blocks: u64) -> Option<i32> {
    is_lvb_err(blocks).then(|| blocks.wrapping_sub(LVB_ERR_INIT) as i64 as i32)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LvbStatus {
    #[default]
    Valid,
    /// Init could not find live data; holds the negative errno.
    InitFailed(i32),
}

/// The four attributes subject to the increase-only policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LvbAttrs {
    pub size: u64,
    pub mtime: u64,
    pub atime: u64,
    pub ctime: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lvb {
    pub size: u64,
    pub mtime: u64,
    pub atime: u64,
    pub ctime: u64,
    pub blocks: u64,
    pub status: LvbStatus,
}

impl Lvb {
    pub fn attrs(&self) -> LvbAttrs {
        LvbAttrs {
            size: self.size,
            mtime: self.mtime,
            atime: self.atime,
            ctime: self.ctime,
        }
    }

    pub fn is_err(&self) -> bool {
        matches!(self.status, LvbStatus::InitFailed(_))
    }

    pub(crate) fn set_err(&mut self, rc: i32) {
        self.status = LvbStatus::InitFailed(rc);
    }

    /// `blocks` as sent to clients: the block count, or the error sentinel
    /// if init failed.
    pub fn wire_blocks(&self) -> u64 {
        match self.status {
            LvbStatus::Valid => self.blocks,
            LvbStatus::InitFailed(rc) => lvb_set_err(rc),
        }
    }

    /// Fold `new` into the block field by field.
    ///
    /// A field is written when the candidate is larger, or unconditionally
    /// when `increase_only` is false. Equal values are left alone.
    pub(crate) fn merge(&mut self, res: ResId, new: LvbAttrs, increase_only: bool, from: &str) {
        merge_field(res, "size", from, &mut self.size, new.size, increase_only);
        merge_field(res, "mtime", from, &mut self.mtime, new.mtime, increase_only);
        merge_field(res, "atime", from, &mut self.atime, new.atime, increase_only);
        merge_field(res, "ctime", from, &mut self.ctime, new.ctime, increase_only);
    }

    /// Unconditional sync of the block count from disk.
    pub(crate) fn sync_blocks(&mut self, res: ResId, blocks: u64) {
        if self.blocks != blocks {
            debug!(
                "res: {} updating lvb blocks from disk: {} -> {}",
                res.object_id, self.blocks, blocks
            );
            self.blocks = blocks;
        }
    }
}

fn merge_field(res: ResId, name: &str, from: &str, cur: &mut u64, new: u64, increase_only: bool) {
    if new == *cur {
        return;
    }
    if new > *cur || !increase_only {
        debug!(
            "res: {} updating lvb {}{}: {} -> {}",
            res.object_id, name, from, *cur, new
        );
        *cur = new;
    }
}
