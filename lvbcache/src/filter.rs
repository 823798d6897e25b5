//! LVB operations of a storage target.
//!
//! The lock manager calls these through [`LvbOps`]:
//! - `init` when a resource is created, before the first glimpse reply,
//! - `update` after a glimpse callback (with the client's reply) and after
//!   local writes (without one),
//! - `free` when the resource is destroyed.
//!
//! `update` runs in two phases under the resource mutex. The network phase
//! folds in the reply, if one is given and decodes. The disk phase always
//! runs afterwards and revalidates the backing object; it is the last word
//! on every field, subject to the increase-only policy for size and times.
//! `blocks` always follows the disk.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, warn};

use crate::accounting::MemAccounting;
use crate::backend::{BackingHandle, ObjectResolver};
use crate::error::LvbError;
use crate::lvb::wire::{LVB_WIRE_LEN, ReplyBuffers, decode_lvb};
use crate::lvb::{Lvb, LvbStatus};
use crate::resource::{LockResource, LvbSlot, ResId};

/// Bytes charged to the accounting per cached block.
pub const LVB_ALLOC_SIZE: u64 = LVB_WIRE_LEN as u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// Nothing to update: the resource never got a block. The caller most
    /// likely raced init; this is not reported as an error.
    Uninitialized,
}

#[async_trait]
pub trait LvbOps: Send + Sync {
    async fn init(&self, res: &LockResource) -> Result<(), LvbError>;

    async fn update(
        &self,
        res: &LockResource,
        reply: Option<&ReplyBuffers>,
        buf_idx: usize,
        increase_only: bool,
    ) -> Result<UpdateOutcome, LvbError>;

    async fn free(&self, res: &LockResource);
}

/// LVB operations backed by an object store.
pub struct FilterLvb<R: ObjectResolver> {
    name: String,
    resolver: R,
    acct: Arc<MemAccounting>,
}

impl<R: ObjectResolver> FilterLvb<R> {
    pub fn new(name: impl Into<String>, resolver: R, acct: Arc<MemAccounting>) -> Self {
        Self {
            name: name.into(),
            resolver,
            acct,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn accounting(&self) -> &Arc<MemAccounting> {
        &self.acct
    }

    /// Init with the resource mutex already held.
    ///
    /// The block is attached before the lookup and stays attached whatever
    /// the lookup returns; only `free` detaches it.
    pub async fn init_locked(&self, id: ResId, slot: &mut LvbSlot) -> Result<(), LvbError> {
        if slot.lvb.is_some() {
            return Ok(());
        }
        self.acct.alloc(LVB_ALLOC_SIZE)?;

        let LvbSlot { lvb, handle } = slot;
        let lvb = lvb.insert(Lvb::default());

        debug!(
            "{}: lvbo init (group={}, object={})",
            self.name, id.group, id.object_id
        );

        let found = match self.resolver.resolve(id).await {
            Ok(found) => found,
            Err(e) => {
                error!("{}: bad object {}: {}", self.name, id, e);
                return Err(LvbError::Resolution { res: id, source: e });
            }
        };
        let Some(found) = found else {
            lvb.set_err(-libc::ENOENT);
            return Err(LvbError::NotExist(id));
        };
        let attr = match found.attr().await {
            Ok(attr) => attr,
            Err(e) => {
                error!("{}: cannot read object {}: {}", self.name, id, e);
                lvb.set_err(e.errno());
                return Err(LvbError::Resolution { res: id, source: e });
            }
        };

        lvb.size = attr.size;
        lvb.mtime = attr.mtime;
        lvb.atime = attr.atime;
        lvb.ctime = attr.ctime;
        lvb.blocks = attr.blocks;
        debug!(
            "res: {} initial lvb size: {}, mtime: {}, blocks: {}",
            id.object_id, lvb.size, lvb.mtime, lvb.blocks
        );

        *handle = Some(found);
        Ok(())
    }

    async fn disk_update(
        &self,
        id: ResId,
        lvb: &mut Lvb,
        handle: &mut Option<BackingHandle>,
        increase_only: bool,
    ) -> Result<UpdateOutcome, LvbError> {
        // init may have failed to resolve the object
        if handle.is_none() {
            *handle = self
                .resolver
                .resolve(id)
                .await
                .map_err(|e| LvbError::Resolution { res: id, source: e })?;
        }
        let Some(obj) = handle.as_ref() else {
            return Err(LvbError::Stale(id));
        };
        let attr = obj
            .attr()
            .await
            .map_err(|e| LvbError::Resolution { res: id, source: e })?;

        if attr.nlink == 0 {
            warn!("{}: object {} has been unlinked", self.name, id);
            if let Some(h) = handle.take() {
                h.release();
            }
            return Err(LvbError::Stale(id));
        }

        lvb.merge(id, attr.lvb_attrs(), increase_only, " from disk");
        lvb.sync_blocks(id, attr.blocks);
        if lvb.is_err() {
            debug!("res: {} lvb backed by live object again", id.object_id);
            lvb.status = LvbStatus::Valid;
        }
        Ok(UpdateOutcome::Updated)
    }
}

#[async_trait]
impl<R: ObjectResolver> LvbOps for FilterLvb<R> {
    async fn init(&self, res: &LockResource) -> Result<(), LvbError> {
        let mut slot = res.lock().await;
        self.init_locked(res.id(), &mut slot).await
    }

    async fn update(
        &self,
        res: &LockResource,
        reply: Option<&ReplyBuffers>,
        buf_idx: usize,
        increase_only: bool,
    ) -> Result<UpdateOutcome, LvbError> {
        let id = res.id();
        let mut slot = res.lock().await;
        let LvbSlot { lvb, handle } = &mut *slot;
        let Some(lvb) = lvb.as_mut() else {
            error!("{}: no lvb when running lvbo update on {}", self.name, id);
            return Ok(UpdateOutcome::Uninitialized);
        };

        if let Some(reply) = reply {
            match decode_lvb(reply, buf_idx) {
                Ok(new) => lvb.merge(id, new, increase_only, ""),
                Err(e) => error!("{}: res {}: bad lvb in reply: {}", self.name, id, e),
            }
        }

        self.disk_update(id, lvb, handle, increase_only).await
    }

    async fn free(&self, res: &LockResource) {
        let mut slot = res.lock().await;
        if let Some(h) = slot.handle.take() {
            h.release();
        }
        if slot.lvb.take().is_some() {
            self.acct.free(LVB_ALLOC_SIZE);
        }
    }
}
