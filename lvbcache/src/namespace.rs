//! Resource table driving the LVB operations.
//!
//! Stands in for the lock manager's resource lookup: a resource is created
//! on first use and initialized right away, glimpses and write completions
//! update it, and eviction frees it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error};

use crate::error::LvbError;
use crate::filter::{LvbOps, UpdateOutcome};
use crate::lvb::Lvb;
use crate::lvb::wire::ReplyBuffers;
use crate::resource::{LockResource, ResId};

pub struct LvbNamespace<O: LvbOps> {
    name: String,
    ops: O,
    resources: Mutex<HashMap<ResId, Arc<LockResource>>>,
}

impl<O: LvbOps> LvbNamespace<O> {
    pub fn new(name: impl Into<String>, ops: O) -> Self {
        Self {
            name: name.into(),
            ops,
            resources: Mutex::new(HashMap::new()),
        }
    }

    pub fn ops(&self) -> &O {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup(&self, id: ResId) -> Option<Arc<LockResource>> {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Find or create the resource. Init runs on every call and is a no-op
    /// once it got a block; a failed init is logged and the resource is
    /// returned anyway, later updates retry the lookup.
    pub async fn resource(&self, id: ResId) -> Arc<LockResource> {
        let res = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_insert_with(|| Arc::new(LockResource::new(id)))
            .clone();
        if let Err(e) = self.ops.init(&res).await {
            error!(
                "{}: lvbo init failed for resource {}: rc {}",
                self.name,
                id,
                e.errno()
            );
        }
        res
    }

    /// Serve a glimpse: refresh from disk, never moving fields backwards,
    /// and return the block to pack into the reply.
    pub async fn glimpse(&self, id: ResId) -> Result<Lvb, LvbError> {
        let res = self.resource(id).await;
        if self.ops.update(&res, None, 0, true).await? == UpdateOutcome::Uninitialized {
            return Err(LvbError::Uninitialized(id));
        }
        res.lvb().await.ok_or(LvbError::Uninitialized(id))
    }

    /// Fold a client's glimpse reply into the resource.
    pub async fn glimpse_reply(
        &self,
        id: ResId,
        reply: &ReplyBuffers,
        buf_idx: usize,
    ) -> Result<UpdateOutcome, LvbError> {
        let res = self.resource(id).await;
        self.ops.update(&res, Some(reply), buf_idx, true).await
    }

    /// Refresh after a local write. Truncates pass `increase_only = false`
    /// so the size may shrink.
    pub async fn write_completed(
        &self,
        id: ResId,
        increase_only: bool,
    ) -> Result<UpdateOutcome, LvbError> {
        let res = self.resource(id).await;
        self.ops.update(&res, None, 0, increase_only).await
    }

    /// Drop the resource and free its block.
    pub async fn evict(&self, id: ResId) -> bool {
        let res = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match res {
            Some(res) => {
                debug!("{}: evicting resource {}", self.name, id);
                self.ops.free(&res).await;
                true
            }
            None => false,
        }
    }

    pub async fn shutdown(&self) {
        let all: Vec<Arc<LockResource>> = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, res)| res)
            .collect();
        for res in all {
            self.ops.free(&res).await;
        }
    }
}
