//! Lock resource as seen by the LVB operations.
//!
//! The lock manager owns the resource; this crate only cares about its
//! identity and the slot that carries the cached block and the backing
//! handle. Everything in the slot is reached through the resource mutex.

use std::fmt;

use tokio::sync::{Mutex, MutexGuard};

use crate::backend::BackingHandle;
use crate::lvb::Lvb;

/// Resource name: object id plus object group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResId {
    pub object_id: u64,
    pub group: u64,
}

impl ResId {
    pub fn new(object_id: u64, group: u64) -> Self {
        Self { object_id, group }
    }
}

impl fmt::Display for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_id, self.group)
    }
}

/// State guarded by the resource mutex.
#[derive(Default)]
pub struct LvbSlot {
    pub(crate) lvb: Option<Lvb>,
    pub(crate) handle: Option<BackingHandle>,
}

impl LvbSlot {
    pub fn lvb(&self) -> Option<&Lvb> {
        self.lvb.as_ref()
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }
}

pub struct LockResource {
    id: ResId,
    slot: Mutex<LvbSlot>,
}

impl LockResource {
    pub fn new(id: ResId) -> Self {
        Self {
            id,
            slot: Mutex::new(LvbSlot::default()),
        }
    }

    pub fn id(&self) -> ResId {
        self.id
    }

    /// Take the resource mutex. Init and merge run with this guard held.
    pub async fn lock(&self) -> MutexGuard<'_, LvbSlot> {
        self.slot.lock().await
    }

    /// Copy of the cached block, for packing into an outgoing glimpse reply.
    pub async fn lvb(&self) -> Option<Lvb> {
        self.slot.lock().await.lvb
    }

    /// Whether a backing handle is currently held.
    pub async fn has_handle(&self) -> bool {
        self.slot.lock().await.handle.is_some()
    }
}

impl fmt::Debug for LockResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockResource").field("id", &self.id).finish()
    }
}
