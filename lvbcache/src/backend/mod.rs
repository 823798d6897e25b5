//! Backing object resolution
//!
//! Responsibilities:
//! - Map a resource name to a live backing object (`ObjectResolver`).
//! - Hand out reference-counted handles that must be revalidated on every
//!   use: the object can be unlinked while a handle is held, which shows up
//!   as `nlink == 0` in its attributes.
//!
//! Submodules:
//! - `memory`: in-memory object table for development and tests
//! - `localfs`: objects stored as files in a local object directory
pub mod localfs;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::lvb::LvbAttrs;
use crate::resource::ResId;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("object {0} not found")]
    NotFound(ResId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn errno(&self) -> i32 {
        match self {
            BackendError::NotFound(_) => -libc::ENOENT,
            BackendError::Io(e) => -e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Attributes of a backing object at the time of the read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectAttr {
    pub size: u64,
    pub mtime: u64,
    pub atime: u64,
    pub ctime: u64,
    pub blocks: u64,
    pub nlink: u32,
}

impl ObjectAttr {
    pub fn lvb_attrs(&self) -> LvbAttrs {
        LvbAttrs {
            size: self.size,
            mtime: self.mtime,
            atime: self.atime,
            ctime: self.ctime,
        }
    }
}

#[async_trait]
pub trait BackingObject: Send + Sync {
    async fn attr(&self) -> Result<ObjectAttr, BackendError>;
}

/// Held reference to a resolved backing object.
///
/// Dropping the handle releases the reference; `release` does the same
/// explicitly.
#[derive(Clone)]
pub struct BackingHandle {
    obj: Arc<dyn BackingObject>,
}

impl BackingHandle {
    pub fn new(obj: Arc<dyn BackingObject>) -> Self {
        Self { obj }
    }

    pub async fn attr(&self) -> Result<ObjectAttr, BackendError> {
        self.obj.attr().await
    }

    pub fn release(self) {
        drop(self.obj);
    }
}

impl fmt::Debug for BackingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackingHandle")
            .field("refs", &Arc::strong_count(&self.obj))
            .finish()
    }
}

/// Lookup of backing objects by resource name.
#[async_trait]
pub trait ObjectResolver: Send + Sync {
    /// `Err` when the object cannot be looked up at all, `Ok(None)` when the
    /// lookup succeeds but finds no live object.
    async fn resolve(&self, id: ResId) -> Result<Option<BackingHandle>, BackendError>;
}

#[async_trait]
impl<R: ObjectResolver + ?Sized> ObjectResolver for Arc<R> {
    async fn resolve(&self, id: ResId) -> Result<Option<BackingHandle>, BackendError> {
        (**self).resolve(id).await
    }
}
