//! In-memory object table: used for local development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{BackendError, BackingHandle, BackingObject, ObjectAttr, ObjectResolver};
use crate::resource::ResId;

pub struct MemObject {
    attr: Mutex<ObjectAttr>,
    read_delay: Option<Duration>,
}

impl MemObject {
    pub fn attr_now(&self) -> ObjectAttr {
        *self.attr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_attr(&self, attr: ObjectAttr) {
        *self.attr.lock().unwrap_or_else(PoisonError::into_inner) = attr;
    }

    pub fn update(&self, f: impl FnOnce(&mut ObjectAttr)) {
        f(&mut self.attr.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

#[async_trait]
impl BackingObject for MemObject {
    async fn attr(&self) -> Result<ObjectAttr, BackendError> {
        if let Some(d) = self.read_delay {
            tokio::time::sleep(d).await;
        }
        Ok(self.attr_now())
    }
}

enum Entry {
    Live(Arc<MemObject>),
    // the name resolves but nothing lives behind it
    Negative,
}

/// Object table keyed by resource name.
#[derive(Default)]
pub struct MemObjectStore {
    objects: Mutex<HashMap<ResId, Entry>>,
    lookups: AtomicUsize,
    read_delay: Option<Duration>,
}

impl MemObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attribute read sleeps for `delay` first.
    pub fn with_read_delay(delay: Duration) -> Self {
        Self {
            read_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn insert(&self, id: ResId, attr: ObjectAttr) -> Arc<MemObject> {
        let obj = Arc::new(MemObject {
            attr: Mutex::new(attr),
            read_delay: self.read_delay,
        });
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Entry::Live(obj.clone()));
        obj
    }

    pub fn insert_negative(&self, id: ResId) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Entry::Negative);
    }

    /// Drop the last link: held handles see `nlink == 0`, new lookups find
    /// nothing live.
    pub fn unlink(&self, id: ResId) -> bool {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        match objects.insert(id, Entry::Negative) {
            Some(Entry::Live(obj)) => {
                obj.update(|a| a.nlink = 0);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, id: ResId) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    pub fn get(&self, id: ResId) -> Option<Arc<MemObject>> {
        match self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            Some(Entry::Live(obj)) => Some(obj.clone()),
            _ => None,
        }
    }

    /// Number of `resolve` calls served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ObjectResolver for MemObjectStore {
    async fn resolve(&self, id: ResId) -> Result<Option<BackingHandle>, BackendError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        match objects.get(&id) {
            None => Err(BackendError::NotFound(id)),
            Some(Entry::Negative) => Ok(None),
            Some(Entry::Live(obj)) => {
                let obj: Arc<dyn BackingObject> = obj.clone();
                Ok(Some(BackingHandle::new(obj)))
            }
        }
    }
}
