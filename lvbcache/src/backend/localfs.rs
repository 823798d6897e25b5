//! Local object directory backend.
//!
//! Objects live at `<root>/O/<group>/d<object_id % 32>/<object_id>`. The
//! handle keeps the file open so attributes come from `fstat`, and an
//! unlinked object keeps answering with `nlink == 0`.

use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::fs;

use super::{BackendError, BackingHandle, BackingObject, ObjectAttr, ObjectResolver};
use crate::resource::ResId;

/// Subdirectories per object group.
pub const OBJ_SUBDIR_COUNT: u64 = 32;

pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn group_dir(&self, group: u64) -> PathBuf {
        self.root.join("O").join(group.to_string())
    }

    pub fn path_for(&self, id: ResId) -> PathBuf {
        self.group_dir(id.group)
            .join(format!("d{}", id.object_id % OBJ_SUBDIR_COUNT))
            .join(id.object_id.to_string())
    }

    /// Create an empty object file, with its directories.
    pub async fn create(&self, id: ResId) -> Result<PathBuf, BackendError> {
        let path = self.path_for(id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::File::create(&path).await?;
        Ok(path)
    }
}

struct LocalObject {
    file: fs::File,
}

#[async_trait]
impl BackingObject for LocalObject {
    async fn attr(&self) -> Result<ObjectAttr, BackendError> {
        let md = self.file.metadata().await?;
        Ok(ObjectAttr {
            size: md.size(),
            mtime: md.mtime().max(0) as u64,
            atime: md.atime().max(0) as u64,
            ctime: md.ctime().max(0) as u64,
            blocks: md.blocks(),
            nlink: md.nlink().min(u32::MAX as u64) as u32,
        })
    }
}

#[async_trait]
impl ObjectResolver for LocalFsStore {
    async fn resolve(&self, id: ResId) -> Result<Option<BackingHandle>, BackendError> {
        // an unknown group is a lookup failure, a missing file is not
        match fs::metadata(self.group_dir(id.group)).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(BackendError::NotFound(id)),
            Err(e) => return Err(e.into()),
        }

        let path = self.path_for(id);
        match fs::File::open(&path).await {
            Ok(file) => {
                debug!("resolved object {id} at {}", path.display());
                Ok(Some(BackingHandle::new(Arc::new(LocalObject { file }))))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_localfs_resolve_and_attr() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(tmp.path());
        let id = ResId::new(37, 0);
        let path = store.create(id).await.unwrap();
        assert!(path.ends_with("O/0/d5/37"));

        let mut f = fs::OpenOptions::new().write(true).open(&path).await.unwrap();
        f.write_all(&[1u8; 5000]).await.unwrap();
        f.flush().await.unwrap();

        let h = store.resolve(id).await.unwrap().expect("object exists");
        let attr = h.attr().await.unwrap();
        assert_eq!(attr.size, 5000);
        assert_eq!(attr.nlink, 1);
        assert!(attr.mtime > 0);
    }

    #[tokio::test]
    async fn test_localfs_missing_group_and_object() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(tmp.path());
        let id = ResId::new(1, 9);
        assert!(matches!(
            store.resolve(id).await,
            Err(BackendError::NotFound(_))
        ));

        store.create(ResId::new(2, 9)).await.unwrap();
        assert!(store.resolve(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_localfs_unlink_seen_through_open_handle() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(tmp.path());
        let id = ResId::new(3, 0);
        let path = store.create(id).await.unwrap();
        let h = store.resolve(id).await.unwrap().unwrap();
        fs::remove_file(&path).await.unwrap();
        assert_eq!(h.attr().await.unwrap().nlink, 0);
    }
}
