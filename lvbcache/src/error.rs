use thiserror::Error;

use crate::backend::BackendError;
use crate::resource::ResId;

/// Errors surfaced to the lock manager by the LVB operations.
///
/// Decode failures of a network reply never show up here: they are logged
/// and the merge falls through to the disk phase.
#[derive(Error, Debug)]
pub enum LvbError {
    #[error("bad object {res}: {source}")]
    Resolution {
        res: ResId,
        #[source]
        source: BackendError,
    },

    #[error("object {0} has no live data")]
    NotExist(ResId),

    #[error("object {0} is stale (unresolved or unlinked)")]
    Stale(ResId),

    #[error("cannot allocate {requested} bytes ({in_use} in use, limit {limit})")]
    Allocation {
        requested: u64,
        in_use: u64,
        limit: u64,
    },

    #[error("resource {0} has no lock value block")]
    Uninitialized(ResId),
}

impl LvbError {
    /// Negative errno understood by the lock manager's status codes.
    pub fn errno(&self) -> i32 {
        match self {
            LvbError::Resolution { source, .. } => source.errno(),
            LvbError::NotExist(_) | LvbError::Stale(_) => -libc::ENOENT,
            LvbError::Allocation { .. } => -libc::ENOMEM,
            LvbError::Uninitialized(_) => -libc::EINVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        let res = ResId::new(7, 0);
        assert_eq!(LvbError::Stale(res).errno(), -libc::ENOENT);
        assert_eq!(LvbError::NotExist(res).errno(), -libc::ENOENT);
        let alloc = LvbError::Allocation {
            requested: 40,
            in_use: 100,
            limit: 128,
        };
        assert_eq!(alloc.errno(), -libc::ENOMEM);
        let bad = LvbError::Resolution {
            res,
            source: BackendError::NotFound(res),
        };
        assert_eq!(bad.errno(), -libc::ENOENT);
        assert!(bad.to_string().contains("bad object"));
    }
}
