//! Allocation accounting for cached blocks.
//!
//! One `MemAccounting` is created per target and shared by its LVB
//! operations. It tracks bytes in use and the high-water mark, optionally
//! refuses allocations past a limit, and reports leaks on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

use log::{error, info};

use crate::error::LvbError;

#[derive(Debug, Default)]
pub struct MemAccounting {
    in_use: AtomicU64,
    max: AtomicU64,
    limit: Option<u64>,
}

/// Snapshot returned by [`MemAccounting::report`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemReport {
    pub max: u64,
    pub leaked: u64,
}

impl MemAccounting {
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Charge `size` bytes, failing if that would pass the limit.
    pub fn alloc(&self, size: u64) -> Result<(), LvbError> {
        let mut cur = self.in_use.load(Ordering::Relaxed);
        loop {
            let next = cur.saturating_add(size);
            if let Some(limit) = self.limit {
                if next > limit {
                    return Err(LvbError::Allocation {
                        requested: size,
                        in_use: cur,
                        limit,
                    });
                }
            }
            match self
                .in_use
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    self.max.fetch_max(next, Ordering::Relaxed);
                    return Ok(());
                }
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn free(&self, size: u64) {
        let _ = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(size))
            });
    }

    pub fn in_use(&self) -> u64 {
        self.in_use.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Log the high-water mark and whatever is still charged.
    pub fn report(&self, target: &str) -> MemReport {
        let report = MemReport {
            max: self.max(),
            leaked: self.in_use(),
        };
        if report.leaked > 0 {
            error!(
                "{target}: lvb mem max: {} leaked: {}",
                report.max, report.leaked
            );
        } else {
            info!(
                "{target}: lvb mem max: {} leaked: {}",
                report.max, report.leaked
            );
        }
        report
    }
}
