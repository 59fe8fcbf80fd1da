//! Cap on record overwrites within one test run.

use crate::error::{Error, Result};
use crate::store::RecordKey;
use std::sync::atomic::{AtomicU32, Ordering};

/// Counts overwrites and, when enabled, allows only the first one.
///
/// A fixture owns one by default. Share one (`Arc<UpdateGuard>`) between
/// fixtures to apply the cap across a whole test.
#[derive(Debug, Default)]
pub struct UpdateGuard {
    one_per_run: bool,
    updates: AtomicU32,
}

impl UpdateGuard {
    pub const fn new(one_per_run: bool) -> Self {
        Self {
            one_per_run,
            updates: AtomicU32::new(0),
        }
    }

    pub const fn unlimited() -> Self {
        Self::new(false)
    }

    pub const fn one_per_run() -> Self {
        Self::new(true)
    }

    pub fn may_update(&self) -> bool {
        !self.one_per_run || self.updates.load(Ordering::SeqCst) == 0
    }

    /// Counts a completed overwrite.
    pub fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }

    /// Reserves the right to overwrite `key`.
    ///
    /// Under the one-per-run cap the reservation is taken atomically, so two
    /// concurrent calls never both hold it. The reservation counts as the
    /// run's update only once [`UpdateClaim::commit`] is called; dropping the
    /// claim hands it back.
    pub fn claim(&self, key: &RecordKey) -> Result<UpdateClaim<'_>> {
        if !self.one_per_run {
            return Ok(UpdateClaim {
                guard: self,
                reserved: false,
                committed: false,
            });
        }
        if !self.may_update() {
            return Err(Error::UpdateLimit {
                key: key.file_name(),
            });
        }
        self.updates
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| UpdateClaim {
                guard: self,
                reserved: true,
                committed: false,
            })
            .map_err(|_| Error::UpdateLimit {
                key: key.file_name(),
            })
    }

    pub fn update_count(&self) -> u32 {
        self.updates.load(Ordering::SeqCst)
    }
}

/// A pending overwrite; released on drop unless committed.
#[derive(Debug)]
pub struct UpdateClaim<'a> {
    guard: &'a UpdateGuard,
    reserved: bool,
    committed: bool,
}

impl UpdateClaim<'_> {
    /// Marks the overwrite as written.
    pub fn commit(mut self) {
        if !self.reserved {
            self.guard.record_update();
        }
        self.committed = true;
    }
}

impl Drop for UpdateClaim<'_> {
    fn drop(&mut self) {
        if self.reserved && !self.committed {
            self.guard.updates.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
