//! Double buffer of world-frame scans.
//!
//! Two physical buffers exist for the whole session. One is written by the decoder,
//! the other holds the last finished revolution. A revolution boundary only swaps
//! which buffer plays which role; data is never copied between them.

use crossbeam_utils::atomic::AtomicCell;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use sweep_data::{Pose, Scan};

pub struct ScanStore {
    buffers: [Mutex<Scan>; 2],
    acquiring: AtomicCell<usize>,
}

/// Read access to the last finished scan.
///
/// The decoder never writes a buffer while a reader holds it, so the content is
/// stable for the lifetime of the guard. Hold it shorter than one revolution:
/// samples arriving for a held buffer are dropped.
pub struct FinishedScan<'a> {
    guard: MutexGuard<'a, Scan>,
}

impl Deref for FinishedScan<'_> {
    type Target = Scan;
    fn deref(&self) -> &Scan {
        &self.guard
    }
}

fn try_lock(buffer: &Mutex<Scan>) -> Option<MutexGuard<'_, Scan>> {
    match buffer.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

impl ScanStore {
    pub fn new() -> ScanStore {
        ScanStore {
            buffers: [Mutex::new(Scan::new()), Mutex::new(Scan::new())],
            acquiring: AtomicCell::new(0),
        }
    }

    fn acquiring_index(&self) -> usize {
        self.acquiring.load()
    }

    fn finished_index(&self) -> usize {
        1 - self.acquiring.load()
    }

    /// Runs `f` on the buffer being acquired. Returns `None`, without waiting, when
    /// a reader still holds that buffer.
    pub(crate) fn with_acquiring<R>(&self, f: impl FnOnce(&mut Scan) -> R) -> Option<R> {
        let mut guard = try_lock(&self.buffers[self.acquiring_index()])?;
        Some(f(&mut guard))
    }

    /// Runs `f` on the last finished buffer, unless a reader holds it.
    pub(crate) fn with_finished<R>(&self, f: impl FnOnce(&mut Scan) -> R) -> Option<R> {
        let mut guard = try_lock(&self.buffers[self.finished_index()])?;
        Some(f(&mut guard))
    }

    /// Closes the current revolution at `pose` and starts revolution `next_id`.
    pub(crate) fn swap(&self, pose: Pose, next_id: u32) {
        if self.with_acquiring(|scan| scan.pose_at_end = pose).is_none() {
            log::debug!("Scan buffer held by a reader, end pose dropped");
        }
        self.acquiring.store(self.finished_index());
        let started = self.with_acquiring(|scan| {
            scan.pose_at_start = pose;
            scan.id = next_id;
        });
        if started.is_none() {
            log::debug!("Scan buffer held by a reader, start pose dropped");
        }
    }

    /// Takes the buffer that currently holds the finished role.
    ///
    /// If the roles swap while the lock is being taken, the new finished buffer is
    /// taken instead, so the guard never covers a buffer under acquisition.
    pub fn finished_scan(&self) -> FinishedScan<'_> {
        loop {
            let idx = self.finished_index();
            let guard = self.buffers[idx]
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if idx == self.finished_index() {
                return FinishedScan { guard };
            }
        }
    }

    /// Owned copy of the last finished scan.
    pub fn snapshot(&self) -> Scan {
        self.finished_scan().clone()
    }
}

impl Default for ScanStore {
    fn default() -> Self {
        ScanStore::new()
    }
}
