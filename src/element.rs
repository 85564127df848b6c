//! State shared by every node kind: its lock, position number, removal
//! flag and probe distance.

use crate::lock::{LockStrategy, OwnershipLock};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

#[derive(Debug)]
pub(crate) struct Element {
    pub(crate) lock: OwnershipLock,
    nr: AtomicUsize,
    removed: AtomicBool,
    hops: AtomicU32,
}

impl Element {
    /// New elements count as removed until they are first linked.
    pub(crate) fn new(strategy: LockStrategy) -> Self {
        Self {
            lock: OwnershipLock::with_strategy(strategy),
            nr: AtomicUsize::new(0),
            removed: AtomicBool::new(true),
            hops: AtomicU32::new(0),
        }
    }

    #[inline]
    pub(crate) fn nr(&self) -> usize {
        self.nr.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_nr(&self, nr: usize) {
        self.nr.store(nr, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_removed(&self, removed: bool) {
        self.removed.store(removed, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_destroyed(&self) -> bool {
        self.lock.is_destroyed()
    }

    /// Flag the element as discarded by its container.
    pub(crate) fn destroy(&self) {
        self.set_removed(true);
        self.lock.destroy();
    }

    #[inline]
    pub(crate) fn hops(&self) -> u32 {
        self.hops.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_hops(&self, hops: u32) {
        self.hops.store(hops, Ordering::Relaxed);
    }
}
