//! OwnershipLock: recursive, thread-owned mutual exclusion.
//!
//! Every container and every node embeds one. The lock remembers which
//! thread owns it and how many times that thread has entered, so nested
//! calls on the same structure never deadlock against themselves.
//!
//! Two switches alter the plain contract:
//! - `destroy()` is one-way. Afterwards `lock`/`try_lock` from threads
//!   that do not already own the lock return immediately, so tearing a
//!   structure down can never wait on itself.
//! - `set_locking(false)` turns exclusion off for callers that know they
//!   are single-threaded. It is only honoured while the caller holds the
//!   lock (or locking is already off).

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use parking_lot::lock_api::RawMutex as _;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Process-unique, non-zero identifier of the calling thread.
pub(crate) fn thread_token() -> u64 {
    THREAD_TOKEN.with(|t| *t)
}

/// How a contended `lock()` waits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LockStrategy {
    /// Park the thread on a `parking_lot` raw mutex.
    #[default]
    Park,
    /// Test-and-set loop that yields between attempts.
    Spin,
}

enum RawLock {
    Park(parking_lot::RawMutex),
    Spin(AtomicBool),
}

impl RawLock {
    fn new(strategy: LockStrategy) -> Self {
        match strategy {
            LockStrategy::Park => RawLock::Park(parking_lot::RawMutex::INIT),
            LockStrategy::Spin => RawLock::Spin(AtomicBool::new(false)),
        }
    }

    fn lock(&self) {
        match self {
            RawLock::Park(m) => m.lock(),
            RawLock::Spin(flag) => loop {
                if flag
                    .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
                while flag.load(Ordering::Relaxed) {
                    std::thread::yield_now();
                }
            },
        }
    }

    fn try_lock(&self) -> bool {
        match self {
            RawLock::Park(m) => m.try_lock(),
            RawLock::Spin(flag) => flag
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok(),
        }
    }

    /// Must only be called by the thread that acquired the raw lock.
    fn unlock(&self) {
        match self {
            // SAFETY: OwnershipLock only releases the raw mutex from the
            // owning thread, after a matching successful lock/try_lock.
            RawLock::Park(m) => unsafe { m.unlock() },
            RawLock::Spin(flag) => flag.store(false, Ordering::Release),
        }
    }
}

/// Recursive lock owned by at most one thread at a time.
pub struct OwnershipLock {
    raw: RawLock,
    owner: AtomicU64,
    count: AtomicU32,
    locking: AtomicBool,
    destroyed: AtomicBool,
    waiting: AtomicU32,
}

impl OwnershipLock {
    pub fn new() -> Self {
        Self::with_strategy(LockStrategy::default())
    }

    pub fn with_strategy(strategy: LockStrategy) -> Self {
        Self {
            raw: RawLock::new(strategy),
            owner: AtomicU64::new(0),
            count: AtomicU32::new(0),
            locking: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
            waiting: AtomicU32::new(0),
        }
    }

    #[inline]
    fn owned_by_me(&self, me: u64) -> bool {
        self.owner.load(Ordering::Acquire) == me
    }

    // Called with the raw lock freshly acquired.
    fn take_ownership(&self, me: u64) -> bool {
        if self.destroyed.load(Ordering::Acquire) || !self.locking.load(Ordering::Acquire) {
            self.raw.unlock();
            return false;
        }
        self.count.store(1, Ordering::Relaxed);
        self.owner.store(me, Ordering::Release);
        true
    }

    /// Block until the calling thread owns the lock.
    pub fn lock(&self) {
        let me = thread_token();
        if self.owned_by_me(me) {
            self.count.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if self.destroyed.load(Ordering::Acquire) || !self.locking.load(Ordering::Acquire) {
            return;
        }
        self.waiting.fetch_add(1, Ordering::Relaxed);
        self.raw.lock();
        self.waiting.fetch_sub(1, Ordering::Relaxed);
        if self.take_ownership(me) {
            tracing::trace!(thread = me, "ownership lock acquired");
        }
    }

    /// Non-blocking `lock`. Returns false only when another thread owns it.
    pub fn try_lock(&self) -> bool {
        let me = thread_token();
        if self.owned_by_me(me) {
            self.count.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        if self.destroyed.load(Ordering::Acquire) || !self.locking.load(Ordering::Acquire) {
            return true;
        }
        if !self.raw.try_lock() {
            return false;
        }
        self.take_ownership(me);
        true
    }

    /// Drop one level of ownership. Calls from non-owners are ignored.
    pub fn unlock(&self) {
        let me = thread_token();
        if !self.owned_by_me(me) {
            return;
        }
        let left = self.count.load(Ordering::Relaxed).saturating_sub(1);
        if left == 0 {
            self.release();
            tracing::trace!(thread = me, "ownership lock released");
        } else {
            self.count.store(left, Ordering::Relaxed);
        }
    }

    // Owner only.
    fn release(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.owner.store(0, Ordering::Release);
        self.raw.unlock();
    }

    /// Release every level the calling thread holds at once.
    ///
    /// Returns false (and does nothing) when the caller is not the owner.
    /// Anything still relying on the released levels loses its protection.
    pub fn clear_locks(&self) -> bool {
        let me = thread_token();
        if !self.owned_by_me(me) {
            return false;
        }
        tracing::debug!(
            thread = me,
            levels = self.count.load(Ordering::Relaxed),
            "clearing all lock levels"
        );
        self.release();
        true
    }

    /// Enable or disable exclusion. Returns whether the change was applied.
    pub fn set_locking(&self, enabled: bool) -> bool {
        let me = thread_token();
        let on = self.locking.load(Ordering::Acquire);
        if on == enabled {
            return true;
        }
        if on {
            if !self.owned_by_me(me) {
                return false;
            }
            self.locking.store(false, Ordering::Release);
            self.release();
        } else {
            self.locking.store(true, Ordering::Release);
        }
        tracing::debug!(enabled, "ownership locking toggled");
        true
    }

    /// Mark the lock destroyed. Irreversible.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn is_locking(&self) -> bool {
        self.locking.load(Ordering::Acquire)
    }

    /// True while any thread owns the lock.
    pub fn is_locked(&self) -> bool {
        self.owner.load(Ordering::Acquire) != 0
    }

    /// Levels held by the calling thread (0 if it is not the owner).
    pub fn lock_count(&self) -> u32 {
        if self.owned_by_me(thread_token()) {
            self.count.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    /// Threads currently blocked in `lock()`.
    pub fn waiting(&self) -> u32 {
        self.waiting.load(Ordering::Relaxed)
    }

    /// Scoped `lock()`.
    pub fn guard(&self) -> LockGuard<'_> {
        self.lock();
        LockGuard { lock: self }
    }

    /// Scoped `try_lock()`.
    pub fn try_guard(&self) -> Option<LockGuard<'_>> {
        self.try_lock().then(|| LockGuard { lock: self })
    }
}

impl Default for OwnershipLock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for OwnershipLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OwnershipLock")
            .field("locked", &self.is_locked())
            .field("locking", &self.is_locking())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// RAII guard returned by `OwnershipLock::guard`.
#[must_use = "the lock is released when the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a OwnershipLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Holds several locks acquired together.
///
/// There is no global order between arbitrary locks, so acquisition tries
/// each one without blocking and backs off completely (releasing what it
/// got, yielding) on the first failure. Participants destroyed while
/// waiting are dropped from the set.
#[must_use = "the locks are released when the guard is dropped"]
pub struct MultiGuard<'a> {
    held: Vec<&'a OwnershipLock>,
}

impl<'a> MultiGuard<'a> {
    /// Acquire every lock, retrying until all are held at once.
    pub fn lock_all(locks: &[&'a OwnershipLock]) -> Self {
        let mut wanted: Vec<&'a OwnershipLock> = locks.to_vec();
        loop {
            if let Some(g) = Self::try_lock_all(&wanted) {
                return g;
            }
            std::thread::yield_now();
            wanted.retain(|l| !l.is_destroyed());
        }
    }

    /// All or nothing: either every lock is taken or none stays held.
    pub fn try_lock_all(locks: &[&'a OwnershipLock]) -> Option<Self> {
        let mut held: Vec<&'a OwnershipLock> = Vec::with_capacity(locks.len());
        for l in locks {
            if !l.try_lock() {
                for h in held.iter().rev() {
                    h.unlock();
                }
                return None;
            }
            held.push(*l);
        }
        Some(MultiGuard { held })
    }
}

impl Drop for MultiGuard<'_> {
    fn drop(&mut self) {
        for l in self.held.iter().rev() {
            l.unlock();
        }
    }
}
