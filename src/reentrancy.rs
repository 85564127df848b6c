//! Debug-only reentrancy guard.
//!
//! Hash tables run user code (`K: Eq`) while holding their table lock.
//! If that code calls back into the same table on the same thread, the
//! table lock would deadlock or observe a half-updated table. In debug
//! builds this guard turns that into an immediate panic. Other threads
//! entering at the same time are unaffected. In release builds it
//! compiles to a no-op.

use core::marker::PhantomData;

#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicU64, Ordering};
#[cfg(debug_assertions)]
use std::cell::RefCell;

#[cfg(debug_assertions)]
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[cfg(debug_assertions)]
thread_local! {
    // Structures the current thread is inside of.
    static ACTIVE: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Per-instance reentrancy tracker. Guard sections that call user code
/// with `let _r = self.reentrancy.enter();`.
#[derive(Debug)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    id: u64,
}

impl DebugReentrancy {
    pub fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Enter a guarded section. In debug builds, panics if the calling
    /// thread is already inside one for this instance.
    #[inline]
    pub fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            let id = self.id;
            let nested = ACTIVE.with(|a| {
                let mut a = a.borrow_mut();
                let nested = a.contains(&id);
                if !nested {
                    a.push(id);
                }
                nested
            });
            assert!(
                !nested,
                "reentrancy detected: nested entry into data structure"
            );
            ReentrancyGuard {
                owner: self,
                _z: PhantomData,
            }
        }

        #[cfg(not(debug_assertions))]
        {
            ReentrancyGuard { _z: PhantomData }
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`.
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    // Leaving must happen on the thread that entered.
    _z: PhantomData<(&'a (), *const ())>,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            let id = self.owner.id;
            ACTIVE.with(|a| {
                let mut a = a.borrow_mut();
                if let Some(pos) = a.iter().rposition(|x| *x == id) {
                    a.remove(pos);
                }
            });
        }
    }
}
