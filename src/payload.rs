//! Shared payload handles.
//!
//! A payload may be referenced by several nodes at once (see
//! `HashEngine::insert_copy`). The optional destroy hook runs exactly once,
//! when the last handle goes away.

use core::fmt;
use core::ops::Deref;
use std::sync::Arc;

/// Custom payload destruction, run on the last reference.
pub type DestroyFn<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

struct Shared<T> {
    value: T,
    on_destroy: Option<DestroyFn<T>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(hook) = self.on_destroy.take() {
            hook(&mut self.value);
        }
    }
}

/// Reference-counted payload stored by every node.
pub struct Payload<T>(Arc<Shared<T>>);

impl<T> Payload<T> {
    pub fn new(value: T) -> Self {
        Payload(Arc::new(Shared {
            value,
            on_destroy: None,
        }))
    }

    pub fn with_destroy(value: T, on_destroy: DestroyFn<T>) -> Self {
        Payload(Arc::new(Shared {
            value,
            on_destroy: Some(on_destroy),
        }))
    }

    pub(crate) fn wrap(value: T, on_destroy: Option<&DestroyFn<T>>) -> Self {
        match on_destroy {
            Some(f) => Self::with_destroy(value, Arc::clone(f)),
            None => Self::new(value),
        }
    }

    /// True if both handles refer to the same payload.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Number of live handles (nodes and callers) sharing this payload.
    pub fn ref_count(this: &Self) -> usize {
        Arc::strong_count(&this.0)
    }
}

impl<T> Clone for Payload<T> {
    fn clone(&self) -> Self {
        Payload(Arc::clone(&self.0))
    }
}

impl<T> Deref for Payload<T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        &self.0.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Payload<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0.value, f)
    }
}

impl<T: PartialEq> PartialEq for Payload<T> {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Invariant: the destroy hook fires once, after the last clone drops.
    #[test]
    fn destroy_hook_runs_on_last_reference() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let p = Payload::with_destroy(
            7u32,
            Arc::new(move |v: &mut u32| {
                assert_eq!(*v, 7);
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let q = p.clone();
        assert!(Payload::ptr_eq(&p, &q));
        assert_eq!(Payload::ref_count(&p), 2);
        drop(p);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        drop(q);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
