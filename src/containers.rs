//! Thin containers over `LinkedEngine`.

use crate::double_node::DoubleNode;
use crate::error::{Error, Result};
use crate::linked::{Closure, Iter, LinkedEngine, ListConfig};
use crate::lock::MultiGuard;
use crate::payload::Payload;
use core::ops::Deref;
use std::sync::Arc;

macro_rules! engine_wrapper {
    ($(#[$meta:meta])* $name:ident, $closure:expr) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name<T>(LinkedEngine<T>);

        impl<T> $name<T> {
            pub fn new() -> Self {
                Self(LinkedEngine::new($closure))
            }

            pub fn with_config(config: ListConfig<T>) -> Self {
                Self(LinkedEngine::with_config($closure, config))
            }
        }

        impl<T> Default for $name<T> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<T> Deref for $name<T> {
            type Target = LinkedEngine<T>;
            fn deref(&self) -> &LinkedEngine<T> {
                &self.0
            }
        }
    };
}

engine_wrapper!(
    /// Doubly linked list with open ends.
    DoubleList,
    Closure::Linear
);

engine_wrapper!(
    /// Doubly linked ring: the tail's successor is the head.
    DoubleRing,
    Closure::Ring
);

/// FIFO queue: push at the back, pop at the front.
#[derive(Debug)]
pub struct Queue<T>(LinkedEngine<T>);

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self(LinkedEngine::new(Closure::Linear))
    }

    pub fn with_config(config: ListConfig<T>) -> Self {
        Self(LinkedEngine::with_config(Closure::Linear, config))
    }

    pub fn push(&self, data: T) -> Result<()> {
        self.0.push_back(data).map(|_| ())
    }

    pub fn pop(&self) -> Option<Payload<T>> {
        self.0.pop_front()
    }

    /// Next payload `pop` would return.
    pub fn peek(&self) -> Option<Payload<T>> {
        self.0.head().map(|n| n.payload().clone())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&self) {
        self.0.clear()
    }

    pub fn iter(&self) -> Iter<T> {
        self.0.iter()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// LIFO stack: push and pop at the front.
#[derive(Debug)]
pub struct Stack<T>(LinkedEngine<T>);

impl<T> Stack<T> {
    pub fn new() -> Self {
        Self(LinkedEngine::new(Closure::Linear))
    }

    pub fn with_config(config: ListConfig<T>) -> Self {
        Self(LinkedEngine::with_config(Closure::Linear, config))
    }

    pub fn push(&self, data: T) -> Result<()> {
        self.0.push_front(data).map(|_| ())
    }

    pub fn pop(&self) -> Option<Payload<T>> {
        self.0.pop_front()
    }

    pub fn top(&self) -> Option<Payload<T>> {
        self.0.head().map(|n| n.payload().clone())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&self) {
        self.0.clear()
    }

    pub fn iter(&self) -> Iter<T> {
        self.0.iter()
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Linked set: a list that holds each value at most once.
///
/// Set algebra shares payloads with the operands instead of cloning values.
#[derive(Debug)]
pub struct Set<T>(LinkedEngine<T>);

impl<T: PartialEq> Set<T> {
    pub fn new() -> Self {
        Self(LinkedEngine::new(Closure::Linear))
    }

    pub fn with_config(config: ListConfig<T>) -> Self {
        Self(LinkedEngine::with_config(Closure::Linear, config))
    }

    /// Add `data`; fails with `DuplicateKey` if an equal value is present.
    pub fn insert(&self, data: T) -> Result<Arc<DoubleNode<T>>> {
        let _g = self.0.lock().guard();
        if self.0.contains(&data) {
            return Err(Error::DuplicateKey);
        }
        self.0.push_back(data)
    }

    fn insert_payload(&self, payload: Payload<T>) -> Result<()> {
        let _g = self.0.lock().guard();
        if self.0.contains(&payload) {
            return Err(Error::DuplicateKey);
        }
        self.0.push_back_payload(payload).map(|_| ())
    }

    pub fn has_member(&self, data: &T) -> bool {
        self.0.contains(data)
    }

    pub fn remove(&self, data: &T) -> Result<Payload<T>> {
        self.0.remove_data(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&self) {
        self.0.clear()
    }

    pub fn iter(&self) -> Iter<T> {
        self.0.iter()
    }

    // Snapshot both sets while holding both container locks.
    fn snapshot_pair(&self, other: &Self) -> (Vec<Payload<T>>, Vec<Payload<T>>) {
        let _both = MultiGuard::lock_all(&[self.0.lock(), other.0.lock()]);
        let mine = self.0.iter().map(|n| n.payload().clone()).collect();
        let theirs = other.0.iter().map(|n| n.payload().clone()).collect();
        (mine, theirs)
    }

    /// Every member of `self` is also a member of `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        let (mine, theirs) = self.snapshot_pair(other);
        mine.iter().all(|p| theirs.contains(p))
    }

    pub fn union(&self, other: &Self) -> Self {
        let (mine, theirs) = self.snapshot_pair(other);
        let out = Self::new();
        for p in mine.into_iter().chain(theirs) {
            // Duplicates are expected here and simply skipped.
            let _ = out.insert_payload(p);
        }
        out
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let (mine, theirs) = self.snapshot_pair(other);
        let out = Self::new();
        for p in mine.into_iter().filter(|p| theirs.contains(p)) {
            let _ = out.insert_payload(p);
        }
        out
    }

    /// Members of `self` that are not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        let (mine, theirs) = self.snapshot_pair(other);
        let out = Self::new();
        for p in mine.into_iter().filter(|p| !theirs.contains(p)) {
            let _ = out.insert_payload(p);
        }
        out
    }
}

impl<T: PartialEq> Default for Set<T> {
    fn default() -> Self {
        Self::new()
    }
}
