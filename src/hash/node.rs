//! Hash table entry.

use crate::element::Element;
use crate::lock::LockStrategy;
use crate::payload::Payload;
use core::fmt;
use std::sync::Arc;

/// One key/payload entry of a `HashEngine`.
///
/// The full hash is computed once on insert and kept, so moving the entry
/// to a grown table never calls back into `K: Hash`.
pub struct HashNode<K, V> {
    pub(crate) elem: Element,
    key: K,
    hash: u64,
    data: Payload<V>,
}

impl<K, V> HashNode<K, V> {
    pub(crate) fn new(key: K, hash: u64, data: Payload<V>, strategy: LockStrategy) -> Arc<Self> {
        Arc::new(Self {
            elem: Element::new(strategy),
            key,
            hash,
            data,
        })
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn data(&self) -> &V {
        &self.data
    }

    pub fn payload(&self) -> &Payload<V> {
        &self.data
    }

    #[inline]
    pub(crate) fn hash(&self) -> u64 {
        self.hash
    }

    /// Probe steps (open table) or chain position (chained table) at which
    /// the entry currently sits.
    pub fn hops(&self) -> u32 {
        self.elem.hops()
    }

    pub fn is_removed(&self) -> bool {
        self.elem.is_removed()
    }

    pub fn is_destroyed(&self) -> bool {
        self.elem.is_destroyed()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for HashNode<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashNode")
            .field("key", &self.key)
            .field("data", &*self.data)
            .field("hops", &self.hops())
            .finish()
    }
}
