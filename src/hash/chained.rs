//! Separate chaining: each bucket holds the entries hashed to it in insertion
//! order. An entry's hop count is its position in the chain.

use super::index::{index_for, select_method, IndexMethod};
use super::node::HashNode;
use super::{alloc_slots, Placement, Slots};
use crate::error::Result;
use core::borrow::Borrow;
use std::sync::Arc;

pub struct ChainedSlots<K, V> {
    buckets: Vec<Vec<Arc<HashNode<K, V>>>>,
    method: IndexMethod,
}

impl<K, V> ChainedSlots<K, V> {
    #[inline]
    fn bucket(&self, hash: u64) -> usize {
        index_for(hash, self.buckets.len(), self.method)
    }

    /// Longest chain, for diagnostics and tests.
    pub fn longest_chain(&self) -> usize {
        self.buckets.iter().map(Vec::len).max().unwrap_or(0)
    }
}

impl<K, V> Slots<K, V> for ChainedSlots<K, V> {
    const DEFAULT_CAPACITY: usize = 97;
    const DEFAULT_MAX_LOAD: f64 = 3.0;
    const DEFAULT_GROWTH: f64 = 1.25;
    const LOAD_LIMIT: f64 = f64::MAX;

    fn new_table(capacity: usize, fallible: bool) -> Result<Self> {
        Ok(Self {
            buckets: alloc_slots(capacity, fallible, Vec::new)?,
            method: select_method(capacity),
        })
    }

    fn capacity(&self) -> usize {
        self.buckets.len()
    }

    fn index_method(&self) -> IndexMethod {
        self.method
    }

    fn find<Q>(&self, hash: u64, key: &Q) -> Option<&Arc<HashNode<K, V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.buckets[self.bucket(hash)]
            .iter()
            .find(|n| n.hash() == hash && n.key().borrow() == key)
    }

    fn place(&mut self, node: Arc<HashNode<K, V>>) -> Result<Placement> {
        let b = self.bucket(node.hash());
        let chain = &mut self.buckets[b];
        node.elem.set_hops(chain.len() as u32);
        chain.push(node);
        Ok(Placement::default())
    }

    fn take_node(&mut self, node: &Arc<HashNode<K, V>>) -> bool {
        let b = self.bucket(node.hash());
        let chain = &mut self.buckets[b];
        let Some(pos) = chain.iter().position(|n| Arc::ptr_eq(n, node)) else {
            return false;
        };
        chain.remove(pos);
        for (depth, n) in chain.iter().enumerate().skip(pos) {
            n.elem.set_hops(depth as u32);
        }
        true
    }

    fn nodes(&self) -> Vec<Arc<HashNode<K, V>>> {
        self.buckets.iter().flatten().cloned().collect()
    }

    fn first(&self) -> Option<&Arc<HashNode<K, V>>> {
        self.buckets.iter().find_map(|c| c.first())
    }

    fn last(&self) -> Option<&Arc<HashNode<K, V>>> {
        self.buckets.iter().rev().find_map(|c| c.last())
    }
}
