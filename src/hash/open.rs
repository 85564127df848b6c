//! Open addressing with Robin Hood displacement.
//!
//! Probing starts at a multiplicative base index and advances by a
//! per-key stepping that is coprime to the table size. A removed entry
//! leaves `Vacated` behind, not `Empty`, so probe sequences that passed
//! over it stay intact; lookups skip vacated slots and stop at the first
//! empty one.
//!
//! While placing an entry that has already taken `h > 1` steps, a resident
//! with fewer than `h - 1` hops gives up its slot and is placed again from
//! its own base. Evictions per placement are capped at the table size;
//! past that the carried entry takes the first free slot instead.

use super::index::{multiplicative, select_method, stepping, IndexMethod};
use super::node::HashNode;
use super::{alloc_slots, Placement, Slots};
use crate::error::{Error, Result};
use core::borrow::Borrow;
use std::sync::Arc;

pub(crate) enum Slot<K, V> {
    Empty,
    Vacated,
    Occupied(Arc<HashNode<K, V>>),
}

pub struct OpenSlots<K, V> {
    slots: Vec<Slot<K, V>>,
    method: IndexMethod,
}

enum Step {
    Take,
    Evict,
    Pass,
}

impl<K, V> OpenSlots<K, V> {
    /// Base index and stepping for `hash`.
    #[inline]
    pub(crate) fn probe(&self, hash: u64) -> (usize, usize) {
        let size = self.slots.len();
        (
            multiplicative(hash, size),
            stepping(hash, size, self.method),
        )
    }

    #[cfg(test)]
    pub(crate) fn slot(&self, pos: usize) -> &Slot<K, V> {
        &self.slots[pos]
    }

    fn position_of(&self, node: &Arc<HashNode<K, V>>) -> Option<usize> {
        let size = self.slots.len();
        let (mut pos, step) = self.probe(node.hash());
        for _ in 0..size {
            match &self.slots[pos] {
                Slot::Empty => return None,
                Slot::Occupied(n) if Arc::ptr_eq(n, node) => return Some(pos),
                _ => {}
            }
            pos = (pos + step) % size;
        }
        None
    }
}

impl<K, V> Slots<K, V> for OpenSlots<K, V> {
    const DEFAULT_CAPACITY: usize = 100;
    const DEFAULT_MAX_LOAD: f64 = 0.8;
    const DEFAULT_GROWTH: f64 = 1.5;
    const LOAD_LIMIT: f64 = 1.0;

    fn new_table(capacity: usize, fallible: bool) -> Result<Self> {
        Ok(Self {
            slots: alloc_slots(capacity, fallible, || Slot::Empty)?,
            method: select_method(capacity),
        })
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn index_method(&self) -> IndexMethod {
        self.method
    }

    fn find<Q>(&self, hash: u64, key: &Q) -> Option<&Arc<HashNode<K, V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let size = self.slots.len();
        let (mut pos, step) = self.probe(hash);
        for _ in 0..size {
            match &self.slots[pos] {
                Slot::Empty => return None,
                Slot::Occupied(n) if n.hash() == hash && n.key().borrow() == key => {
                    return Some(n)
                }
                _ => {}
            }
            pos = (pos + step) % size;
        }
        None
    }

    fn place(&mut self, node: Arc<HashNode<K, V>>) -> Result<Placement> {
        let size = self.slots.len();
        let mut report = Placement::default();
        let mut carry = node;
        'carry: loop {
            let (mut pos, step) = self.probe(carry.hash());
            for hops in 0..size as u32 {
                let action = match &self.slots[pos] {
                    Slot::Empty | Slot::Vacated => Step::Take,
                    Slot::Occupied(resident)
                        if !report.abandoned && hops > 1 && resident.hops() < hops - 1 =>
                    {
                        Step::Evict
                    }
                    Slot::Occupied(_) => Step::Pass,
                };
                match action {
                    Step::Take => {
                        carry.elem.set_hops(hops);
                        self.slots[pos] = Slot::Occupied(carry);
                        return Ok(report);
                    }
                    Step::Evict => {
                        carry.elem.set_hops(hops);
                        let evicted = core::mem::replace(&mut self.slots[pos], Slot::Occupied(carry));
                        let Slot::Occupied(evicted) = evicted else {
                            unreachable!("evicting a slot that was checked occupied");
                        };
                        evicted.elem.set_hops(0);
                        carry = evicted;
                        report.evictions += 1;
                        if report.evictions >= size {
                            report.abandoned = true;
                        }
                        continue 'carry;
                    }
                    Step::Pass => pos = (pos + step) % size,
                }
            }
            return Err(Error::ProbeExhausted { capacity: size });
        }
    }

    fn take_node(&mut self, node: &Arc<HashNode<K, V>>) -> bool {
        match self.position_of(node) {
            Some(pos) => {
                self.slots[pos] = Slot::Vacated;
                true
            }
            None => false,
        }
    }

    fn nodes(&self) -> Vec<Arc<HashNode<K, V>>> {
        self.slots
            .iter()
            .filter_map(|s| match s {
                Slot::Occupied(n) => Some(Arc::clone(n)),
                _ => None,
            })
            .collect()
    }

    fn first(&self) -> Option<&Arc<HashNode<K, V>>> {
        self.slots.iter().find_map(|s| match s {
            Slot::Occupied(n) => Some(n),
            _ => None,
        })
    }

    fn last(&self) -> Option<&Arc<HashNode<K, V>>> {
        self.slots.iter().rev().find_map(|s| match s {
            Slot::Occupied(n) => Some(n),
            _ => None,
        })
    }
}
