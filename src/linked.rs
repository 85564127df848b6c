//! LinkedEngine: the shared machinery behind lists, rings, queues, stacks
//! and sets.
//!
//! Every mutation runs under the container's `OwnershipLock` and then uses
//! the node-level link protocol from `double_node`. Readers holding a node
//! may keep walking it after it was removed (stale neighbours), but index
//! access, searches and snapshots go through the container lock.
//!
//! Position numbers are maintained lazily. Insertions at the tail number the
//! new node directly; anything else lowers `dirty_from`, the first position
//! whose number may be stale. `renumber` walks back from the tail (whose
//! number is always `len - 1`) and stops at `dirty_from`, below which
//! numbers are known to be right.

use crate::cursor::CursorStore;
use crate::double_node::DoubleNode;
use crate::error::{Error, Result};
use crate::lock::{LockStrategy, MultiGuard, OwnershipLock};
use crate::payload::{DestroyFn, Payload};
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_container_id() -> u64 {
    NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed)
}

const CLEAN: usize = usize::MAX;

/// Whether the tail links back to the head.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Closure {
    Linear,
    Ring,
}

/// Construction options for linked containers.
pub struct ListConfig<T> {
    pub strategy: LockStrategy,
    /// Applied to every payload the container creates from a plain value.
    pub on_destroy: Option<DestroyFn<T>>,
}

impl<T> ListConfig<T> {
    pub fn new() -> Self {
        Self {
            strategy: LockStrategy::default(),
            on_destroy: None,
        }
    }

    pub fn strategy(mut self, strategy: LockStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn on_destroy(mut self, f: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.on_destroy = Some(Arc::new(f));
        self
    }
}

impl<T> Default for ListConfig<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ListConfig<T> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy,
            on_destroy: self.on_destroy.clone(),
        }
    }
}

struct Ends<T> {
    head: Option<Arc<DoubleNode<T>>>,
    tail: Option<Arc<DoubleNode<T>>>,
}

enum Place<T> {
    Front,
    Back,
    After(Arc<DoubleNode<T>>),
    Before(Arc<DoubleNode<T>>),
}

pub struct LinkedEngine<T> {
    id: u64,
    lock: OwnershipLock,
    ends: Mutex<Ends<T>>,
    count: AtomicUsize,
    dirty_from: AtomicUsize,
    cursors: CursorStore<T>,
    closure: Closure,
    config: ListConfig<T>,
}

impl<T> LinkedEngine<T> {
    pub fn new(closure: Closure) -> Self {
        Self::with_config(closure, ListConfig::default())
    }

    pub fn with_config(closure: Closure, config: ListConfig<T>) -> Self {
        Self {
            id: next_container_id(),
            lock: OwnershipLock::with_strategy(config.strategy),
            ends: Mutex::new(Ends {
                head: None,
                tail: None,
            }),
            count: AtomicUsize::new(0),
            dirty_from: AtomicUsize::new(CLEAN),
            cursors: CursorStore::new(),
            closure,
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn closure(&self) -> Closure {
        self.closure
    }

    /// The container-wide lock. Holding it makes a sequence of calls from
    /// one thread atomic with respect to other threads.
    pub fn lock(&self) -> &OwnershipLock {
        &self.lock
    }

    /// Turn container locking on or off. Only meant for phases where a
    /// single thread has exclusive use of the container.
    pub fn set_thread_safe(&self, enabled: bool) -> bool {
        if enabled {
            self.lock.set_locking(true)
        } else {
            let _g = self.lock.guard();
            self.lock.set_locking(false)
        }
    }

    pub fn head(&self) -> Option<Arc<DoubleNode<T>>> {
        self.ends.lock().head.clone()
    }

    pub fn tail(&self) -> Option<Arc<DoubleNode<T>>> {
        self.ends.lock().tail.clone()
    }

    fn check_member(&self, node: &DoubleNode<T>) -> Result<()> {
        if node.owner != self.id || node.is_removed() {
            return Err(Error::ElementNotFound);
        }
        Ok(())
    }

    #[inline]
    fn mark_dirty(&self, from: usize) {
        self.dirty_from.fetch_min(from, Ordering::AcqRel);
    }

    fn wrap(&self, data: T) -> Payload<T> {
        Payload::wrap(data, self.config.on_destroy.as_ref())
    }

    fn insert_at(&self, place: Place<T>, payload: Payload<T>) -> Result<Arc<DoubleNode<T>>> {
        let _g = self.lock.guard();
        let node = DoubleNode::new(payload, self.id, self.config.strategy);
        let count = self.len();

        let place = match place {
            Place::After(a) => {
                self.check_member(&a)?;
                Place::After(a)
            }
            Place::Before(b) => {
                self.check_member(&b)?;
                Place::Before(b)
            }
            p => p,
        };

        let mut ends = self.ends.lock();
        match (ends.head.clone(), ends.tail.clone()) {
            (Some(head), Some(tail)) => match place {
                Place::Front => {
                    head.insert_prev(&node)?;
                    ends.head = Some(Arc::clone(&node));
                    self.mark_dirty(0);
                }
                Place::Back => {
                    tail.insert_next(&node)?;
                    node.elem.set_nr(count);
                    ends.tail = Some(Arc::clone(&node));
                }
                Place::After(a) if Arc::ptr_eq(&a, &tail) => {
                    tail.insert_next(&node)?;
                    node.elem.set_nr(count);
                    ends.tail = Some(Arc::clone(&node));
                }
                Place::After(a) => {
                    a.insert_next(&node)?;
                    self.mark_dirty(a.nr() + 1);
                }
                Place::Before(b) => {
                    b.insert_prev(&node)?;
                    if Arc::ptr_eq(&b, &head) {
                        ends.head = Some(Arc::clone(&node));
                        self.mark_dirty(0);
                    } else {
                        self.mark_dirty(b.nr());
                    }
                }
            },
            _ => {
                // Anchored places were validated as members above, so an
                // empty container only ever sees Front/Back here.
                node.link_alone(self.closure == Closure::Ring);
                node.elem.set_nr(0);
                ends.head = Some(Arc::clone(&node));
                ends.tail = Some(Arc::clone(&node));
            }
        }
        self.count.store(count + 1, Ordering::Release);
        self.connect_ends(&ends);
        drop(ends);

        self.cursors.set(&node);
        Ok(node)
    }

    // Ring mode: make sure tail -> head and head -> tail after a mutation.
    fn connect_ends(&self, ends: &Ends<T>) {
        if self.closure != Closure::Ring {
            return;
        }
        let (Some(head), Some(tail)) = (&ends.head, &ends.tail) else {
            return;
        };
        let closed = tail.linked_next().is_some_and(|n| Arc::ptr_eq(&n, head))
            && head.linked_prev().is_some_and(|p| Arc::ptr_eq(&p, tail));
        if closed {
            return;
        }
        let _both = MultiGuard::lock_all(&[&tail.elem.lock, &head.elem.lock]);
        if head.is_destroyed() || tail.is_destroyed() {
            tracing::warn!(container = self.id, "ring closure skipped: end node destroyed");
            return;
        }
        DoubleNode::join(tail, head);
    }

    fn remove_locked(&self, node: &Arc<DoubleNode<T>>) -> Result<Payload<T>> {
        self.check_member(node)?;
        let mut ends = self.ends.lock();
        let count = self.len();

        if count <= 1 {
            node.remove();
            ends.head = None;
            ends.tail = None;
            self.dirty_from.store(CLEAN, Ordering::Release);
            self.cursors.clear();
        } else {
            let was_head = ends.head.as_ref().is_some_and(|h| Arc::ptr_eq(h, node));
            let was_tail = ends.tail.as_ref().is_some_and(|t| Arc::ptr_eq(t, node));
            let nr = node.nr();
            let next = node.linked_next();
            let prev = node.linked_prev();
            node.remove();
            if was_head {
                ends.head = next;
            }
            if was_tail {
                ends.tail = prev;
            }
            self.mark_dirty(nr);
        }
        self.count.store(count.saturating_sub(1), Ordering::Release);
        node.elem.destroy();
        self.connect_ends(&ends);
        Ok(node.payload().clone())
    }

    pub fn push_back(&self, data: T) -> Result<Arc<DoubleNode<T>>> {
        self.insert_at(Place::Back, self.wrap(data))
    }

    pub fn push_front(&self, data: T) -> Result<Arc<DoubleNode<T>>> {
        self.insert_at(Place::Front, self.wrap(data))
    }

    /// Append a node sharing an existing payload.
    pub fn push_back_payload(&self, payload: Payload<T>) -> Result<Arc<DoubleNode<T>>> {
        self.insert_at(Place::Back, payload)
    }

    pub fn push_front_payload(&self, payload: Payload<T>) -> Result<Arc<DoubleNode<T>>> {
        self.insert_at(Place::Front, payload)
    }

    /// Insert after `anchor`, which must be a live member of this container.
    pub fn insert_next(&self, anchor: &Arc<DoubleNode<T>>, data: T) -> Result<Arc<DoubleNode<T>>> {
        self.insert_at(Place::After(Arc::clone(anchor)), self.wrap(data))
    }

    /// Insert before `anchor`, which must be a live member of this container.
    pub fn insert_prev(&self, anchor: &Arc<DoubleNode<T>>, data: T) -> Result<Arc<DoubleNode<T>>> {
        self.insert_at(Place::Before(Arc::clone(anchor)), self.wrap(data))
    }

    pub fn pop_front(&self) -> Option<Payload<T>> {
        let _g = self.lock.guard();
        let head = self.head()?;
        self.remove_locked(&head).ok()
    }

    pub fn pop_back(&self) -> Option<Payload<T>> {
        let _g = self.lock.guard();
        let tail = self.tail()?;
        self.remove_locked(&tail).ok()
    }

    /// Unlink `node`. Fails with `ElementNotFound` if it is not a live member.
    pub fn remove(&self, node: &Arc<DoubleNode<T>>) -> Result<Payload<T>> {
        let _g = self.lock.guard();
        self.remove_locked(node)
    }

    /// Remove the successor of `node` (the head, for the tail of a ring).
    pub fn remove_next(&self, node: &Arc<DoubleNode<T>>) -> Result<Payload<T>> {
        let _g = self.lock.guard();
        self.check_member(node)?;
        let next = node
            .linked_next()
            .filter(|n| !Arc::ptr_eq(n, node))
            .ok_or(Error::ElementNotFound)?;
        self.remove_locked(&next)
    }

    /// Remove the predecessor of `node` (the tail, for the head of a ring).
    pub fn remove_prev(&self, node: &Arc<DoubleNode<T>>) -> Result<Payload<T>> {
        let _g = self.lock.guard();
        self.check_member(node)?;
        let prev = node
            .linked_prev()
            .filter(|p| !Arc::ptr_eq(p, node))
            .ok_or(Error::ElementNotFound)?;
        self.remove_locked(&prev)
    }

    /// Bring every position number up to date.
    pub fn renumber(&self) {
        let _g = self.lock.guard();
        self.renumber_locked();
    }

    fn renumber_locked(&self) {
        let count = self.len();
        let from = self.dirty_from.load(Ordering::Acquire);
        if from >= count {
            self.dirty_from.store(CLEAN, Ordering::Release);
            return;
        }
        let mut cur = self.tail();
        let mut nr = count - 1;
        while let Some(n) = cur {
            n.elem.set_nr(nr);
            if nr == from {
                break;
            }
            nr -= 1;
            cur = n.linked_prev();
        }
        self.dirty_from.store(CLEAN, Ordering::Release);
        tracing::trace!(container = self.id, from, count, "renumbered");
    }

    /// Node at `index`. Negative indexes count from the tail; every index
    /// wraps around the length. `None` only for an empty container.
    pub fn get(&self, index: isize) -> Option<Arc<DoubleNode<T>>> {
        let _g = self.lock.guard();
        let count = self.len();
        if count == 0 {
            return None;
        }
        let target = index.rem_euclid(count as isize) as usize;
        self.renumber_locked();

        let (head, tail) = {
            let ends = self.ends.lock();
            (ends.head.clone()?, ends.tail.clone()?)
        };
        let mut start = (head, 0usize);
        if count - 1 - target < target {
            start = (tail, count - 1);
        }
        if let Some(c) = self.cursors.get().filter(|c| c.owner == self.id) {
            let pos = c.nr();
            if pos.abs_diff(target) < start.1.abs_diff(target) {
                start = (c, pos);
            }
        }

        let (mut node, mut pos) = start;
        while pos < target {
            node = node.linked_next()?;
            pos += 1;
        }
        while pos > target {
            node = node.linked_prev()?;
            pos -= 1;
        }
        self.cursors.set(&node);
        Some(node)
    }

    /// Consistent snapshot of the member nodes, head to tail.
    pub fn iter(&self) -> Iter<T> {
        let _g = self.lock.guard();
        let count = self.len();
        let mut nodes = Vec::with_capacity(count);
        let mut cur = self.head();
        while let Some(n) = cur {
            if nodes.len() == count {
                break;
            }
            cur = n.linked_next();
            nodes.push(n);
        }
        Iter {
            inner: nodes.into_iter(),
        }
    }

    /// Drop every member. Nodes still held elsewhere become removed and
    /// destroyed; payloads live on while referenced.
    pub fn clear(&self) {
        let _g = self.lock.guard();
        let (head, count) = {
            let mut ends = self.ends.lock();
            ends.tail = None;
            (ends.head.take(), self.len())
        };
        let mut cur = head;
        let mut left = count;
        while let Some(n) = cur {
            if left == 0 {
                break;
            }
            left -= 1;
            cur = n.sever();
        }
        self.count.store(0, Ordering::Release);
        self.dirty_from.store(CLEAN, Ordering::Release);
        self.cursors.clear();
        if count > 0 {
            tracing::debug!(container = self.id, count, "linked container cleared");
        }
    }
}

impl<T: PartialEq> LinkedEngine<T> {
    /// First member whose payload equals `data`.
    pub fn find(&self, data: &T) -> Option<Arc<DoubleNode<T>>> {
        let _g = self.lock.guard();
        let found = self.iter().find(|n| n.data() == data)?;
        self.cursors.set(&found);
        Some(found)
    }

    pub fn contains(&self, data: &T) -> bool {
        self.find(data).is_some()
    }

    /// Remove the first member whose payload equals `data`.
    pub fn remove_data(&self, data: &T) -> Result<Payload<T>> {
        let _g = self.lock.guard();
        let node = self.find(data).ok_or(Error::ElementNotFound)?;
        self.remove_locked(&node)
    }
}

impl<T: Clone> LinkedEngine<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().map(|n| n.data().clone()).collect()
    }
}

impl<T> Drop for LinkedEngine<T> {
    fn drop(&mut self) {
        self.clear();
        self.lock.destroy();
    }
}

impl<T> core::fmt::Debug for LinkedEngine<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinkedEngine")
            .field("closure", &self.closure)
            .field("len", &self.len())
            .finish()
    }
}

/// Snapshot iterator returned by `LinkedEngine::iter`.
pub struct Iter<T> {
    inner: std::vec::IntoIter<Arc<DoubleNode<T>>>,
}

impl<T> Iterator for Iter<T> {
    type Item = Arc<DoubleNode<T>>;
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for Iter<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<T> ExactSizeIterator for Iter<T> {}
