//! Doubly linked node and its link protocol.
//!
//! Lock order for linking is fixed: this node, then the new node, then the
//! old neighbour. The old neighbour is only try-locked; on failure every lock
//! is dropped and the attempt restarts after a yield. Unlinking holds this
//! node and try-locks both neighbours together.
//!
//! Forward links are strong and backward links weak, so a linear chain owns
//! itself from the head. A removed node keeps weak "last known" neighbours
//! which `next()`/`prev()` fall back to, letting a reader that holds a node
//! while it is unlinked continue its walk.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::lock::{LockStrategy, MultiGuard};
use crate::payload::Payload;
use core::fmt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

struct Links<T> {
    next: Option<Arc<DoubleNode<T>>>,
    prev: Weak<DoubleNode<T>>,
    old_next: Weak<DoubleNode<T>>,
    old_prev: Weak<DoubleNode<T>>,
}

impl<T> Links<T> {
    fn set_next(&mut self, next: Option<Arc<DoubleNode<T>>>) {
        self.old_next = self.next.as_ref().map(Arc::downgrade).unwrap_or_default();
        self.next = next;
    }

    fn set_prev(&mut self, prev: Weak<DoubleNode<T>>) {
        self.old_prev = core::mem::replace(&mut self.prev, prev);
    }

    fn is_linked(&self) -> bool {
        self.next.is_some() || self.prev.strong_count() > 0
    }
}

/// A node of a `LinkedEngine`.
pub struct DoubleNode<T> {
    pub(crate) elem: Element,
    pub(crate) owner: u64,
    data: Payload<T>,
    links: Mutex<Links<T>>,
}

#[inline]
fn same<T>(a: &Arc<DoubleNode<T>>, b: &Arc<DoubleNode<T>>) -> bool {
    Arc::ptr_eq(a, b)
}

impl<T> DoubleNode<T> {
    pub(crate) fn new(data: Payload<T>, owner: u64, strategy: LockStrategy) -> Arc<Self> {
        Arc::new(Self {
            elem: Element::new(strategy),
            owner,
            data,
            links: Mutex::new(Links {
                next: None,
                prev: Weak::new(),
                old_next: Weak::new(),
                old_prev: Weak::new(),
            }),
        })
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn payload(&self) -> &Payload<T> {
        &self.data
    }

    /// Position number. Only authoritative after the owning container has
    /// renumbered (index access does that).
    pub fn nr(&self) -> usize {
        self.elem.nr()
    }

    pub fn is_removed(&self) -> bool {
        self.elem.is_removed()
    }

    pub fn is_destroyed(&self) -> bool {
        self.elem.is_destroyed()
    }

    /// Following node. A removed node answers with its last known successor.
    pub fn next(&self) -> Option<Arc<Self>> {
        let l = self.links.lock();
        match &l.next {
            Some(n) => Some(Arc::clone(n)),
            None if self.elem.is_removed() => l.old_next.upgrade(),
            None => None,
        }
    }

    /// Preceding node. A removed node answers with its last known predecessor.
    pub fn prev(&self) -> Option<Arc<Self>> {
        let l = self.links.lock();
        match l.prev.upgrade() {
            Some(p) => Some(p),
            None if self.elem.is_removed() => l.old_prev.upgrade(),
            None => None,
        }
    }

    // Live successor only, no stale fallback.
    pub(crate) fn linked_next(&self) -> Option<Arc<Self>> {
        self.links.lock().next.clone()
    }

    pub(crate) fn linked_prev(&self) -> Option<Arc<Self>> {
        self.links.lock().prev.upgrade()
    }

    /// Make this node the only member of a list, or a ring of one.
    pub(crate) fn link_alone(self: &Arc<Self>, ring: bool) {
        let _g = self.elem.lock.guard();
        let mut l = self.links.lock();
        if ring {
            l.set_next(Some(Arc::clone(self)));
            l.set_prev(Arc::downgrade(self));
        }
        self.elem.set_removed(false);
    }

    // Lock this then the new node, validating both.
    fn lock_pair(&self, new: &Self, op: &'static str) -> Result<()> {
        self.elem.lock.lock();
        if self.elem.is_destroyed() {
            self.elem.lock.unlock();
            return Err(Error::DestroyedElement(op));
        }
        new.elem.lock.lock();
        let verdict = if new.elem.is_destroyed() {
            Err(Error::DestroyedElement(op))
        } else if !new.elem.is_removed() || new.links.lock().is_linked() {
            Err(Error::AlreadyLinked)
        } else {
            Ok(())
        };
        if verdict.is_err() {
            new.elem.lock.unlock();
            self.elem.lock.unlock();
        }
        verdict
    }

    /// Link `new` directly after this node.
    pub(crate) fn insert_next(self: &Arc<Self>, new: &Arc<Self>) -> Result<()> {
        if same(self, new) {
            return Err(Error::AlreadyLinked);
        }
        loop {
            self.lock_pair(new, "insert_next")?;
            let old = self.linked_next().filter(|o| !same(o, self));
            if let Some(o) = &old {
                if !o.elem.lock.try_lock() {
                    new.elem.lock.unlock();
                    self.elem.lock.unlock();
                    std::thread::yield_now();
                    continue;
                }
                if o.elem.is_destroyed() {
                    o.elem.lock.unlock();
                    new.elem.lock.unlock();
                    self.elem.lock.unlock();
                    return Err(Error::DestroyedElement("insert_next"));
                }
            }

            let after = self.linked_next();
            {
                let mut nl = new.links.lock();
                nl.set_prev(Arc::downgrade(self));
                nl.set_next(after.clone());
            }
            if let Some(a) = &after {
                a.links.lock().set_prev(Arc::downgrade(new));
            }
            self.links.lock().set_next(Some(Arc::clone(new)));
            new.elem.set_removed(false);

            if let Some(o) = &old {
                o.elem.lock.unlock();
            }
            new.elem.lock.unlock();
            self.elem.lock.unlock();
            return Ok(());
        }
    }

    /// Link `new` directly before this node.
    pub(crate) fn insert_prev(self: &Arc<Self>, new: &Arc<Self>) -> Result<()> {
        if same(self, new) {
            return Err(Error::AlreadyLinked);
        }
        loop {
            self.lock_pair(new, "insert_prev")?;
            let old = self.linked_prev().filter(|o| !same(o, self));
            if let Some(o) = &old {
                if !o.elem.lock.try_lock() {
                    new.elem.lock.unlock();
                    self.elem.lock.unlock();
                    std::thread::yield_now();
                    continue;
                }
                if o.elem.is_destroyed() {
                    o.elem.lock.unlock();
                    new.elem.lock.unlock();
                    self.elem.lock.unlock();
                    return Err(Error::DestroyedElement("insert_prev"));
                }
            }

            let before = self.linked_prev();
            {
                let mut nl = new.links.lock();
                nl.set_next(Some(Arc::clone(self)));
                nl.set_prev(before.as_ref().map(Arc::downgrade).unwrap_or_default());
            }
            if let Some(b) = &before {
                b.links.lock().set_next(Some(Arc::clone(new)));
            }
            self.links.lock().set_prev(Arc::downgrade(new));
            new.elem.set_removed(false);

            if let Some(o) = &old {
                o.elem.lock.unlock();
            }
            new.elem.lock.unlock();
            self.elem.lock.unlock();
            return Ok(());
        }
    }

    /// Unlink this node from its neighbours.
    ///
    /// Returns false if the node was already removed. The payload is kept.
    pub(crate) fn remove(self: &Arc<Self>) -> bool {
        loop {
            self.elem.lock.lock();
            if self.elem.is_removed() {
                self.elem.lock.unlock();
                return false;
            }
            let prev = self.linked_prev().filter(|p| !same(p, self));
            let next = self.linked_next().filter(|n| !same(n, self));

            let mut wanted = Vec::with_capacity(2);
            if let Some(p) = &prev {
                wanted.push(&p.elem.lock);
            }
            if let Some(n) = &next {
                wanted.push(&n.elem.lock);
            }
            let Some(neighbours) = MultiGuard::try_lock_all(&wanted) else {
                self.elem.lock.unlock();
                std::thread::yield_now();
                continue;
            };

            self.elem.set_removed(true);
            if let Some(p) = &prev {
                let mut pl = p.links.lock();
                if pl.next.as_ref().is_some_and(|x| same(x, self)) {
                    pl.set_next(next.clone());
                }
            }
            if let Some(n) = &next {
                let mut nl = n.links.lock();
                if nl.prev.upgrade().is_some_and(|x| same(&x, self)) {
                    nl.set_prev(prev.as_ref().map(Arc::downgrade).unwrap_or_default());
                }
            }
            {
                let mut l = self.links.lock();
                l.set_next(None);
                l.set_prev(Weak::new());
            }

            drop(neighbours);
            self.elem.lock.unlock();
            return true;
        }
    }

    /// Point `tail` forward at `head` and `head` back at `tail`. Callers hold
    /// both node locks.
    pub(crate) fn join(tail: &Arc<Self>, head: &Arc<Self>) {
        tail.links.lock().set_next(Some(Arc::clone(head)));
        head.links.lock().set_prev(Arc::downgrade(tail));
    }

    /// Drop both links without touching the neighbours and flag the node
    /// destroyed. Used when the whole container is torn down; returns the
    /// former successor so teardown can continue iteratively.
    pub(crate) fn sever(&self) -> Option<Arc<Self>> {
        let next = {
            let mut l = self.links.lock();
            let next = l.next.take();
            l.old_next = next.as_ref().map(Arc::downgrade).unwrap_or_default();
            let prev = core::mem::take(&mut l.prev);
            l.old_prev = prev;
            next
        };
        self.elem.destroy();
        next
    }
}

impl<T: fmt::Debug> fmt::Debug for DoubleNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleNode")
            .field("data", &*self.data)
            .field("nr", &self.nr())
            .field("removed", &self.is_removed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn node(v: i32) -> Arc<DoubleNode<i32>> {
        DoubleNode::new(Payload::new(v), 0, LockStrategy::Park)
    }

    fn chain(vals: &[i32]) -> Vec<Arc<DoubleNode<i32>>> {
        let nodes: Vec<_> = vals.iter().map(|v| node(*v)).collect();
        nodes[0].link_alone(false);
        for w in nodes.windows(2) {
            w[0].insert_next(&w[1]).unwrap();
        }
        nodes
    }

    fn forward(head: &Arc<DoubleNode<i32>>) -> Vec<i32> {
        let mut out = vec![*head.data()];
        let mut cur = head.linked_next();
        while let Some(n) = cur {
            out.push(*n.data());
            cur = n.linked_next();
        }
        out
    }

    /// Invariant: insert_next/insert_prev keep forward and backward links
    /// consistent.
    #[test]
    fn links_are_symmetric() {
        let n = chain(&[1, 3]);
        n[1].insert_prev(&node(2)).unwrap();
        assert_eq!(forward(&n[0]), vec![1, 2, 3]);
        let mid = n[0].next().unwrap();
        assert!(Arc::ptr_eq(&mid.prev().unwrap(), &n[0]));
        assert!(Arc::ptr_eq(&mid.next().unwrap(), &n[1]));
        assert!(Arc::ptr_eq(&n[1].prev().unwrap(), &mid));
    }

    /// Invariant: a removed node reports its last neighbours, and a second
    /// remove is a no-op.
    #[test]
    fn removed_node_keeps_stale_neighbours() {
        let n = chain(&[1, 2, 3]);
        assert!(n[1].remove());
        assert!(n[1].is_removed());
        assert_eq!(forward(&n[0]), vec![1, 3]);
        assert!(Arc::ptr_eq(&n[1].next().unwrap(), &n[2]));
        assert!(Arc::ptr_eq(&n[1].prev().unwrap(), &n[0]));
        assert!(n[1].linked_next().is_none());
        assert!(!n[1].remove());
        assert_eq!(forward(&n[0]), vec![1, 3]);
    }

    /// Invariant: linking a node that is already linked or destroyed fails
    /// and leaves the chain unchanged.
    #[test]
    fn insert_rejects_linked_and_destroyed() {
        let n = chain(&[1, 2]);
        assert_eq!(n[0].insert_next(&n[1]), Err(Error::AlreadyLinked));
        let dead = node(9);
        dead.elem.destroy();
        assert!(matches!(
            n[0].insert_next(&dead),
            Err(Error::DestroyedElement(_))
        ));
        n[1].elem.lock.destroy();
        assert!(matches!(
            n[1].insert_prev(&node(5)),
            Err(Error::DestroyedElement(_))
        ));
        assert_eq!(forward(&n[0]), vec![1, 2]);
    }

    /// Invariant: removing from a ring of two leaves a ring of one.
    #[test]
    fn ring_of_two_collapses_to_self_loop() {
        let a = node(1);
        let b = node(2);
        a.link_alone(true);
        a.insert_next(&b).unwrap();
        assert!(Arc::ptr_eq(&b.linked_next().unwrap(), &a));
        assert!(a.remove());
        assert!(Arc::ptr_eq(&b.linked_next().unwrap(), &b));
        assert!(Arc::ptr_eq(&b.linked_prev().unwrap(), &b));
        b.sever();
        assert!(b.is_destroyed());
    }

    /// Invariant: two threads inserting after adjacent nodes both succeed and
    /// the chain stays acyclic and fully reachable.
    #[test]
    fn concurrent_insert_next_on_adjacent_nodes() {
        for _ in 0..50 {
            let n = chain(&[0, 10, 20]);
            let (a, b) = (Arc::clone(&n[0]), Arc::clone(&n[1]));
            let t1 = thread::spawn(move || a.insert_next(&node(5)));
            let t2 = thread::spawn(move || b.insert_next(&node(15)));
            t1.join().unwrap().unwrap();
            t2.join().unwrap().unwrap();
            assert_eq!(forward(&n[0]), vec![0, 5, 10, 15, 20]);

            let mut back = vec![*n[2].data()];
            let mut cur = n[2].linked_prev();
            while let Some(p) = cur {
                back.push(*p.data());
                cur = p.linked_prev();
            }
            assert_eq!(back, vec![20, 15, 10, 5, 0]);
        }
    }
}
