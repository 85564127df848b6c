//! Per-thread cursor of a linked container.
//!
//! Each thread remembers the node it last inserted or looked up, so index
//! walks started by that thread can begin near where it was working.
//! Entries are weak; a cursor never keeps a node alive.

use crate::double_node::DoubleNode;
use crate::lock::thread_token;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub(crate) struct CursorStore<T> {
    slots: Mutex<HashMap<u64, Weak<DoubleNode<T>>>>,
}

impl<T> CursorStore<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The calling thread's cursor, if it still points at a live node.
    pub(crate) fn get(&self) -> Option<Arc<DoubleNode<T>>> {
        let me = thread_token();
        let mut slots = self.slots.lock();
        match slots.get(&me).and_then(Weak::upgrade) {
            Some(n) if !n.is_removed() => Some(n),
            Some(_) | None => {
                slots.remove(&me);
                None
            }
        }
    }

    pub(crate) fn set(&self, node: &Arc<DoubleNode<T>>) {
        self.slots
            .lock()
            .insert(thread_token(), Arc::downgrade(node));
    }

    pub(crate) fn clear(&self) {
        self.slots.lock().clear();
    }
}
