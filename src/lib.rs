//! lockable-collections: thread-safe linked lists, rings, queues, stacks,
//! sets and hash tables that share one recursive, thread-owned lock.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: collections that many threads can use directly, where every
//!   structure and every node carries its own lock and nested calls from
//!   the owning thread never deadlock.
//! - Layers:
//!   - OwnershipLock: recursive lock remembering its owner thread and
//!     depth; can be destroyed (never blocks again) or switched off for
//!     single-threaded phases. `MultiGuard` takes several at once with
//!     try/back-off/yield.
//!   - Payload<T>: shared, reference-counted value with an optional
//!     destroy hook that runs on the last reference.
//!   - DoubleNode<T>: list node with the link protocol (lock order this ->
//!     new -> old neighbour) and stale neighbour fallback after removal.
//!   - LinkedEngine<T>: container over DoubleNode with head/tail, lazy
//!     renumbering, per-thread cursors and optional ring closure.
//!     DoubleList, DoubleRing, Queue, Stack and Set wrap it.
//!   - HashEngine<K, V, C, S>: hash table over a `Slots` strategy,
//!     `ChainedSlots` (ChainHash) or `OpenSlots` (OpenHash, Robin Hood).
//!
//! Locking
//! - Mutations take the container's OwnershipLock. The linked engine then
//!   locks the nodes it touches; neighbours are only try-locked so two
//!   threads working on adjacent nodes back off instead of deadlocking.
//! - Hash slot arrays sit behind a `parking_lot::RwLock`. Lookups only
//!   take the read side; growth holds the write side while it builds the
//!   new array, so lookups never see hop counts from a half-built one.
//!
//! Lifetimes
//! - Nodes are `Arc`s. A container forgets a node on removal (marking it
//!   removed and destroyed); callers holding the node can still read it
//!   and walk on from it. Payload memory goes away with the last node or
//!   caller referencing it.
//!
//! Failures
//! - `Error` covers expected outcomes (missing keys, duplicates,
//!   allocation failure, bad configuration) and broken contracts
//!   (destroyed or already linked nodes, exhausted probing). A failed
//!   mutation leaves the container unchanged. Lock contention is retried
//!   internally and never surfaces.
//!
//! Notes and non-goals
//! - Not lock-free. Iteration is by snapshot; a held node may see stale
//!   neighbours but never dangling ones.
//! - Hash entries keep their full hash, so growth never calls `K: Hash`.
//!   `K: Eq` runs under the table lock and must not call back into the
//!   same table (debug builds panic).
//! - No serialization of contents.

mod containers;
mod cursor;
mod double_node;
mod element;
mod error;
pub mod hash;
mod linked;
mod lock;
mod payload;
mod reentrancy;

// Public surface
pub use containers::{DoubleList, DoubleRing, Queue, Set, Stack};
pub use double_node::DoubleNode;
pub use error::{Error, Result};
pub use hash::{
    Anomaly, ChainHash, ChainedSlots, Diagnostics, HashConfig, HashEngine, HashNode, IndexMethod,
    OpenHash, OpenSlots, Placement, Slots,
};
pub use linked::{Closure, Iter, LinkedEngine, ListConfig};
pub use lock::{LockGuard, LockStrategy, MultiGuard, OwnershipLock};
pub use payload::{DestroyFn, Payload};
