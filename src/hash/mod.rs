//! HashEngine: thread-safe hash table over a pluggable slot strategy.
//!
//! Layers:
//! - `Slots` decides where entries live: `ChainedSlots` (separate chaining)
//!   or `OpenSlots` (open addressing with Robin Hood displacement). It is
//!   plain single-threaded data.
//! - `HashEngine` wraps one slot array in a `parking_lot::RwLock`, serializes
//!   mutations on its `OwnershipLock`, grows eagerly, and hands out
//!   `Arc<HashNode>` entries with shared payloads.
//!
//! Growth builds a complete new slot array while holding the container lock
//! and the write side of the table lock, so a concurrent lookup waits and then
//! sees the new array, never a partial one or mixed hop counts.
//!
//! `K: Eq` runs while the table lock is held. Calling back into the same
//! table from there is a bug; debug builds panic on it (see `reentrancy`).

mod chained;
pub mod index;
mod node;
mod open;
mod open_proptest;

pub use chained::ChainedSlots;
pub use index::IndexMethod;
pub use node::HashNode;
pub use open::OpenSlots;

use crate::error::{Error, Result};
use crate::lock::{LockStrategy, MultiGuard, OwnershipLock};
use crate::payload::{DestroyFn, Payload};
use crate::reentrancy::DebugReentrancy;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash, Hasher};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};
use hashbrown::hash_map::DefaultHashBuilder;
use parking_lot::RwLock;
use std::sync::Arc;

/// Outcome details of placing one entry.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Placement {
    pub evictions: usize,
    /// Displacement was given up after too many evictions.
    pub abandoned: bool,
}

/// Slot storage strategy of a `HashEngine`.
pub trait Slots<K, V>: Sized {
    const DEFAULT_CAPACITY: usize;
    const DEFAULT_MAX_LOAD: f64;
    const DEFAULT_GROWTH: f64;
    /// Highest max load factor the strategy can honour.
    const LOAD_LIMIT: f64;

    /// Allocate `capacity` slots. With `fallible`, allocation failure is an
    /// `AllocationFailed` error instead of an abort.
    fn new_table(capacity: usize, fallible: bool) -> Result<Self>;
    fn capacity(&self) -> usize;
    fn index_method(&self) -> IndexMethod;
    fn find<Q>(&self, hash: u64, key: &Q) -> Option<&Arc<HashNode<K, V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq;
    /// Store an entry whose key is known to be absent.
    fn place(&mut self, node: Arc<HashNode<K, V>>) -> Result<Placement>;
    /// Remove this exact entry. Never calls `K: Eq`.
    fn take_node(&mut self, node: &Arc<HashNode<K, V>>) -> bool;
    fn nodes(&self) -> Vec<Arc<HashNode<K, V>>>;
    fn first(&self) -> Option<&Arc<HashNode<K, V>>>;
    fn last(&self) -> Option<&Arc<HashNode<K, V>>>;
}

pub(crate) fn alloc_slots<T>(capacity: usize, fallible: bool, fill: impl FnMut() -> T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    if fallible {
        v.try_reserve_exact(capacity)
            .map_err(|_| Error::AllocationFailed { capacity })?;
    } else {
        v.reserve_exact(capacity);
    }
    v.resize_with(capacity, fill);
    Ok(v)
}

/// Structural problems detected while the table kept working (or failed).
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Anomaly {
    /// Probing visited every slot without finding a place.
    ProbeExhausted { capacity: usize, len: usize },
    /// Robin Hood displacement stopped after `evictions` evictions.
    CascadeAbandoned { capacity: usize, evictions: usize },
}

/// Callback receiving every `Anomaly`. It may run while the table lock is
/// held and must not call back into the table.
pub type Diagnostics = Arc<dyn Fn(&Anomaly) + Send + Sync>;

/// Construction options. Unset values take the slot strategy's defaults.
#[derive(Clone, Default)]
pub struct HashConfig {
    pub capacity: Option<usize>,
    pub max_load: Option<f64>,
    pub growth: Option<f64>,
    /// Only the first `key_limit` bytes a key feeds to the hasher count.
    pub key_limit: Option<usize>,
    pub strategy: LockStrategy,
    pub diagnostics: Option<Diagnostics>,
}

impl HashConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn max_load(mut self, max_load: f64) -> Self {
        self.max_load = Some(max_load);
        self
    }

    pub fn growth(mut self, growth: f64) -> Self {
        self.growth = Some(growth);
        self
    }

    pub fn key_limit(mut self, bytes: usize) -> Self {
        self.key_limit = Some(bytes);
        self
    }

    pub fn strategy(mut self, strategy: LockStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn diagnostics(mut self, f: impl Fn(&Anomaly) + Send + Sync + 'static) -> Self {
        self.diagnostics = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for HashConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashConfig")
            .field("capacity", &self.capacity)
            .field("max_load", &self.max_load)
            .field("growth", &self.growth)
            .field("key_limit", &self.key_limit)
            .field("strategy", &self.strategy)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}

/// Hasher adapter that ignores everything past the first `left` bytes.
struct Truncating<H> {
    inner: H,
    left: usize,
}

impl<H: Hasher> Hasher for Truncating<H> {
    fn write(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.left);
        if n > 0 {
            self.inner.write(&bytes[..n]);
            self.left -= n;
        }
    }

    fn finish(&self) -> u64 {
        self.inner.finish()
    }
}

struct KeyHasher<S> {
    build: S,
    limit: Option<usize>,
}

impl<S: BuildHasher> KeyHasher<S> {
    fn hash_one<Q: ?Sized + Hash>(&self, q: &Q) -> u64 {
        match self.limit {
            None => self.build.hash_one(q),
            Some(left) => {
                let mut h = Truncating {
                    inner: self.build.build_hasher(),
                    left,
                };
                q.hash(&mut h);
                h.finish()
            }
        }
    }
}

pub struct HashEngine<K, V, C, S = DefaultHashBuilder> {
    lock: OwnershipLock,
    table: RwLock<C>,
    hasher: KeyHasher<S>,
    max_load: f64,
    growth: f64,
    count: AtomicUsize,
    strategy: LockStrategy,
    diagnostics: Option<Diagnostics>,
    on_destroy: Option<DestroyFn<V>>,
    reentrancy: DebugReentrancy,
    _entries: PhantomData<fn() -> K>,
}

/// Separate-chaining table (97 buckets, max load 3.0, growth 1.25).
pub type ChainHash<K, V, S = DefaultHashBuilder> = HashEngine<K, V, ChainedSlots<K, V>, S>;

/// Open-addressing Robin Hood table (100 slots, max load 0.8, growth 1.5).
pub type OpenHash<K, V, S = DefaultHashBuilder> = HashEngine<K, V, OpenSlots<K, V>, S>;

impl<K, V, C> HashEngine<K, V, C>
where
    K: Eq + Hash,
    C: Slots<K, V>,
{
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }

    pub fn with_config(config: HashConfig) -> Result<Self> {
        Self::with_config_and_hasher(config, Default::default())
    }
}

impl<K, V, C> Default for HashEngine<K, V, C>
where
    K: Eq + Hash,
    C: Slots<K, V>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C, S> HashEngine<K, V, C, S>
where
    K: Eq + Hash,
    C: Slots<K, V>,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        let table = Self::table_of(C::DEFAULT_CAPACITY);
        Self::assemble(HashConfig::default(), hasher, table)
    }

    pub fn with_config_and_hasher(config: HashConfig, hasher: S) -> Result<Self> {
        let capacity = config.capacity.unwrap_or(C::DEFAULT_CAPACITY);
        let max_load = config.max_load.unwrap_or(C::DEFAULT_MAX_LOAD);
        let growth = config.growth.unwrap_or(C::DEFAULT_GROWTH);
        if capacity == 0 {
            return Err(Error::InvalidConfig("capacity must be at least 1"));
        }
        if !(max_load > 0.0 && max_load <= C::LOAD_LIMIT) {
            return Err(Error::InvalidConfig("max load factor out of range"));
        }
        if !(growth.is_finite() && growth > 1.0) {
            return Err(Error::InvalidConfig("growth multiplier must exceed 1.0"));
        }
        if config.key_limit == Some(0) {
            return Err(Error::InvalidConfig("key limit must be at least 1 byte"));
        }
        let table = C::new_table(capacity, true)?;
        Ok(Self::assemble(config, hasher, table))
    }

    // Aborts on allocation failure, like the std collections.
    fn table_of(capacity: usize) -> C {
        match C::new_table(capacity, false) {
            Ok(t) => t,
            Err(e) => unreachable!("infallible table allocation failed: {e}"),
        }
    }

    // `config` is already validated.
    fn assemble(config: HashConfig, hasher: S, table: C) -> Self {
        Self {
            lock: OwnershipLock::with_strategy(config.strategy),
            table: RwLock::new(table),
            hasher: KeyHasher {
                build: hasher,
                limit: config.key_limit,
            },
            max_load: config.max_load.unwrap_or(C::DEFAULT_MAX_LOAD),
            growth: config.growth.unwrap_or(C::DEFAULT_GROWTH),
            count: AtomicUsize::new(0),
            strategy: config.strategy,
            diagnostics: config.diagnostics,
            on_destroy: None,
            reentrancy: DebugReentrancy::new(),
            _entries: PhantomData,
        }
    }

    /// Run `f` on every payload this table creates from a plain value, once
    /// its last reference is gone.
    pub fn with_destroy(mut self, f: impl Fn(&mut V) + Send + Sync + 'static) -> Self {
        self.on_destroy = Some(Arc::new(f));
        self
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    fn report(&self, anomaly: Anomaly) {
        if let Some(d) = &self.diagnostics {
            d(&anomaly);
        }
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.table.read().capacity()
    }

    pub fn load_factor(&self) -> f64 {
        let table = self.table.read();
        self.len() as f64 / table.capacity() as f64
    }

    pub fn max_load(&self) -> f64 {
        self.max_load
    }

    pub fn growth(&self) -> f64 {
        self.growth
    }

    pub fn index_method(&self) -> IndexMethod {
        self.table.read().index_method()
    }

    /// The container-wide lock; holding it groups several calls.
    pub fn lock(&self) -> &OwnershipLock {
        &self.lock
    }

    // Store a node into the current table, reporting anomalies.
    fn place(&self, table: &mut C, node: Arc<HashNode<K, V>>) -> Result<()> {
        let capacity = table.capacity();
        match table.place(node) {
            Ok(p) => {
                if p.abandoned {
                    tracing::warn!(capacity, evictions = p.evictions, "robin hood cascade abandoned");
                    self.report(Anomaly::CascadeAbandoned {
                        capacity,
                        evictions: p.evictions,
                    });
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(capacity, len = self.len(), "hash probing exhausted the table");
                self.report(Anomaly::ProbeExhausted {
                    capacity,
                    len: self.len(),
                });
                Err(e)
            }
        }
    }

    // Grow until `needed` entries fit under the max load factor.
    fn reserve_for(&self, needed: usize) -> Result<()> {
        let capacity = self.capacity();
        if needed as f64 <= capacity as f64 * self.max_load {
            return Ok(());
        }
        let mut target = capacity;
        while needed as f64 > target as f64 * self.max_load {
            let scaled = (target as f64 * self.growth).ceil();
            let next = target.checked_add(1).filter(|_| scaled < usize::MAX as f64);
            target = match next {
                Some(next) => (scaled as usize).max(next),
                None => return Err(Error::AllocationFailed { capacity: usize::MAX }),
            };
        }
        self.rebuild(target)
    }

    // Caller holds the container lock. The write side stays held until the
    // new array is in place, since placing rewrites the hop counts of nodes
    // the old array still shares.
    fn rebuild(&self, target: usize) -> Result<()> {
        let mut table = self.table.write();
        let nodes = table.nodes();
        let mut fresh = C::new_table(target, true)?;
        for n in nodes.iter() {
            self.place(&mut fresh, Arc::clone(n))?;
        }
        let old = core::mem::replace(&mut *table, fresh);
        drop(table);
        tracing::debug!(
            from = old.capacity(),
            to = target,
            entries = nodes.len(),
            "hash table grown"
        );
        Ok(())
    }

    /// Grow to at least `target` slots. Never shrinks.
    pub fn grow(&self, target: usize) -> Result<()> {
        let _g = self.lock.guard();
        if target <= self.capacity() {
            return Ok(());
        }
        self.rebuild(target)
    }

    /// Insert `key` with a new payload; fails with `DuplicateKey` if present.
    pub fn insert(&self, key: K, value: V) -> Result<Arc<HashNode<K, V>>> {
        let payload = Payload::wrap(value, self.on_destroy.as_ref());
        self.insert_payload(key, payload)
    }

    /// Insert `key` sharing an existing payload.
    pub fn insert_payload(&self, key: K, payload: Payload<V>) -> Result<Arc<HashNode<K, V>>> {
        let hash = self.make_hash(&key);
        let _g = self.lock.guard();
        {
            let _r = self.reentrancy.enter();
            if self.table.read().find(hash, &key).is_some() {
                return Err(Error::DuplicateKey);
            }
        }
        self.reserve_for(self.len() + 1)?;
        let node = HashNode::new(key, hash, payload, self.strategy);
        self.place(&mut self.table.write(), Arc::clone(&node))?;
        node.elem.set_removed(false);
        self.count.fetch_add(1, Ordering::AcqRel);
        Ok(node)
    }

    /// Insert a new entry with the key of `source`, sharing its payload.
    /// `source` may belong to any table.
    pub fn insert_copy(&self, source: &HashNode<K, V>) -> Result<Arc<HashNode<K, V>>>
    where
        K: Clone,
    {
        if source.is_destroyed() {
            return Err(Error::DestroyedElement("insert_copy"));
        }
        self.insert_payload(source.key().clone(), source.payload().clone())
    }

    pub fn find<Q>(&self, key: &Q) -> Option<Arc<HashNode<K, V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(key);
        let _r = self.reentrancy.enter();
        self.table.read().find(hash, key).cloned()
    }

    /// Payload stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Result<Payload<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(key)
            .map(|n| n.payload().clone())
            .ok_or(Error::KeyNotFound)
    }

    pub fn exists<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(key).is_some()
    }

    /// Hop count of the entry under `key`.
    pub fn hops<Q>(&self, key: &Q) -> Result<u32>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(key).map(|n| n.hops()).ok_or(Error::KeyNotFound)
    }

    /// Largest hop count across all entries.
    pub fn max_hops(&self) -> u32 {
        self.table
            .read()
            .nodes()
            .iter()
            .map(|n| n.hops())
            .max()
            .unwrap_or(0)
    }

    fn detach(&self, node: &Arc<HashNode<K, V>>) -> bool {
        if !self.table.write().take_node(node) {
            return false;
        }
        self.count.fetch_sub(1, Ordering::AcqRel);
        node.elem.destroy();
        true
    }

    /// Remove `key`, returning its payload.
    pub fn remove<Q>(&self, key: &Q) -> Result<Payload<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.lock.guard();
        let node = self.find(key).ok_or(Error::KeyNotFound)?;
        if !self.detach(&node) {
            return Err(Error::KeyNotFound);
        }
        Ok(node.payload().clone())
    }

    /// Remove the entry in the lowest occupied slot.
    pub fn pop_front(&self) -> Option<Arc<HashNode<K, V>>> {
        let _g = self.lock.guard();
        let node = self.table.read().first().cloned()?;
        self.detach(&node).then_some(node)
    }

    /// Remove the entry in the highest occupied slot.
    pub fn pop_back(&self) -> Option<Arc<HashNode<K, V>>> {
        let _g = self.lock.guard();
        let node = self.table.read().last().cloned()?;
        self.detach(&node).then_some(node)
    }

    /// Snapshot of all entries in slot order.
    pub fn entries(&self) -> Vec<Arc<HashNode<K, V>>> {
        self.table.read().nodes()
    }

    /// Drop every entry, keeping the current capacity.
    pub fn clear(&self) {
        let _g = self.lock.guard();
        let capacity = self.capacity();
        let fresh = Self::table_of(capacity);
        let old = core::mem::replace(&mut *self.table.write(), fresh);
        let nodes = old.nodes();
        for n in &nodes {
            n.elem.destroy();
        }
        self.count.store(0, Ordering::Release);
        if !nodes.is_empty() {
            tracing::debug!(capacity, entries = nodes.len(), "hash table cleared");
        }
    }

    /// Add copies of all entries of `other` whose keys are missing here.
    /// Payloads are shared. Returns the number of entries added.
    pub fn merge<C2, S2>(&self, other: &HashEngine<K, V, C2, S2>) -> Result<usize>
    where
        K: Clone,
        C2: Slots<K, V>,
        S2: BuildHasher,
    {
        let _both = MultiGuard::lock_all(&[&self.lock, &other.lock]);
        let mut added = 0;
        for n in other.entries() {
            match self.insert_copy(&n) {
                Ok(_) => added += 1,
                Err(Error::DuplicateKey) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    /// Remove every key that `other` holds. Returns the number removed.
    pub fn subtract<C2, S2>(&self, other: &HashEngine<K, V, C2, S2>) -> usize
    where
        C2: Slots<K, V>,
        S2: BuildHasher,
    {
        let _both = MultiGuard::lock_all(&[&self.lock, &other.lock]);
        other
            .entries()
            .iter()
            .filter(|n| self.remove(n.key()).is_ok())
            .count()
    }
}

impl<K, V, C, S> Drop for HashEngine<K, V, C, S> {
    fn drop(&mut self) {
        self.lock.destroy();
    }
}

impl<K, V, C, S> fmt::Debug for HashEngine<K, V, C, S>
where
    K: Eq + Hash,
    C: Slots<K, V>,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashEngine")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("max_load", &self.max_load)
            .field("growth", &self.growth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Default)]
    struct ConstBuildHasher;
    struct ConstHasher;
    impl BuildHasher for ConstBuildHasher {
        type Hasher = ConstHasher;
        fn build_hasher(&self) -> Self::Hasher {
            ConstHasher
        }
    }
    impl Hasher for ConstHasher {
        fn write(&mut self, _bytes: &[u8]) {}
        fn finish(&self) -> u64 {
            0
        } // every key collides
    }

    /// Invariant: the small open table keeps exact lookups through removal.
    #[test]
    fn open_hash_small_table_scenario() {
        let h: OpenHash<String, i32> =
            OpenHash::with_config(HashConfig::new().capacity(7).max_load(0.8)).unwrap();
        h.insert("a".to_string(), 1).unwrap();
        h.insert("b".to_string(), 2).unwrap();
        h.insert("c".to_string(), 3).unwrap();
        assert_eq!(h.len(), 3);
        assert_eq!(*h.get("b").unwrap(), 2);
        assert!(!h.exists("z"));

        assert_eq!(*h.remove("b").unwrap(), 2);
        assert_eq!(h.len(), 2);
        assert_eq!(h.get("b").unwrap_err(), Error::KeyNotFound);
        assert_eq!(*h.get("a").unwrap(), 1);
        assert_eq!(*h.get("c").unwrap(), 3);
    }

    /// Invariant: duplicate keys are rejected and the stored payload stays.
    #[test]
    fn duplicate_insert_rejected() {
        let h: ChainHash<String, i32> = ChainHash::new();
        h.insert("dup".to_string(), 1).unwrap();
        assert_eq!(
            h.insert("dup".to_string(), 2).unwrap_err(),
            Error::DuplicateKey
        );
        assert_eq!(*h.get("dup").unwrap(), 1);
        assert_eq!(h.len(), 1);
    }

    /// Invariant: defaults match the strategy and config is validated.
    #[test]
    fn defaults_and_validation() {
        let c: ChainHash<u32, u32> = ChainHash::new();
        assert_eq!(c.capacity(), 97);
        assert_eq!(c.max_load(), 3.0);
        assert_eq!(c.index_method(), IndexMethod::Division);
        let o: OpenHash<u32, u32> = OpenHash::new();
        assert_eq!(o.capacity(), 100);
        assert_eq!(o.growth(), 1.5);
        assert_eq!(o.index_method(), IndexMethod::Multiplication);

        let bad = |cfg: HashConfig| OpenHash::<u32, u32>::with_config(cfg).unwrap_err();
        assert!(matches!(bad(HashConfig::new().capacity(0)), Error::InvalidConfig(_)));
        assert!(matches!(bad(HashConfig::new().max_load(1.5)), Error::InvalidConfig(_)));
        assert!(matches!(bad(HashConfig::new().growth(1.0)), Error::InvalidConfig(_)));
        assert!(matches!(bad(HashConfig::new().key_limit(0)), Error::InvalidConfig(_)));
        assert!(ChainHash::<u32, u32>::with_config(HashConfig::new().max_load(5.0)).is_ok());
    }

    /// Invariant: the table grows before an insert would exceed the max load
    /// factor and every key stays reachable.
    #[test]
    fn grows_eagerly() {
        let h: OpenHash<u32, u32> =
            OpenHash::with_config(HashConfig::new().capacity(7).max_load(0.8)).unwrap();
        for k in 0..5 {
            h.insert(k, k).unwrap();
        }
        assert_eq!(h.capacity(), 7);
        h.insert(5, 5).unwrap();
        assert_eq!(h.capacity(), 11);
        for k in 0..200 {
            if k > 5 {
                h.insert(k, k).unwrap();
            }
            assert!(h.load_factor() <= 0.8);
        }
        for k in 0..200 {
            assert_eq!(*h.get(&k).unwrap(), k);
        }
        h.grow(5).unwrap();
        assert!(h.capacity() >= 250);
        h.grow(1000).unwrap();
        assert_eq!(h.capacity(), 1000);
    }

    /// Invariant: chained tables resolve heavy collisions and report chain
    /// positions as hops.
    #[test]
    fn collisions_with_const_hasher() {
        let h: ChainHash<String, i32, ConstBuildHasher> =
            ChainHash::with_hasher(ConstBuildHasher);
        for (i, k) in ["a", "b", "c"].iter().enumerate() {
            h.insert(k.to_string(), i as i32).unwrap();
        }
        assert_eq!(h.hops("a").unwrap(), 0);
        assert_eq!(h.hops("c").unwrap(), 2);
        h.remove("a").unwrap();
        assert_eq!(h.hops("c").unwrap(), 1);
        assert_eq!(h.hops("a").unwrap_err(), Error::KeyNotFound);
        assert_eq!(h.max_hops(), 1);

        let o: OpenHash<String, i32, ConstBuildHasher> =
            OpenHash::with_hasher(ConstBuildHasher);
        for k in ["x", "y", "z"] {
            o.insert(k.to_string(), 0).unwrap();
        }
        assert_eq!(o.len(), 3);
        assert!(o.exists("y"));
    }

    /// Invariant: with a key limit, keys that agree on the prefix hash alike
    /// but are still told apart by equality.
    #[test]
    fn key_limit_hashes_prefix_only() {
        let h: ChainHash<String, i32> =
            ChainHash::with_config(HashConfig::new().key_limit(4)).unwrap();
        let a = h.insert("prefix-one".to_string(), 1).unwrap();
        let b = h.insert("prefix-two".to_string(), 2).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(b.hops(), 1);
        assert_eq!(*h.get("prefix-two").unwrap(), 2);
    }

    /// Invariant: copies share the payload, which is destroyed once after
    /// the last table lets go of it.
    #[test]
    fn insert_copy_shares_payload() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h2 = hits.clone();
        let a: OpenHash<u32, String> = OpenHash::new().with_destroy(move |_| {
            h2.fetch_add(1, Ordering::SeqCst);
        });
        let b: ChainHash<u32, String> = ChainHash::new();
        let src = a.insert(1, "one".to_string()).unwrap();
        let copy = b.insert_copy(&src).unwrap();
        assert!(Payload::ptr_eq(src.payload(), copy.payload()));
        drop((src, copy));

        a.remove(&1).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        let dead = b.find(&1).unwrap();
        b.remove(&1).unwrap();
        assert_eq!(
            a.insert_copy(&dead).unwrap_err(),
            Error::DestroyedElement("insert_copy")
        );
        drop(dead);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// Invariant: pop_front/pop_back drain the table from its slot ends.
    #[test]
    fn pops_drain_in_slot_order() {
        let h: OpenHash<u32, u32> = OpenHash::new();
        for k in 0..10 {
            h.insert(k, k).unwrap();
        }
        let order: Vec<u32> = h.entries().iter().map(|n| *n.key()).collect();
        let first = h.pop_front().unwrap();
        let last = h.pop_back().unwrap();
        assert_eq!(*first.key(), order[0]);
        assert_eq!(*last.key(), order[9]);
        assert!(first.is_removed() && last.is_destroyed());
        assert_eq!(h.len(), 8);
        while h.pop_front().is_some() {}
        assert!(h.is_empty());
        assert!(h.pop_back().is_none());
    }

    /// Invariant: merge adds only missing keys; subtract removes shared ones.
    #[test]
    fn merge_and_subtract() {
        let a: ChainHash<u32, u32> = ChainHash::new();
        let b: OpenHash<u32, u32> = OpenHash::new();
        for k in 0..4 {
            a.insert(k, k).unwrap();
        }
        for k in 2..6 {
            b.insert(k, k * 100).unwrap();
        }
        assert_eq!(a.merge(&b).unwrap(), 2);
        assert_eq!(a.len(), 6);
        assert_eq!(*a.get(&3).unwrap(), 3);
        assert_eq!(*a.get(&5).unwrap(), 500);
        assert_eq!(a.subtract(&b), 4);
        let mut left: Vec<u32> = a.entries().iter().map(|n| *n.key()).collect();
        left.sort();
        assert_eq!(left, vec![0, 1]);
    }

    /// Invariant: clear keeps capacity and empties the table.
    #[test]
    fn clear_keeps_capacity() {
        let h: OpenHash<u32, u32> =
            OpenHash::with_config(HashConfig::new().capacity(7)).unwrap();
        for k in 0..20 {
            h.insert(k, k).unwrap();
        }
        let cap = h.capacity();
        let held = h.find(&3).unwrap();
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.capacity(), cap);
        assert!(held.is_destroyed());
        assert!(!h.exists(&3));
        h.insert(3, 33).unwrap();
        assert_eq!(*h.get(&3).unwrap(), 33);
    }

    /// Invariant: exhaustion reaches the diagnostics hook.
    #[test]
    fn diagnostics_hook_sees_exhaustion() {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let h: OpenHash<u32, u32, ConstBuildHasher> = OpenHash::with_config_and_hasher(
            HashConfig::new()
                .capacity(3)
                .max_load(1.0)
                .diagnostics(move |a| {
                    if matches!(a, Anomaly::ProbeExhausted { .. }) {
                        s.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            ConstBuildHasher,
        )
        .unwrap();
        for k in 0..3 {
            h.insert(k, k).unwrap();
        }
        // Eager growth keeps the table from ever filling up.
        h.insert(3, 3).unwrap();
        assert!(h.capacity() > 3);
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        let mut full = OpenSlots::<u32, u32>::new_table(1, true).unwrap();
        full.place(HashNode::new(0, 0, Payload::new(0), LockStrategy::Park))
            .unwrap();
        let err = h
            .place(&mut full, HashNode::new(1, 0, Payload::new(1), LockStrategy::Park))
            .unwrap_err();
        assert_eq!(err, Error::ProbeExhausted { capacity: 1 });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    /// Invariant (debug-only): calling back into the table from `K: Eq`
    /// panics instead of deadlocking.
    #[cfg(debug_assertions)]
    #[test]
    fn reentrancy_panics_from_eq_during_find() {
        use std::sync::OnceLock;

        static TABLE: OnceLock<ChainHash<ReentryKey, i32, ConstBuildHasher>> = OnceLock::new();

        #[derive(Debug)]
        struct ReentryKey(&'static str);
        impl PartialEq for ReentryKey {
            fn eq(&self, other: &Self) -> bool {
                if other.0 == "trigger" {
                    if let Some(t) = TABLE.get() {
                        let _ = t.exists(&ReentryKey("x"));
                    }
                }
                self.0 == other.0
            }
        }
        impl Eq for ReentryKey {}
        impl Hash for ReentryKey {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state)
            }
        }

        let t = TABLE.get_or_init(|| ChainHash::with_hasher(ConstBuildHasher));
        t.insert(ReentryKey("a"), 1).unwrap();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            t.exists(&ReentryKey("trigger"));
        }));
        assert!(res.is_err(), "expected reentrancy panic");
    }

    /// Invariant: a load factor too small for any table size fails the
    /// insert instead of overflowing the growth target.
    #[test]
    fn unreachable_load_factor_fails_cleanly() {
        let h: OpenHash<u32, u32> =
            OpenHash::with_config(HashConfig::new().capacity(1).max_load(1e-20)).unwrap();
        assert_eq!(
            h.insert(1, 1).unwrap_err(),
            Error::AllocationFailed { capacity: usize::MAX }
        );
        assert!(h.is_empty());
        assert!(!h.exists(&1));
    }

    /// Invariant: readers never observe hop counts from a half-built array.
    /// With every key colliding, the hop counts of a consistent table are
    /// exactly 0..len.
    #[test]
    fn growth_publishes_hops_with_the_new_array() {
        let h: Arc<OpenHash<u32, u32, ConstBuildHasher>> = Arc::new(
            OpenHash::with_config_and_hasher(HashConfig::new().capacity(2), ConstBuildHasher)
                .unwrap(),
        );
        let done = Arc::new(core::sync::atomic::AtomicBool::new(false));
        let reader = {
            let (h, done) = (Arc::clone(&h), Arc::clone(&done));
            std::thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let mut hops: Vec<u32> =
                        h.table.read().nodes().iter().map(|n| n.hops()).collect();
                    hops.sort_unstable();
                    let want: Vec<u32> = (0..hops.len() as u32).collect();
                    assert_eq!(hops, want);
                }
            })
        };
        for k in 0..300 {
            h.insert(k, k).unwrap();
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap();
        assert_eq!(h.max_hops(), 299);
    }
}
