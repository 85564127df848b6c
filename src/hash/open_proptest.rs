#![cfg(test)]

// Property tests for the hash tables kept inside the crate so they can look
// at slot layout and hop counts directly.

use super::index::multiplicative;
use super::open::{OpenSlots, Slot};
use super::{ChainHash, HashConfig, HashNode, OpenHash, Slots};
use crate::error::Error;
use crate::lock::LockStrategy;
use crate::payload::Payload;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Op {
    Insert(u16, u32),
    Remove(u16),
    Get(u16),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u16..64, any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        1 => (0u16..64).prop_map(Op::Remove),
        1 => (0u16..64).prop_map(Op::Get),
    ]
}

proptest! {
    // Insert-only placement: an entry with `h` hops passed, at every probe
    // step `s` with 1 < s < h, a resident that it was not entitled to
    // evict (resident hops >= s - 1). Everything stays findable.
    #[test]
    fn prop_robin_hood_entitlement(
        capacity in 5usize..60,
        hashes in proptest::collection::vec(any::<u64>(), 1..60),
    ) {
        let mut t = OpenSlots::<u32, ()>::new_table(capacity, true).unwrap();
        let take = hashes.len().min(capacity * 3 / 4);
        let mut nodes = Vec::new();
        let mut abandoned = false;
        for (k, h) in hashes.into_iter().take(take).enumerate() {
            let n = HashNode::new(k as u32, h, Payload::new(()), LockStrategy::Park);
            let report = t.place(Arc::clone(&n)).unwrap();
            abandoned |= report.abandoned;
            nodes.push(n);
        }
        for n in &nodes {
            let hops = n.hops() as usize;
            prop_assert!(hops < capacity);
            let (base, step) = t.probe(n.hash());
            prop_assert_eq!(base, multiplicative(n.hash(), capacity));
            // An abandoned cascade places its carry without evicting.
            for s in (2..hops).filter(|_| !abandoned) {
                let pos = (base + s * step) % capacity;
                match t.slot(pos) {
                    Slot::Occupied(r) => prop_assert!(r.hops() as usize >= s - 1),
                    _ => prop_assert!(false, "hole on a probe path at step {}", s),
                }
            }
            let found = t.find(n.hash(), n.key()).unwrap();
            prop_assert!(Arc::ptr_eq(found, n));
        }
    }

    // Both tables agree with a HashMap model under mixed operations,
    // starting small so growth happens along the way.
    #[test]
    fn prop_tables_match_model(ops in proptest::collection::vec(op(), 1..200)) {
        let open: OpenHash<u16, u32> =
            OpenHash::with_config(HashConfig::new().capacity(3)).unwrap();
        let chain: ChainHash<u16, u32> =
            ChainHash::with_config(HashConfig::new().capacity(2).max_load(1.5)).unwrap();
        let mut model: HashMap<u16, u32> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    let fresh = !model.contains_key(&k);
                    for res in [open.insert(k, v).map(|_| ()), chain.insert(k, v).map(|_| ())] {
                        if fresh {
                            prop_assert!(res.is_ok());
                        } else {
                            prop_assert_eq!(res, Err(Error::DuplicateKey));
                        }
                    }
                    model.entry(k).or_insert(v);
                }
                Op::Remove(k) => {
                    let want = model.remove(&k);
                    prop_assert_eq!(open.remove(&k).ok().map(|p| *p), want);
                    prop_assert_eq!(chain.remove(&k).ok().map(|p| *p), want);
                }
                Op::Get(k) => {
                    let want = model.get(&k).copied();
                    prop_assert_eq!(open.get(&k).ok().map(|p| *p), want);
                    prop_assert_eq!(chain.get(&k).ok().map(|p| *p), want);
                }
            }
            prop_assert_eq!(open.len(), model.len());
            prop_assert_eq!(chain.len(), model.len());
            prop_assert!(open.load_factor() <= open.max_load());
            prop_assert!(open.max_hops() < open.capacity() as u32);
        }
        for (k, v) in &model {
            prop_assert_eq!(*open.get(k).unwrap(), *v);
            prop_assert_eq!(*chain.get(k).unwrap(), *v);
        }
    }
}
