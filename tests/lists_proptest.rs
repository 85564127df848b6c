use lockable_collections::{Closure, Error, LinkedEngine};
use proptest::prelude::*;
use std::collections::VecDeque;

// Model a linked container with a VecDeque and check order, length, index
// access and both end pointers after every operation.
proptest! {
    #[test]
    fn prop_linked_engine_matches_deque(
        ring in any::<bool>(),
        ops in proptest::collection::vec((0u8..=7u8, any::<i16>(), -20isize..20), 1..150),
    ) {
        let closure = if ring { Closure::Ring } else { Closure::Linear };
        let list: LinkedEngine<i16> = LinkedEngine::new(closure);
        let mut model: VecDeque<i16> = VecDeque::new();

        for (op, value, index) in ops {
            match op {
                0 => {
                    list.push_back(value).unwrap();
                    model.push_back(value);
                }
                1 => {
                    list.push_front(value).unwrap();
                    model.push_front(value);
                }
                2 => {
                    prop_assert_eq!(list.pop_front().map(|p| *p), model.pop_front());
                }
                3 => {
                    prop_assert_eq!(list.pop_back().map(|p| *p), model.pop_back());
                }
                // Insert after / before the node at a wrapped index
                4 | 5 => match list.get(index) {
                    Some(anchor) => {
                        let at = index.rem_euclid(model.len() as isize) as usize;
                        if op == 4 {
                            list.insert_next(&anchor, value).unwrap();
                            model.insert(at + 1, value);
                        } else {
                            list.insert_prev(&anchor, value).unwrap();
                            model.insert(at, value);
                        }
                    }
                    None => prop_assert!(model.is_empty()),
                },
                // Remove the node at a wrapped index, then try again
                6 => match list.get(index) {
                    Some(node) => {
                        let at = index.rem_euclid(model.len() as isize) as usize;
                        prop_assert_eq!(*list.remove(&node).unwrap(), model.remove(at).unwrap());
                        prop_assert_eq!(list.remove(&node).unwrap_err(), Error::ElementNotFound);
                    }
                    None => prop_assert!(model.is_empty()),
                },
                // Index lookup
                7 => match list.get(index) {
                    Some(node) => {
                        let at = index.rem_euclid(model.len() as isize) as usize;
                        prop_assert_eq!(*node.data(), model[at]);
                        prop_assert_eq!(node.nr(), at);
                    }
                    None => prop_assert!(model.is_empty()),
                },
                _ => unreachable!(),
            }

            prop_assert_eq!(list.len(), model.len());
            prop_assert_eq!(list.to_vec(), model.iter().copied().collect::<Vec<_>>());
            prop_assert_eq!(list.head().map(|n| *n.data()), model.front().copied());
            prop_assert_eq!(list.tail().map(|n| *n.data()), model.back().copied());
            if ring {
                if let (Some(h), Some(t)) = (list.head(), list.tail()) {
                    prop_assert!(std::sync::Arc::ptr_eq(&t.next().unwrap(), &h));
                    prop_assert!(std::sync::Arc::ptr_eq(&h.prev().unwrap(), &t));
                }
            }
        }
    }
}
