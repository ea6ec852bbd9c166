//! Model-based properties: every arena collection must behave like its std
//! counterpart, whatever strategy backs it.

use std::collections::{BTreeMap, HashMap};

use dissect_mem::collections::{Array, Map, SplayTree};
use dissect_mem::hash::HashSeeds;
use dissect_mem::{Allocator, AllocatorKind};
use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
enum Op {
    Insert(u16, u32),
    Remove(u16),
    Get(u16),
}

fn arb_kind() -> impl Strategy<Value = AllocatorKind> {
    prop::sample::select(AllocatorKind::ALL.to_vec())
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        4 => (any::<u16>(), any::<u32>()).prop_map(|(k, v)| Op::Insert(k % 512, v)),
        1 => any::<u16>().prop_map(|k| Op::Remove(k % 512)),
        2 => any::<u16>().prop_map(|k| Op::Get(k % 512)),
    ];
    prop::collection::vec(op, 0..400)
}

proptest! {
    #[test]
    fn array_matches_vec(
        kind in arb_kind(),
        capacity in 0usize..8,
        chunks in prop::collection::vec(prop::collection::vec(any::<u32>(), 0..20), 0..20),
        terminated in any::<bool>(),
    ) {
        let allocator = Allocator::new(kind);
        let mut array = Array::with_capacity(&allocator, capacity);
        array.set_null_terminator(terminated);
        let mut model = Vec::new();

        for chunk in &chunks {
            array.append(chunk);
            model.extend_from_slice(chunk);

            prop_assert_eq!(array.len(), model.len());
            prop_assert!(array.capacity() >= array.len() + usize::from(terminated));
            let base = capacity.max(1);
            prop_assert!(array.capacity() % base == 0 && (array.capacity() / base).is_power_of_two());
            if terminated {
                let terminator = unsafe { array.as_ptr().add(array.len()).read() };
                prop_assert_eq!(terminator, 0);
            }
        }
        prop_assert_eq!(array.to_vec(), model);
    }

    #[test]
    fn map_matches_hashmap(kind in arb_kind(), ops in arb_ops()) {
        let allocator = Allocator::new(kind);
        let mut map = Map::new(&allocator);
        let mut model = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => prop_assert_eq!(map.insert(k, v), model.insert(k, v)),
                Op::Remove(k) => prop_assert_eq!(map.remove(&k), model.remove(&k)),
                Op::Get(k) => prop_assert_eq!(map.get(&k), model.get(&k).copied()),
            }
            prop_assert_eq!(map.len(), model.len());
            prop_assert!(map.len() < map.bucket_count());
        }

        let mut entries = map.to_vec();
        entries.sort_unstable();
        let mut expected: Vec<_> = model.into_iter().collect();
        expected.sort_unstable();
        prop_assert_eq!(entries, expected);
    }

    #[test]
    fn splay_matches_btreemap(kind in arb_kind(), ops in arb_ops(), probes in prop::collection::vec(0u16..600, 1..30)) {
        let allocator = Allocator::new(kind);
        let mut tree = SplayTree::new(&allocator);
        let mut model = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => prop_assert_eq!(tree.insert(k, v), model.insert(k, v)),
                Op::Remove(k) => prop_assert_eq!(tree.remove(&k), model.remove(&k)),
                Op::Get(k) => prop_assert_eq!(tree.get(&k), model.get(&k).copied()),
            }
        }
        prop_assert_eq!(tree.len(), model.len());

        for probe in probes {
            let le = model.range(..=probe).next_back().map(|(k, v)| (*k, *v));
            let ge = model.range(probe..).next().map(|(k, v)| (*k, *v));
            prop_assert_eq!(tree.get_le(&probe), le);
            prop_assert_eq!(tree.get_ge(&probe), ge);
        }

        let in_order: Vec<_> = model.into_iter().collect();
        prop_assert_eq!(tree.to_vec(), in_order);
    }

    #[test]
    fn strong_hash_is_stable_within_a_seed_set(seed in any::<u64>(), key in prop::collection::vec(any::<u8>(), 0..64)) {
        let seeds = HashSeeds::from_rng(&mut SmallRng::seed_from_u64(seed));
        let again = HashSeeds::from_rng(&mut SmallRng::seed_from_u64(seed));
        prop_assert_eq!(seeds, again);
        prop_assert_eq!(seeds.strong_hash(&key), again.strong_hash(&key));
        prop_assert_eq!(seeds.multiplier & 1, 1);
    }
}

#[test]
fn strong_hash_differs_across_seed_sets() {
    let key = b"10.0.0.1:1883->10.0.0.2:51234";
    let hashes: std::collections::HashSet<u32> = (0..32u64)
        .map(|seed| HashSeeds::from_rng(&mut SmallRng::seed_from_u64(seed)).strong_hash(key))
        .collect();
    assert!(hashes.len() > 16);
}
