//! Identity-hashed map over direct keys: growth from the default order and
//! lookups across the resize.

use dissect_mem::collections::Map;
use dissect_mem::hash::direct_hash;
use dissect_mem::{Allocator, AllocatorKind};

fn identity(key: &u32) -> u32 {
    direct_hash(*key)
}

fn same(a: &u32, b: &u32) -> bool {
    a == b
}

#[test]
fn test_identity_map_grows_and_finds_every_key() {
    for kind in AllocatorKind::ALL {
        let allocator = Allocator::named(kind, "scenario");
        let mut map = Map::with_fns(&allocator, identity, same);
        assert_eq!(map.capacity_order(), 5);

        for key in 0..64u32 {
            assert_eq!(map.insert(key, key ^ 0xFFFF), None);
        }

        assert!(map.capacity_order() >= 6, "{kind}: order {}", map.capacity_order());
        assert!(map.len() < map.bucket_count());
        assert_eq!(map.len(), 64);
        assert_eq!(map.get(&37), Some(37 ^ 0xFFFF));
        assert_eq!(map.get(&64), None);
        for key in 0..64u32 {
            assert!(map.contains_key(&key), "{kind}: key {key}");
        }
    }
}

#[test]
fn test_repeated_growth_keeps_every_entry() {
    for kind in AllocatorKind::ALL {
        let allocator = Allocator::named(kind, "scenario");
        let mut map = Map::with_fns(&allocator, identity, same);

        for key in 0..256u32 {
            map.insert(key, key * 3);
        }

        assert!(map.capacity_order() >= 8, "{kind}: order {}", map.capacity_order());
        assert_eq!(map.len(), 256);
        for key in 0..256u32 {
            assert_eq!(map.get(&key), Some(key * 3), "{kind}: key {key}");
        }
        assert_eq!(map.get(&256), None);
    }
}

#[test]
fn test_string_keys_use_strong_hash() {
    let allocator = Allocator::new(AllocatorKind::Block);
    let mut map = Map::new(&allocator);
    let names = ["eth", "ip", "ipv6", "tcp", "udp", "dns", "http", "mqtt", "coap"];
    for (index, name) in names.iter().enumerate() {
        map.insert(*name, index);
    }
    for (index, name) in names.iter().enumerate() {
        assert_eq!(map.get_key_value(name), Some((*name, index)));
    }
    assert_eq!(map.get(&"quic"), None);
}
