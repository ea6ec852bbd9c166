//! ## dissect-mem::collections::map
//! **Chained hash map with universal hashing**
//!
//! Buckets are picked by multiply-shift hashing: the key's 32-bit hash is
//! multiplied by a per-process odd multiplier and the top `order` bits index
//! a table of `2^order` chain heads. The table starts at order 5, is
//! allocated on the first insert, and doubles as soon as the item count
//! reaches the bucket count.
//!
//! An auto-reset map ([`Map::new_autoreset`]) keeps its items in a `data`
//! arena and empties itself whenever that arena is bulk-freed, while its
//! lifetime follows an `owner` arena.

use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::alloc::{AttachRole, Allocator, ScopedStructure};
use crate::hash::{self, direct_hash, int64_hash, strong_hash};

const DEFAULT_ORDER: u32 = 5;

/// Default hashing and equality for map keys.
pub trait KeyHash: Copy {
    fn key_hash(&self) -> u32;

    fn key_eq(&self, other: &Self) -> bool;
}

macro_rules! direct_key_hash {
    ($($ty:ty),*) => {$(
        impl KeyHash for $ty {
            fn key_hash(&self) -> u32 {
                direct_hash(*self as u32)
            }

            fn key_eq(&self, other: &Self) -> bool {
                self == other
            }
        }
    )*};
}

macro_rules! wide_key_hash {
    ($($ty:ty),*) => {$(
        impl KeyHash for $ty {
            fn key_hash(&self) -> u32 {
                int64_hash(*self as u64)
            }

            fn key_eq(&self, other: &Self) -> bool {
                self == other
            }
        }
    )*};
}

direct_key_hash!(u8, u16, u32, i8, i16, i32, char, bool);
wide_key_hash!(u64, i64, usize, isize);

impl KeyHash for &str {
    fn key_hash(&self) -> u32 {
        hash::str_hash(self)
    }

    fn key_eq(&self, other: &Self) -> bool {
        self == other
    }
}

impl KeyHash for &[u8] {
    fn key_hash(&self) -> u32 {
        strong_hash(self)
    }

    fn key_eq(&self, other: &Self) -> bool {
        self == other
    }
}

type Link<K, V> = Option<NonNull<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    next: Link<K, V>,
}

struct MapCore<K, V> {
    owner: Option<Allocator>,
    data: Allocator,
    hash: fn(&K) -> u32,
    eq: fn(&K, &K) -> bool,
    multiplier: u32,
    table: Cell<Option<NonNull<Link<K, V>>>>,
    order: Cell<u32>,
    count: Cell<usize>,
    generation: Cell<u64>,
    detached: Cell<bool>,
    this: Weak<MapCore<K, V>>,
}

impl<K, V> MapCore<K, V> {
    fn check(&self) {
        assert!(
            !self.detached.get(),
            "map used after its owner allocator '{}' was freed",
            self.owner.as_ref().map_or("?", Allocator::label)
        );
        self.data.assert_generation(self.generation.get(), "map");
    }

    fn buckets(&self) -> usize {
        1 << self.order.get()
    }

    fn bucket_of(&self, key: &K, order: u32) -> usize {
        ((self.hash)(key).wrapping_mul(self.multiplier) >> (32 - order)) as usize
    }

    /// Pointer to the chain head for `key`, if the table exists.
    fn head(&self, key: &K) -> Option<*mut Link<K, V>> {
        let table = self.table.get()?;
        let index = self.bucket_of(key, self.order.get());
        // SAFETY: `index < 2^order`, the table length.
        Some(unsafe { table.as_ptr().add(index) })
    }

    fn find(&self, key: &K) -> Option<NonNull<Node<K, V>>> {
        let head = self.head(key)?;
        // SAFETY: chains only hold live nodes of the current generation.
        let mut cursor = unsafe { *head };
        while let Some(node) = cursor {
            let node_ref = unsafe { node.as_ref() };
            if (self.eq)(&node_ref.key, key) {
                return Some(node);
            }
            cursor = node_ref.next;
        }
        None
    }

    fn ensure_table(&self) -> NonNull<Link<K, V>> {
        match self.table.get() {
            Some(table) => table,
            None => {
                let table = self.data.alloc_slice_zeroed::<Link<K, V>>(self.buckets());
                self.table.set(Some(table));
                table
            }
        }
    }

    fn grow(&self, table: NonNull<Link<K, V>>) {
        let old_buckets = self.buckets();
        let order = self.order.get() + 1;
        let grown = self.data.alloc_slice_zeroed::<Link<K, V>>(1 << order);
        for index in 0..old_buckets {
            // SAFETY: both tables are live; every node is relinked exactly once.
            let mut cursor = unsafe { *table.as_ptr().add(index) };
            while let Some(mut node) = cursor {
                let node = unsafe { node.as_mut() };
                cursor = node.next;
                let slot = unsafe { &mut *grown.as_ptr().add(self.bucket_of(&node.key, order)) };
                node.next = *slot;
                *slot = Some(NonNull::from(node));
            }
        }
        // SAFETY: the old table is no longer referenced.
        unsafe { self.data.free_value(table) };
        self.table.set(Some(grown));
        self.order.set(order);
        debug!(arena = %self.data.label(), order, items = self.count.get(), "map grown");
    }

    fn for_each_node(&self, mut f: impl FnMut(&mut Node<K, V>)) {
        let Some(table) = self.table.get() else {
            return;
        };
        for index in 0..self.buckets() {
            let mut cursor = unsafe { *table.as_ptr().add(index) };
            while let Some(mut node) = cursor {
                // SAFETY: chains hold live nodes; `next` is read before `f`.
                let node = unsafe { node.as_mut() };
                cursor = node.next;
                f(node);
            }
        }
    }

    fn clear_state(&self) {
        self.table.set(None);
        self.order.set(DEFAULT_ORDER);
        self.count.set(0);
    }
}

impl<K: 'static, V: 'static> ScopedStructure for MapCore<K, V> {
    fn reset(&self) {
        self.clear_state();
        self.generation.set(self.data.generation());
    }

    fn on_owner_dropped(&self) {
        self.detached.set(true);
        self.clear_state();
        let this: Weak<dyn ScopedStructure> = self.this.clone();
        self.data.detach(&this);
        if let Some(owner) = &self.owner {
            owner.detach(&this);
        }
    }
}

impl<K, V> Drop for MapCore<K, V> {
    fn drop(&mut self) {
        if self.detached.get()
            || !self.data.is_current(self.generation.get())
            || !self.data.kind().reclaims_frees()
        {
            return;
        }
        let data = &self.data;
        self.for_each_node(|node| unsafe { data.free_value(NonNull::from(node)) });
        if let Some(table) = self.table.take() {
            // SAFETY: the table belongs to the current generation.
            unsafe { data.free_value(table) };
        }
    }
}

/// Hash map whose entries live in an arena.
///
/// Keys and values are `Copy`; lookups hand out copies, so nothing borrowed
/// from the arena outlives a call.
pub struct Map<K: Copy, V: Copy> {
    core: Rc<MapCore<K, V>>,
}

impl<K: KeyHash, V: Copy> Map<K, V> {
    /// Creates a map using the key type's [`KeyHash`] functions.
    pub fn new(allocator: &Allocator) -> Self {
        Self::with_fns(allocator, K::key_hash, K::key_eq)
    }
}

impl<K: KeyHash + 'static, V: Copy + 'static> Map<K, V> {
    /// Creates an auto-reset map: bookkeeping follows `owner`, entries live
    /// in `data` and vanish whenever `data` is bulk-freed.
    pub fn new_autoreset(owner: &Allocator, data: &Allocator) -> Self {
        Self::autoreset_with_fns(owner, data, K::key_hash, K::key_eq)
    }
}

impl<K: Copy + 'static, V: Copy + 'static> Map<K, V> {
    pub fn autoreset_with_fns(
        owner: &Allocator,
        data: &Allocator,
        hash: fn(&K) -> u32,
        eq: fn(&K, &K) -> bool,
    ) -> Self {
        let map = Self::build(Some(owner.clone()), data, hash, eq);
        let weak = Rc::downgrade(&map.core);
        let target: Weak<dyn ScopedStructure> = weak;
        owner.attach(AttachRole::Owner, target.clone());
        data.attach(AttachRole::Data, target);
        map
    }
}

impl<K: Copy, V: Copy> Map<K, V> {
    /// Creates a map with explicit hash and equality functions.
    pub fn with_fns(allocator: &Allocator, hash: fn(&K) -> u32, eq: fn(&K, &K) -> bool) -> Self {
        Self::build(None, allocator, hash, eq)
    }

    fn build(
        owner: Option<Allocator>,
        data: &Allocator,
        hash: fn(&K) -> u32,
        eq: fn(&K, &K) -> bool,
    ) -> Self {
        let core = Rc::new_cyclic(|this| MapCore {
            owner,
            data: data.clone(),
            hash,
            eq,
            multiplier: hash::seeds().multiplier,
            table: Cell::new(None),
            order: Cell::new(DEFAULT_ORDER),
            count: Cell::new(0),
            generation: Cell::new(data.generation()),
            detached: Cell::new(false),
            this: this.clone(),
        });
        Self { core }
    }

    pub fn len(&self) -> usize {
        self.core.check();
        self.core.count.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// log2 of the bucket count.
    pub fn capacity_order(&self) -> u32 {
        self.core.order.get()
    }

    pub fn bucket_count(&self) -> usize {
        self.core.buckets()
    }

    /// Inserts or replaces; returns the previous value for `key`.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let core = &*self.core;
        core.check();
        let table = core.ensure_table();
        if let Some(mut node) = core.find(&key) {
            // SAFETY: `find` returns live nodes.
            let node = unsafe { node.as_mut() };
            return Some(std::mem::replace(&mut node.value, value));
        }
        let index = core.bucket_of(&key, core.order.get());
        // SAFETY: `index` is inside the table.
        let head = unsafe { &mut *table.as_ptr().add(index) };
        let node = core.data.alloc_value(Node {
            key,
            value,
            next: *head,
        });
        *head = Some(node);
        core.count.set(core.count.get() + 1);
        if core.count.get() >= core.buckets() {
            core.grow(table);
        }
        None
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_key_value(key).map(|(_, value)| value)
    }

    /// Returns the stored key along with the value.
    pub fn get_key_value(&self, key: &K) -> Option<(K, V)> {
        self.core.check();
        self.core.find(key).map(|node| {
            // SAFETY: `find` returns live nodes.
            let node = unsafe { node.as_ref() };
            (node.key, node.value)
        })
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get_key_value(key).is_some()
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let core = &*self.core;
        core.check();
        let mut link = core.head(key)?;
        // SAFETY: `link` always points at a live chain slot.
        unsafe {
            while let Some(node) = *link {
                let node_ref = &mut *node.as_ptr();
                if (core.eq)(&node_ref.key, key) {
                    *link = node_ref.next;
                    let value = node_ref.value;
                    core.data.free_value(node);
                    core.count.set(core.count.get() - 1);
                    return Some(value);
                }
                link = &mut node_ref.next as *mut _;
            }
        }
        None
    }

    /// Calls `f` on every entry, in bucket order.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        self.core.check();
        let _pin = self.core.data.pin();
        self.core.for_each_node(|node| f(&node.key, &node.value));
    }

    /// Keeps only the entries for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        let core = &*self.core;
        core.check();
        let Some(table) = core.table.get() else {
            return;
        };
        let _pin = core.data.pin();
        for index in 0..core.buckets() {
            // SAFETY: same chain walk as `remove`, over every bucket.
            unsafe {
                let mut link: *mut Link<K, V> = table.as_ptr().add(index);
                while let Some(node) = *link {
                    let node_ref = &mut *node.as_ptr();
                    if f(&node_ref.key, &mut node_ref.value) {
                        link = &mut node_ref.next as *mut _;
                    } else {
                        *link = node_ref.next;
                        core.data.free_value(node);
                        core.count.set(core.count.get() - 1);
                    }
                }
            }
        }
    }

    pub fn to_vec(&self) -> Vec<(K, V)> {
        let mut entries = Vec::with_capacity(self.len());
        self.for_each(|key, value| entries.push((*key, *value)));
        entries
    }
}

impl<K: Copy + fmt::Debug, V: Copy + fmt::Debug> fmt::Debug for Map<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.for_each(|key, value| {
            map.entry(key, value);
        });
        map.finish()
    }
}
