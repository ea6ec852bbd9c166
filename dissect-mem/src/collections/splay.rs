//! ## dissect-mem::collections::splay
//! **Ordered map using independent semi-splaying**
//!
//! Every search restructures the path it walks: each grandparent, parent and
//! child triple on the way down gets one double rotation, roughly halving the
//! depth of the nodes along the path. Frequently used keys drift towards the
//! root without the cost of a full splay, and the tree stays balanced in the
//! amortized sense.
//!
//! Like [`Map`](super::Map), a tree can run in auto-reset mode: its
//! bookkeeping follows a master arena while the nodes live in a slave arena
//! and vanish whenever that arena is bulk-freed.

use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::ops::ControlFlow;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

use crate::alloc::{AttachRole, Allocator, ScopedStructure};

type Link<K, V> = Option<NonNull<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    /// Child slot in direction `ord` (`Less` = left).
    fn child(&mut self, ord: Ordering) -> &mut Link<K, V> {
        if ord == Ordering::Less {
            &mut self.left
        } else {
            &mut self.right
        }
    }
}

enum Slot<K, V> {
    Occupied(*mut Link<K, V>, NonNull<Node<K, V>>),
    Vacant(*mut Link<K, V>),
}

struct TreeCore<K, V> {
    master: Option<Allocator>,
    data: Allocator,
    cmp: fn(&K, &K) -> Ordering,
    root: Cell<Link<K, V>>,
    count: Cell<usize>,
    generation: Cell<u64>,
    detached: Cell<bool>,
    this: Weak<TreeCore<K, V>>,
}

impl<K, V> TreeCore<K, V> {
    fn check(&self) {
        assert!(
            !self.detached.get(),
            "splay tree used after its master allocator '{}' was freed",
            self.master.as_ref().map_or("?", Allocator::label)
        );
        self.data.assert_generation(self.generation.get(), "splay tree");
    }

    /// Descends towards `key`, semi-splaying the path, and returns the slot
    /// that holds or would hold it.
    fn splay_search(&self, key: &K) -> Slot<K, V> {
        let mut link: *mut Link<K, V> = self.root.as_ptr();
        // SAFETY: `link` always points at a live slot (the root cell or a
        // child field of a live node); nodes are only relinked, never freed.
        unsafe {
            loop {
                let Some(mut grand) = *link else {
                    return Slot::Vacant(link);
                };
                let d1 = (self.cmp)(key, &grand.as_ref().key);
                if d1 == Ordering::Equal {
                    return Slot::Occupied(link, grand);
                }
                let grand_child: *mut Link<K, V> = grand.as_mut().child(d1);
                let Some(mut parent) = *grand_child else {
                    return Slot::Vacant(grand_child);
                };
                let d2 = (self.cmp)(key, &parent.as_ref().key);
                if d2 == Ordering::Equal {
                    return Slot::Occupied(grand_child, parent);
                }
                let parent_child: *mut Link<K, V> = parent.as_mut().child(d2);
                let Some(mut child) = *parent_child else {
                    return Slot::Vacant(parent_child);
                };
                let opposite = d1.reverse();

                if d1 == d2 {
                    // zig-zig: parent rises above grand, search continues
                    // below parent towards child.
                    *grand.as_mut().child(d1) = *parent.as_mut().child(opposite);
                    *parent.as_mut().child(opposite) = Some(grand);
                    *link = Some(parent);
                    link = parent.as_mut().child(d1) as *mut _;
                } else {
                    // zig-zag: child rises above both, search resumes at it.
                    *parent.as_mut().child(d2) = *child.as_mut().child(d1);
                    *grand.as_mut().child(d1) = *child.as_mut().child(opposite);
                    *child.as_mut().child(d1) = Some(parent);
                    *child.as_mut().child(opposite) = Some(grand);
                    *link = Some(child);
                }
            }
        }
    }

    /// Plain descent returning the closest node on the `side` of `key`.
    fn nearest(&self, key: &K, side: Ordering) -> Option<NonNull<Node<K, V>>> {
        let mut best = None;
        let mut cursor = self.root.get();
        while let Some(node) = cursor {
            // SAFETY: the tree only holds live nodes.
            let node_ref = unsafe { node.as_ref() };
            let ord = (self.cmp)(key, &node_ref.key);
            if ord == Ordering::Equal {
                return Some(node);
            }
            if ord != side {
                best = Some(node);
            }
            cursor = if ord == Ordering::Less {
                node_ref.left
            } else {
                node_ref.right
            };
        }
        best
    }

    fn nodes_postorder(&self, mut f: impl FnMut(NonNull<Node<K, V>>)) {
        let mut stack: Vec<NonNull<Node<K, V>>> = self.root.get().into_iter().collect();
        while let Some(node) = stack.pop() {
            // SAFETY: children are read before `f` may release the node.
            let node_ref = unsafe { node.as_ref() };
            stack.extend(node_ref.left);
            stack.extend(node_ref.right);
            f(node);
        }
    }

    fn clear_state(&self) {
        self.root.set(None);
        self.count.set(0);
    }
}

impl<K: 'static, V: 'static> ScopedStructure for TreeCore<K, V> {
    fn reset(&self) {
        self.clear_state();
        self.generation.set(self.data.generation());
    }

    fn on_owner_dropped(&self) {
        self.detached.set(true);
        self.clear_state();
        let this: Weak<dyn ScopedStructure> = self.this.clone();
        self.data.detach(&this);
        if let Some(master) = &self.master {
            master.detach(&this);
        }
    }
}

impl<K, V> Drop for TreeCore<K, V> {
    fn drop(&mut self) {
        if self.detached.get()
            || !self.data.is_current(self.generation.get())
            || !self.data.kind().reclaims_frees()
        {
            return;
        }
        let data = &self.data;
        self.nodes_postorder(|node| unsafe { data.free_value(node) });
    }
}

/// Ordered map whose nodes live in an arena.
///
/// Lookups restructure the tree, so they take `&mut self` too.
pub struct SplayTree<K: Copy, V: Copy> {
    core: Rc<TreeCore<K, V>>,
}

impl<K: Copy + Ord, V: Copy> SplayTree<K, V> {
    /// Creates a tree ordered by `K`'s natural order.
    pub fn new(allocator: &Allocator) -> Self {
        Self::with_comparator(allocator, K::cmp)
    }
}

impl<K: Copy + Ord + 'static, V: Copy + 'static> SplayTree<K, V> {
    /// Creates an auto-reset tree: bookkeeping follows `master`, nodes live
    /// in `slave` and vanish whenever `slave` is bulk-freed.
    pub fn new_autoreset(master: &Allocator, slave: &Allocator) -> Self {
        Self::autoreset_with_comparator(master, slave, K::cmp)
    }
}

impl<K: Copy + 'static, V: Copy + 'static> SplayTree<K, V> {
    pub fn autoreset_with_comparator(
        master: &Allocator,
        slave: &Allocator,
        cmp: fn(&K, &K) -> Ordering,
    ) -> Self {
        let tree = Self::build(Some(master.clone()), slave, cmp);
        let weak = Rc::downgrade(&tree.core);
        let target: Weak<dyn ScopedStructure> = weak;
        master.attach(AttachRole::Owner, target.clone());
        slave.attach(AttachRole::Data, target);
        tree
    }
}

impl<K: Copy, V: Copy> SplayTree<K, V> {
    pub fn with_comparator(allocator: &Allocator, cmp: fn(&K, &K) -> Ordering) -> Self {
        Self::build(None, allocator, cmp)
    }

    fn build(master: Option<Allocator>, data: &Allocator, cmp: fn(&K, &K) -> Ordering) -> Self {
        let core = Rc::new_cyclic(|this| TreeCore {
            master,
            data: data.clone(),
            cmp,
            root: Cell::new(None),
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

    /// Inserts or overwrites; returns the previous value for `key`.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let core = &*self.core;
        core.check();
        match core.splay_search(&key) {
            Slot::Occupied(_, mut node) => {
                // SAFETY: `splay_search` returns live nodes.
                let node = unsafe { node.as_mut() };
                Some(std::mem::replace(&mut node.value, value))
            }
            Slot::Vacant(link) => {
                let node = core.data.alloc_value(Node {
                    key,
                    value,
                    left: None,
                    right: None,
                });
                // SAFETY: `link` is the empty slot where `key` belongs.
                unsafe { *link = Some(node) };
                core.count.set(core.count.get() + 1);
                None
            }
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.core.check();
        match self.core.splay_search(key) {
            // SAFETY: `splay_search` returns live nodes.
            Slot::Occupied(_, node) => Some(unsafe { node.as_ref().value }),
            Slot::Vacant(_) => None,
        }
    }

    pub fn contains_key(&mut self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Entry with the greatest key `<= key`.
    pub fn get_le(&mut self, key: &K) -> Option<(K, V)> {
        self.nearest(key, Ordering::Less)
    }

    /// Entry with the smallest key `>= key`.
    pub fn get_ge(&mut self, key: &K) -> Option<(K, V)> {
        self.nearest(key, Ordering::Greater)
    }

    fn nearest(&mut self, key: &K, side: Ordering) -> Option<(K, V)> {
        self.core.check();
        let node = match self.core.splay_search(key) {
            Slot::Occupied(_, node) => Some(node),
            Slot::Vacant(_) => self.core.nearest(key, side),
        }?;
        // SAFETY: both searches return live nodes.
        let node = unsafe { node.as_ref() };
        Some((node.key, node.value))
    }

    /// Removes `key`; its in-order predecessor takes its place.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let core = &*self.core;
        core.check();
        let Slot::Occupied(link, node) = core.splay_search(key) else {
            return None;
        };
        // SAFETY: `link` holds `node`; all touched nodes are live.
        unsafe {
            let target = &mut *node.as_ptr();
            *link = match (target.left, target.right) {
                (None, child) | (child, None) => child,
                (Some(_), Some(_)) => {
                    let mut pred_link: *mut Link<K, V> = &mut target.left;
                    while let Some(candidate) = *pred_link {
                        match (*candidate.as_ptr()).right {
                            Some(_) => pred_link = &mut (*candidate.as_ptr()).right as *mut _,
                            None => break,
                        }
                    }
                    let Some(pred) = *pred_link else {
                        unreachable!("left subtree is non-empty");
                    };
                    let pred_ref = &mut *pred.as_ptr();
                    *pred_link = pred_ref.left;
                    pred_ref.left = target.left;
                    pred_ref.right = target.right;
                    Some(pred)
                }
            };
            let value = target.value;
            core.data.free_value(node);
            core.count.set(core.count.get() - 1);
            Some(value)
        }
    }

    /// In-order traversal that stops at the first `Break`.
    pub fn try_for_each<B>(&self, mut f: impl FnMut(&K, &V) -> ControlFlow<B>) -> ControlFlow<B> {
        self.core.check();
        let _pin = self.core.data.pin();
        let mut stack = Vec::new();
        let mut cursor = self.core.root.get();
        loop {
            while let Some(node) = cursor {
                stack.push(node);
                // SAFETY: the tree only holds live nodes.
                cursor = unsafe { node.as_ref().left };
            }
            let Some(node) = stack.pop() else {
                return ControlFlow::Continue(());
            };
            let node = unsafe { node.as_ref() };
            f(&node.key, &node.value)?;
            cursor = node.right;
        }
    }

    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        let _ = self.try_for_each(|key, value| {
            f(key, value);
            ControlFlow::<()>::Continue(())
        });
    }

    pub fn to_vec(&self) -> Vec<(K, V)> {
        let mut entries = Vec::new();
        self.for_each(|key, value| entries.push((*key, *value)));
        entries
    }

    /// Height of the tree (0 when empty).
    pub fn depth(&self) -> usize {
        self.core.check();
        let mut deepest = 0;
        let mut stack: Vec<(NonNull<Node<K, V>>, usize)> =
            self.core.root.get().map(|root| (root, 1)).into_iter().collect();
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            // SAFETY: the tree only holds live nodes.
            let node = unsafe { node.as_ref() };
            stack.extend(node.left.map(|child| (child, depth + 1)));
            stack.extend(node.right.map(|child| (child, depth + 1)));
        }
        deepest
    }
}

impl<K: Copy + fmt::Debug, V: Copy + fmt::Debug> fmt::Debug for SplayTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.for_each(|key, value| {
            map.entry(key, value);
        });
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::*;
    use crate::alloc::AllocatorKind;

    fn is_sorted<K: Copy + Ord, V: Copy>(tree: &SplayTree<K, V>) -> bool {
        tree.to_vec().windows(2).all(|pair| pair[0].0 < pair[1].0)
    }

    #[test]
    fn test_insert_get_overwrite() {
        let allocator = Allocator::new(AllocatorKind::Block);
        let mut tree = SplayTree::new(&allocator);
        for key in [50u32, 20, 80, 10, 30, 70, 90] {
            assert_eq!(tree.insert(key, key * 2), None);
        }
        assert_eq!(tree.insert(30, 0), Some(60));
        assert_eq!(tree.get(&30), Some(0));
        assert_eq!(tree.get(&31), None);
        assert_eq!(tree.len(), 7);
        assert!(is_sorted(&tree));
    }

    #[test]
    fn test_random_lookups_flatten_sequential_spine() {
        let allocator = Allocator::new(AllocatorKind::Block);
        let mut tree = SplayTree::new(&allocator);
        for key in 0u32..1024 {
            tree.insert(key, ());
        }
        assert!(tree.depth() > 512, "depth {}", tree.depth());

        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..20_000 {
            let key = rng.random_range(0u32..1024);
            assert!(tree.contains_key(&key));
        }
        assert_eq!(tree.len(), 1024);
        assert!(is_sorted(&tree));
        assert!(tree.depth() < 64, "depth {}", tree.depth());
    }

    #[test]
    fn test_nearest_lookups() {
        let allocator = Allocator::new(AllocatorKind::Simple);
        let mut tree = SplayTree::new(&allocator);
        for key in [10i32, 20, 30, 40] {
            tree.insert(key, key as u8);
        }
        assert_eq!(tree.get_le(&25), Some((20, 20)));
        assert_eq!(tree.get_le(&30), Some((30, 30)));
        assert_eq!(tree.get_le(&5), None);
        assert_eq!(tree.get_ge(&25), Some((30, 30)));
        assert_eq!(tree.get_ge(&41), None);
        assert_eq!(tree.get_le(&1000), Some((40, 40)));
    }

    #[test]
    fn test_remove_keeps_order() {
        let allocator = Allocator::new(AllocatorKind::Strict);
        let mut tree = SplayTree::new(&allocator);
        for key in [8u8, 4, 12, 2, 6, 10, 14, 1, 3, 5, 7] {
            tree.insert(key, key);
        }
        assert_eq!(tree.remove(&4), Some(4));
        assert_eq!(tree.remove(&8), Some(8));
        assert_eq!(tree.remove(&1), Some(1));
        assert_eq!(tree.remove(&99), None);
        assert_eq!(tree.len(), 8);
        assert!(is_sorted(&tree));
        assert_eq!(
            tree.to_vec().iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            vec![2, 3, 5, 6, 7, 10, 12, 14]
        );
    }

    #[test]
    fn test_try_for_each_stops_early() {
        let allocator = Allocator::new(AllocatorKind::Block);
        let mut tree = SplayTree::new(&allocator);
        for key in 0u16..10 {
            tree.insert(key, key);
        }
        let mut seen = Vec::new();
        let flow = tree.try_for_each(|key, _| {
            seen.push(*key);
            if *key == 3 {
                ControlFlow::Break(*key)
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(flow, ControlFlow::Break(3));
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_custom_comparator_reverses_order() {
        let allocator = Allocator::new(AllocatorKind::Block);
        let mut tree = SplayTree::with_comparator(&allocator, |a: &u32, b: &u32| b.cmp(a));
        for key in [1u32, 3, 2] {
            tree.insert(key, ());
        }
        let keys: Vec<u32> = tree.to_vec().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![3, 2, 1]);
    }

    #[test]
    fn test_autoreset_tree_lifecycle() {
        let master = Allocator::new(AllocatorKind::Block);
        let slave = Allocator::new(AllocatorKind::BlockFast);
        let mut tree = SplayTree::new_autoreset(&master, &slave);
        tree.insert(1u64, 1u64);
        slave.free_all();
        assert!(tree.is_empty());
        tree.insert(2, 2);
        assert_eq!(tree.get(&2), Some(2));
        assert_eq!(slave.attached_count(), 1);

        master.free_all();
        assert_eq!(slave.attached_count(), 0);
        assert_eq!(master.attached_count(), 0);
    }

    #[test]
    #[should_panic(expected = "splay tree used after its master allocator")]
    fn test_autoreset_tree_dies_with_master() {
        let master = Allocator::new(AllocatorKind::Block);
        let slave = Allocator::new(AllocatorKind::Block);
        let mut tree = SplayTree::new_autoreset(&master, &slave);
        tree.insert(1u32, 1u32);
        master.destroy();
        tree.get(&1);
    }
}
