//! Singly linked list backed by one arena.

use std::fmt;
use std::iter::FusedIterator;
use std::ptr::NonNull;

use crate::alloc::Allocator;

struct ListNode<T> {
    data: T,
    next: Option<NonNull<ListNode<T>>>,
}

pub struct SList<T: Copy> {
    allocator: Allocator,
    head: Option<NonNull<ListNode<T>>>,
    len: usize,
    generation: u64,
}

impl<T: Copy> SList<T> {
    pub fn new(allocator: &Allocator) -> Self {
        Self {
            allocator: allocator.clone(),
            head: None,
            len: 0,
            generation: allocator.generation(),
        }
    }

    pub fn len(&self) -> usize {
        self.check();
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn prepend(&mut self, data: T) {
        self.check();
        let node = self.allocator.alloc_value(ListNode {
            data,
            next: self.head,
        });
        self.head = Some(node);
        self.len += 1;
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.check();
        let node = self.head?;
        // SAFETY: nodes stay live for the current generation.
        let ListNode { data, next } = unsafe { node.as_ptr().read() };
        self.head = next;
        self.len -= 1;
        unsafe { self.allocator.free_value(node) };
        Some(data)
    }

    /// Removes the first element equal to `data`.
    pub fn remove(&mut self, data: &T) -> bool
    where
        T: PartialEq,
    {
        self.check();
        let mut link: *mut Option<NonNull<ListNode<T>>> = &mut self.head;
        // SAFETY: `link` points at the head field or a live node's `next`.
        unsafe {
            while let Some(node) = *link {
                let node_ref = &mut *node.as_ptr();
                if node_ref.data == *data {
                    *link = node_ref.next;
                    self.allocator.free_value(node);
                    self.len -= 1;
                    return true;
                }
                link = &mut node_ref.next as *mut _;
            }
        }
        false
    }

    /// First frame of the list, for manual walking.
    pub fn front(&self) -> Option<Frame<'_, T>> {
        self.check();
        self.head.map(|node| Frame { list: self, node })
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.check();
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    fn check(&self) {
        self.allocator.assert_generation(self.generation, "list");
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for SList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Copy> Drop for SList<T> {
    fn drop(&mut self) {
        if !self.allocator.is_current(self.generation) || !self.allocator.kind().reclaims_frees() {
            return;
        }
        let mut cursor = self.head.take();
        while let Some(node) = cursor {
            // SAFETY: each node is read before it is released.
            cursor = unsafe { node.as_ref().next };
            unsafe { self.allocator.free_value(node) };
        }
    }
}

/// Position in an [`SList`].
pub struct Frame<'a, T: Copy> {
    list: &'a SList<T>,
    node: NonNull<ListNode<T>>,
}

impl<'a, T: Copy> Frame<'a, T> {
    pub fn data(&self) -> T {
        self.list.check();
        // SAFETY: the list is borrowed and its arena still in this generation.
        unsafe { self.node.as_ref().data }
    }

    pub fn next(&self) -> Option<Frame<'a, T>> {
        self.list.check();
        let next = unsafe { self.node.as_ref().next }?;
        Some(Frame {
            list: self.list,
            node: next,
        })
    }
}

pub struct Iter<'a, T: Copy> {
    list: &'a SList<T>,
    cursor: Option<NonNull<ListNode<T>>>,
    remaining: usize,
}

impl<T: Copy> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let node = self.cursor?;
        self.list.check();
        // SAFETY: same as `Frame::data`.
        let node = unsafe { node.as_ref() };
        self.cursor = node.next;
        self.remaining -= 1;
        Some(node.data)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T: Copy> ExactSizeIterator for Iter<'_, T> {}

impl<T: Copy> FusedIterator for Iter<'_, T> {}
