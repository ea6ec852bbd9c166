//! Simple strategy: every request is its own system allocation.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::ptr::NonNull;

use super::{raw_layout, Strategy};

#[derive(Default)]
pub(crate) struct SimpleStrategy {
    live: HashMap<NonNull<u8>, Layout>,
}

impl SimpleStrategy {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn release(ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: `ptr` was returned by `alloc::alloc` with `layout`.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

impl Strategy for SimpleStrategy {
    fn alloc(&mut self, size: usize) -> NonNull<u8> {
        let layout = raw_layout(size);
        // SAFETY: `raw_layout` never produces a zero-sized layout.
        let ptr = unsafe { alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            alloc::handle_alloc_error(layout);
        };
        self.live.insert(ptr, layout);
        ptr
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>) {
        match self.live.remove(&ptr) {
            Some(layout) => Self::release(ptr, layout),
            None => panic!("simple allocator: freeing unknown pointer {ptr:p}"),
        }
    }

    unsafe fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> NonNull<u8> {
        let Some(old) = self.live.remove(&ptr) else {
            panic!("simple allocator: reallocating unknown pointer {ptr:p}");
        };
        let layout = raw_layout(new_size);
        let moved = alloc::realloc(ptr.as_ptr(), old, layout.size());
        let Some(moved) = NonNull::new(moved) else {
            alloc::handle_alloc_error(layout);
        };
        self.live.insert(moved, layout);
        moved
    }

    fn free_all(&mut self) {
        for (ptr, layout) in self.live.drain() {
            Self::release(ptr, layout);
        }
    }

    fn compact(&mut self) {
        self.live.shrink_to_fit();
    }
}

impl Drop for SimpleStrategy {
    fn drop(&mut self) {
        self.free_all();
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;

    #[test]
    fn test_free_all_releases_tracked_blocks() {
        let mut strategy = SimpleStrategy::new();
        for size in 1..32 {
            let ptr = strategy.alloc(size);
            unsafe { ptr::write_bytes(ptr.as_ptr(), 0xAB, size) };
        }
        assert_eq!(strategy.live.len(), 31);
        strategy.free_all();
        assert!(strategy.live.is_empty());
    }

    #[test]
    #[should_panic(expected = "unknown pointer")]
    fn test_double_free_is_detected() {
        let mut strategy = SimpleStrategy::new();
        let ptr = strategy.alloc(8);
        unsafe {
            strategy.free(ptr);
            strategy.free(ptr);
        }
    }
}
