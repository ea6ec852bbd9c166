//! Block-fast strategy: pure bump allocation.
//!
//! Single frees are ignored; memory comes back only through `free_all`.
//! Suited to arenas that are bulk-freed very often, like the packet scope.

use std::alloc::Layout;
use std::mem;
use std::ptr::{self, NonNull};

use bumpalo::Bump;

use super::{Strategy, ALIGNMENT};

#[repr(C, align(16))]
struct SizeHeader {
    size: usize,
}

const HEADER: usize = mem::size_of::<SizeHeader>();

pub(crate) struct BlockFastStrategy {
    region: Bump,
    /// Anything allocated since the last `free_all`.
    dirty: bool,
}

impl BlockFastStrategy {
    pub(crate) fn new() -> Self {
        Self {
            region: Bump::new(),
            dirty: false,
        }
    }
}

impl Strategy for BlockFastStrategy {
    fn alloc(&mut self, size: usize) -> NonNull<u8> {
        let layout = Layout::from_size_align(HEADER + size, ALIGNMENT)
            .unwrap_or_else(|_| panic!("allocation of {size} bytes exceeds the address space"));
        let base = self.region.alloc_layout(layout);
        self.dirty = true;
        // SAFETY: the region returned room for the header plus `size` bytes.
        unsafe {
            base.cast::<SizeHeader>().as_ptr().write(SizeHeader { size });
            NonNull::new_unchecked(base.as_ptr().add(HEADER))
        }
    }

    unsafe fn free(&mut self, _ptr: NonNull<u8>) {}

    unsafe fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> NonNull<u8> {
        let old_size = ptr.as_ptr().sub(HEADER).cast::<SizeHeader>().read().size;
        if new_size <= old_size {
            return ptr;
        }
        let moved = self.alloc(new_size);
        ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), old_size);
        moved
    }

    fn free_all(&mut self) {
        self.region.reset();
        self.dirty = false;
    }

    fn compact(&mut self) {
        if !self.dirty {
            self.region = Bump::new();
        }
    }
}
