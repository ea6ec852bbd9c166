//! Block strategy: `bumpalo` regions carved into power-of-two blocks.
//!
//! Every block is preceded by a [`BlockHeader`]. Freed blocks go onto the
//! free list of their size class and are handed out again before the region
//! grows. Requests above the largest class are served by the system
//! allocator ("jumbo" blocks) and returned to it on free.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::mem;
use std::ptr::{self, NonNull};

use bumpalo::Bump;

use super::{Strategy, ALIGNMENT};

const MIN_CLASS_SHIFT: u32 = 4;
const MAX_CLASS_SHIFT: u32 = 17;
const CLASS_COUNT: usize = (MAX_CLASS_SHIFT - MIN_CLASS_SHIFT + 1) as usize;

/// Largest request served from a size class.
pub(crate) const MAX_CLASS_SIZE: usize = 1 << MAX_CLASS_SHIFT;

#[repr(C, align(16))]
struct BlockHeader {
    capacity: usize,
    jumbo: bool,
}

const HEADER: usize = mem::size_of::<BlockHeader>();

struct FreeBlock {
    next: Option<NonNull<FreeBlock>>,
}

pub(crate) struct BlockStrategy {
    region: Bump,
    free_lists: [Option<NonNull<FreeBlock>>; CLASS_COUNT],
    jumbos: HashMap<NonNull<u8>, Layout>,
    live: usize,
}

fn class_of(size: usize) -> usize {
    let size = size.max(1 << MIN_CLASS_SHIFT).next_power_of_two();
    (size.trailing_zeros() - MIN_CLASS_SHIFT) as usize
}

fn class_size(class: usize) -> usize {
    1 << (class as u32 + MIN_CLASS_SHIFT)
}

impl BlockStrategy {
    pub(crate) fn new() -> Self {
        Self {
            region: Bump::new(),
            free_lists: [None; CLASS_COUNT],
            jumbos: HashMap::new(),
            live: 0,
        }
    }

    /// # Safety
    /// `ptr` must be a block handed out by this strategy.
    unsafe fn header(ptr: NonNull<u8>) -> NonNull<BlockHeader> {
        NonNull::new_unchecked(ptr.as_ptr().sub(HEADER)).cast()
    }

    fn carve(&mut self, class: usize) -> NonNull<u8> {
        if let Some(block) = self.free_lists[class] {
            // SAFETY: free-list entries are unused blocks of this region.
            self.free_lists[class] = unsafe { block.as_ref().next };
            return block.cast();
        }
        let capacity = class_size(class);
        let layout = Layout::from_size_align(HEADER + capacity, ALIGNMENT)
            .unwrap_or_else(|_| panic!("block class {class} exceeds the address space"));
        let base = self.region.alloc_layout(layout);
        // SAFETY: the region returned room for a header plus `capacity`.
        unsafe {
            base.cast::<BlockHeader>().as_ptr().write(BlockHeader {
                capacity,
                jumbo: false,
            });
            NonNull::new_unchecked(base.as_ptr().add(HEADER))
        }
    }

    fn jumbo(&mut self, size: usize) -> NonNull<u8> {
        let layout = Layout::from_size_align(HEADER + size, ALIGNMENT)
            .unwrap_or_else(|_| panic!("allocation of {size} bytes exceeds the address space"));
        // SAFETY: `layout` is non-zero sized.
        let base = unsafe { alloc::alloc(layout) };
        let Some(base) = NonNull::new(base) else {
            alloc::handle_alloc_error(layout);
        };
        // SAFETY: `base` is valid for a header plus `size` bytes.
        unsafe {
            base.cast::<BlockHeader>().as_ptr().write(BlockHeader {
                capacity: size,
                jumbo: true,
            });
        }
        self.jumbos.insert(base, layout);
        // SAFETY: the header fits inside the allocation.
        unsafe { NonNull::new_unchecked(base.as_ptr().add(HEADER)) }
    }

    fn release_jumbos(&mut self) {
        for (base, layout) in self.jumbos.drain() {
            // SAFETY: every entry was allocated in `jumbo` with `layout`.
            unsafe { alloc::dealloc(base.as_ptr(), layout) };
        }
    }

    #[cfg(test)]
    fn free_list_len(&self, class: usize) -> usize {
        let mut len = 0;
        let mut cursor = self.free_lists[class];
        while let Some(block) = cursor {
            len += 1;
            cursor = unsafe { block.as_ref().next };
        }
        len
    }
}

impl Strategy for BlockStrategy {
    fn alloc(&mut self, size: usize) -> NonNull<u8> {
        self.live += 1;
        if size > MAX_CLASS_SIZE {
            self.jumbo(size)
        } else {
            self.carve(class_of(size))
        }
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>) {
        let header = Self::header(ptr);
        let BlockHeader { capacity, jumbo } = header.as_ptr().read();
        self.live = self.live.saturating_sub(1);
        if jumbo {
            let base = header.cast::<u8>();
            match self.jumbos.remove(&base) {
                Some(layout) => alloc::dealloc(base.as_ptr(), layout),
                None => panic!("block allocator: freeing unknown jumbo block {ptr:p}"),
            }
            return;
        }
        let class = class_of(capacity);
        let block = ptr.cast::<FreeBlock>();
        block.as_ptr().write(FreeBlock {
            next: self.free_lists[class],
        });
        self.free_lists[class] = Some(block);
    }

    unsafe fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> NonNull<u8> {
        let capacity = Self::header(ptr).as_ref().capacity;
        if new_size <= capacity {
            return ptr;
        }
        let moved = self.alloc(new_size);
        ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), capacity);
        self.free(ptr);
        moved
    }

    fn free_all(&mut self) {
        self.region.reset();
        self.free_lists = [None; CLASS_COUNT];
        self.release_jumbos();
        self.live = 0;
    }

    fn compact(&mut self) {
        if self.live == 0 {
            self.free_lists = [None; CLASS_COUNT];
            self.region = Bump::new();
        }
    }
}

impl Drop for BlockStrategy {
    fn drop(&mut self) {
        self.release_jumbos();
    }
}
