//! Fixed-size chunk pool on top of an arena.
//!
//! Chunks are carved from the arena in batches and recycled through an
//! intrusive free list; the arena only gets them back on `free_all`.

use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use tracing::debug;

use crate::alloc::{Allocator, ALIGNMENT};

const CHUNKS_PER_BATCH: usize = 8;

struct FreeChunk {
    next: Option<NonNull<FreeChunk>>,
}

pub struct Slab<T> {
    allocator: Allocator,
    chunk_size: usize,
    free: Option<NonNull<FreeChunk>>,
    free_count: usize,
    generation: u64,
    _marker: PhantomData<T>,
}

impl<T> Slab<T> {
    pub fn new(allocator: &Allocator) -> Self {
        let align = mem::align_of::<T>().max(mem::align_of::<FreeChunk>());
        assert!(
            align <= ALIGNMENT,
            "slab element {} needs {align}-byte alignment; arenas guarantee {ALIGNMENT}",
            std::any::type_name::<T>()
        );
        let chunk_size = mem::size_of::<T>()
            .max(mem::size_of::<FreeChunk>())
            .next_multiple_of(align);
        Self {
            allocator: allocator.clone(),
            chunk_size,
            free: None,
            free_count: 0,
            generation: allocator.generation(),
            _marker: PhantomData,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunks waiting on the free list.
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Moves `value` into a chunk. The value is never dropped by the slab.
    pub fn alloc(&mut self, value: T) -> NonNull<T> {
        self.sync_generation();
        let chunk = match self.free {
            Some(chunk) => chunk,
            None => self.carve(),
        };
        debug_assert_eq!(self.free, Some(chunk));
        // SAFETY: free-list chunks are unused and sized for `T`.
        self.free = unsafe { chunk.as_ref().next };
        self.free_count -= 1;
        let slot = chunk.cast::<T>();
        unsafe { slot.as_ptr().write(value) };
        slot
    }

    /// Returns a chunk to the free list without dropping its value.
    ///
    /// # Safety
    /// `ptr` must come from [`Slab::alloc`] on this slab, in the current
    /// generation of its arena, and not have been freed since.
    pub unsafe fn free(&mut self, ptr: NonNull<T>) {
        self.allocator.assert_generation(self.generation, "slab chunk");
        let chunk = ptr.cast::<FreeChunk>();
        chunk.as_ptr().write(FreeChunk { next: self.free });
        self.free = Some(chunk);
        self.free_count += 1;
    }

    fn sync_generation(&mut self) {
        let current = self.allocator.generation();
        if current != self.generation {
            debug!(
                arena = %self.allocator.label(),
                stale = self.free_count,
                "slab discarding free list after arena free_all"
            );
            self.free = None;
            self.free_count = 0;
            self.generation = current;
        }
    }

    /// Threads a fresh batch onto the free list and returns its head.
    fn carve(&mut self) -> NonNull<FreeChunk> {
        let batch = self.allocator.alloc(self.chunk_size * CHUNKS_PER_BATCH);
        for index in (0..CHUNKS_PER_BATCH).rev() {
            // SAFETY: every chunk lies inside the batch and is suitably aligned.
            let chunk = unsafe {
                let chunk = NonNull::new_unchecked(batch.as_ptr().add(index * self.chunk_size));
                chunk.cast::<FreeChunk>()
            };
            unsafe { chunk.as_ptr().write(FreeChunk { next: self.free }) };
            self.free = Some(chunk);
        }
        self.free_count += CHUNKS_PER_BATCH;
        batch.cast()
    }
}
