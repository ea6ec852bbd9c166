//! Strict strategy: a debugging allocator.
//!
//! Each request is its own system allocation laid out as
//! `[front guard 16][user bytes][back guard 8]`, both guards filled with
//! [`CANARY_BYTE`]. Fresh bytes read [`STRICT_PREFILL`]; freed bytes are
//! scrubbed to [`STRICT_POSTFILL`] and parked in a bounded quarantine so
//! stale pointers observe the poison instead of recycled data.

use std::alloc::{self, Layout};
use std::collections::{HashMap, VecDeque};
use std::ptr::{self, NonNull};

use tracing::error;

use super::{Strategy, ALIGNMENT};

/// Fill pattern of freshly allocated bytes under `strict`.
pub const STRICT_PREFILL: u8 = 0xA1;
/// Fill pattern of freed bytes under `strict`.
pub const STRICT_POSTFILL: u8 = 0x1A;

const CANARY_BYTE: u8 = 0x8E;
const FRONT_GUARD: usize = ALIGNMENT;
const BACK_GUARD: usize = 8;
const QUARANTINE_LIMIT: usize = 1 << 20;

#[derive(Clone, Copy)]
struct Record {
    base: NonNull<u8>,
    layout: Layout,
    size: usize,
}

impl Record {
    fn user(&self) -> *mut u8 {
        // SAFETY: the front guard lies inside the allocation.
        unsafe { self.base.as_ptr().add(FRONT_GUARD) }
    }

    fn check(&self) {
        // SAFETY: both guards lie inside the allocation described by `layout`.
        let (front, back) = unsafe {
            (
                std::slice::from_raw_parts(self.base.as_ptr(), FRONT_GUARD),
                std::slice::from_raw_parts(self.user().add(self.size), BACK_GUARD),
            )
        };
        let front_ok = front.iter().all(|&b| b == CANARY_BYTE);
        let back_ok = back.iter().all(|&b| b == CANARY_BYTE);
        if !(front_ok && back_ok) {
            error!(ptr = ?self.user(), size = self.size, front_ok, back_ok, "strict allocator: canary corrupted");
            panic!(
                "strict allocator: canary corrupted around {:p} ({} bytes, front intact: {front_ok}, back intact: {back_ok})",
                self.user(),
                self.size
            );
        }
    }

    fn poison(&self) {
        // SAFETY: the user region lies inside the allocation.
        unsafe { ptr::write_bytes(self.user(), STRICT_POSTFILL, self.size) };
    }

    fn release(self) {
        // SAFETY: `base` was allocated with `layout` in `StrictStrategy::alloc`.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

#[derive(Default)]
pub(crate) struct StrictStrategy {
    live: HashMap<NonNull<u8>, Record>,
    quarantine: VecDeque<Record>,
    quarantined_bytes: usize,
}

impl StrictStrategy {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn retire(&mut self, record: Record) {
        record.check();
        record.poison();
        self.quarantined_bytes += record.layout.size();
        self.quarantine.push_back(record);
        while self.quarantined_bytes > QUARANTINE_LIMIT {
            let Some(oldest) = self.quarantine.pop_front() else {
                break;
            };
            self.quarantined_bytes -= oldest.layout.size();
            oldest.release();
        }
    }

    fn release_quarantine(&mut self) {
        for record in self.quarantine.drain(..) {
            record.check();
            record.release();
        }
        self.quarantined_bytes = 0;
    }
}

impl Strategy for StrictStrategy {
    fn alloc(&mut self, size: usize) -> NonNull<u8> {
        let layout = Layout::from_size_align(FRONT_GUARD + size + BACK_GUARD, ALIGNMENT)
            .unwrap_or_else(|_| panic!("allocation of {size} bytes exceeds the address space"));
        // SAFETY: the guards make `layout` non-zero sized.
        let base = unsafe { alloc::alloc(layout) };
        let Some(base) = NonNull::new(base) else {
            alloc::handle_alloc_error(layout);
        };
        let record = Record { base, layout, size };
        // SAFETY: every write stays inside the allocation.
        unsafe {
            ptr::write_bytes(base.as_ptr(), CANARY_BYTE, FRONT_GUARD);
            ptr::write_bytes(record.user(), STRICT_PREFILL, size);
            ptr::write_bytes(record.user().add(size), CANARY_BYTE, BACK_GUARD);
        }
        let user = NonNull::new(record.user()).unwrap_or(base);
        self.live.insert(user, record);
        user
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>) {
        match self.live.remove(&ptr) {
            Some(record) => self.retire(record),
            None => panic!("strict allocator: freeing unknown or already freed pointer {ptr:p}"),
        }
    }

    unsafe fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> NonNull<u8> {
        let Some(old) = self.live.get(&ptr).copied() else {
            panic!("strict allocator: reallocating unknown or freed pointer {ptr:p}");
        };
        old.check();
        let moved = self.alloc(new_size);
        ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), old.size.min(new_size));
        self.free(ptr);
        moved
    }

    fn free_all(&mut self) {
        let live: Vec<Record> = self.live.drain().map(|(_, record)| record).collect();
        for record in live {
            self.retire(record);
        }
    }

    fn compact(&mut self) {
        for record in self.live.values() {
            record.check();
        }
        self.release_quarantine();
        self.live.shrink_to_fit();
    }
}

impl Drop for StrictStrategy {
    fn drop(&mut self) {
        for (_, record) in self.live.drain() {
            record.release();
        }
        for record in self.quarantine.drain(..) {
            record.release();
        }
    }
}
