//! ## dissect-mem::alloc::stats
//! **Per-arena allocation counters**
//!
//! Every [`Allocator`](super::Allocator) owns an [`AllocatorStats`]. Arenas are
//! single-threaded, so the counters are plain `Cell`s; a [`StatsSnapshot`] is
//! what leaves the arena (e.g. for the metrics exporter).

use std::cell::Cell;

use serde::Serialize;

/// Counters for one arena.
#[derive(Debug, Default)]
pub struct AllocatorStats {
    allocations: Cell<u64>,
    reallocations: Cell<u64>,
    frees: Cell<u64>,
    free_alls: Cell<u64>,
    compactions: Cell<u64>,
    bytes_requested: Cell<u64>,
}

fn bump(counter: &Cell<u64>, by: u64) {
    counter.set(counter.get().saturating_add(by));
}

impl AllocatorStats {
    /// Creates a new `AllocatorStats` with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_allocations(&self, bytes: usize) {
        bump(&self.allocations, 1);
        bump(&self.bytes_requested, bytes as u64);
    }

    #[inline]
    pub fn increment_reallocations(&self, bytes: usize) {
        bump(&self.reallocations, 1);
        bump(&self.bytes_requested, bytes as u64);
    }

    #[inline]
    pub fn increment_frees(&self) {
        bump(&self.frees, 1);
    }

    #[inline]
    pub fn increment_free_alls(&self) {
        bump(&self.free_alls, 1);
    }

    #[inline]
    pub fn increment_compactions(&self) {
        bump(&self.compactions, 1);
    }

    /// Copies the current counter values out.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            allocations: self.allocations.get(),
            reallocations: self.reallocations.get(),
            frees: self.frees.get(),
            free_alls: self.free_alls.get(),
            compactions: self.compactions.get(),
            bytes_requested: self.bytes_requested.get(),
        }
    }
}

/// Point-in-time copy of an arena's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub allocations: u64,
    pub reallocations: u64,
    pub frees: u64,
    pub free_alls: u64,
    pub compactions: u64,
    /// Sum of sizes passed to `alloc` and `realloc`.
    pub bytes_requested: u64,
}
