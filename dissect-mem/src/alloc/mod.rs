//! ## dissect-mem::alloc
//! **Arena allocators with interchangeable strategies**
//!
//! An [`Allocator`] is a cheap, reference-counted handle onto one arena. Every
//! collection in this crate takes a handle at construction and performs all
//! of its allocations through it, so the strategy behind the handle can be
//! swapped without touching the collections.
//!
//! ### Strategies:
//! - `simple`: one system allocation per request, tracked in a table
//! - `block`: `bumpalo` regions with power-of-two size-class free lists
//! - `block_fast`: `bumpalo` regions where a single free is a no-op
//! - `strict`: canaries, fill patterns and a poisoned quarantine
//!
//! ### Contract:
//! - A pointer stays valid until it is freed, or until `free_all`/`destroy`.
//! - Handles are `!Send`; an arena belongs to the thread that created it.
//! - Misuse (allocating out of scope, bulk-freeing a pinned arena, touching a
//!   destroyed arena) panics with a diagnostic at the violation site.

mod block;
mod block_fast;
pub mod lifecycle;
mod simple;
pub mod stats;
mod strict;

use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};
use std::rc::{Rc, Weak};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ParseKindError;
use lifecycle::{ArenaEvent, Attachment};

pub use lifecycle::{AttachRole, ScopedStructure};
pub use stats::{AllocatorStats, StatsSnapshot};
pub use strict::{STRICT_POSTFILL, STRICT_PREFILL};

/// Alignment guaranteed for every allocation, whatever the strategy.
pub const ALIGNMENT: usize = 16;

/// Allocation strategy backing an [`Allocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorKind {
    /// Individual system allocations tracked in a table.
    Simple,
    /// Bump regions with size-class free lists.
    Block,
    /// Bump regions; individual frees are never reclaimed.
    BlockFast,
    /// Debugging strategy with canaries and poisoned frees.
    Strict,
}

impl AllocatorKind {
    /// Every strategy, in declaration order.
    pub const ALL: [AllocatorKind; 4] = [
        AllocatorKind::Simple,
        AllocatorKind::Block,
        AllocatorKind::BlockFast,
        AllocatorKind::Strict,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AllocatorKind::Simple => "simple",
            AllocatorKind::Block => "block",
            AllocatorKind::BlockFast => "block_fast",
            AllocatorKind::Strict => "strict",
        }
    }

    /// Whether freeing a single allocation makes its memory reusable.
    pub fn reclaims_frees(self) -> bool {
        !matches!(self, AllocatorKind::BlockFast)
    }

    fn tag(self) -> u8 {
        match self {
            AllocatorKind::Simple => 1,
            AllocatorKind::Block => 2,
            AllocatorKind::BlockFast => 3,
            AllocatorKind::Strict => 4,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocatorKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "simple" => Ok(AllocatorKind::Simple),
            "block" => Ok(AllocatorKind::Block),
            "block_fast" => Ok(AllocatorKind::BlockFast),
            "strict" => Ok(AllocatorKind::Strict),
            _ => Err(ParseKindError(s.to_string())),
        }
    }
}

/// Process-wide strategy override; 0 means "no override".
static KIND_OVERRIDE: AtomicU8 = AtomicU8::new(0);

/// Forces every allocator created afterwards to use `kind`.
///
/// Intended as a debugging switch (e.g. run everything under `strict`).
/// Allocators that already exist keep their strategy.
pub fn set_kind_override(kind: Option<AllocatorKind>) {
    KIND_OVERRIDE.store(kind.map_or(0, AllocatorKind::tag), Ordering::Relaxed);
}

/// The strategy override currently in effect, if any.
pub fn kind_override() -> Option<AllocatorKind> {
    AllocatorKind::from_tag(KIND_OVERRIDE.load(Ordering::Relaxed))
}

/// Backing implementation of one allocation strategy.
///
/// Every returned pointer is aligned to [`ALIGNMENT`]. Requests the system
/// cannot satisfy go through [`std::alloc::handle_alloc_error`].
pub(crate) trait Strategy {
    fn alloc(&mut self, size: usize) -> NonNull<u8>;

    /// # Safety
    /// `ptr` must come from this strategy and not have been freed.
    unsafe fn free(&mut self, ptr: NonNull<u8>);

    /// # Safety
    /// `ptr` must come from this strategy and not have been freed.
    unsafe fn realloc(&mut self, ptr: NonNull<u8>, new_size: usize) -> NonNull<u8>;

    fn free_all(&mut self);

    fn compact(&mut self);
}

fn new_strategy(kind: AllocatorKind) -> Box<dyn Strategy> {
    match kind {
        AllocatorKind::Simple => Box::new(simple::SimpleStrategy::new()),
        AllocatorKind::Block => Box::new(block::BlockStrategy::new()),
        AllocatorKind::BlockFast => Box::new(block_fast::BlockFastStrategy::new()),
        AllocatorKind::Strict => Box::new(strict::StrictStrategy::new()),
    }
}

/// Layout for a raw request of `size` bytes at [`ALIGNMENT`].
pub(crate) fn raw_layout(size: usize) -> Layout {
    Layout::from_size_align(size.max(1), ALIGNMENT)
        .unwrap_or_else(|_| panic!("allocation of {size} bytes exceeds the address space"))
}

struct Inner {
    kind: AllocatorKind,
    label: String,
    /// `None` once the allocator has been destroyed.
    strategy: RefCell<Option<Box<dyn Strategy>>>,
    in_scope: Cell<bool>,
    generation: Cell<u64>,
    pins: Cell<u32>,
    attached: RefCell<Vec<Attachment>>,
    stats: AllocatorStats,
}

/// Handle onto one arena.
///
/// Cloning the handle is cheap and yields another handle onto the same
/// arena. The arena's memory is released by [`Allocator::destroy`], or when
/// the last handle is dropped.
#[derive(Clone)]
pub struct Allocator {
    inner: Rc<Inner>,
}

impl Allocator {
    /// Creates an anonymous allocator using `kind` (subject to the override).
    pub fn new(kind: AllocatorKind) -> Self {
        Self::named(kind, "anonymous")
    }

    /// Creates an allocator whose `label` appears in diagnostics and metrics.
    pub fn named(kind: AllocatorKind, label: impl Into<String>) -> Self {
        let label = label.into();
        let kind = match kind_override() {
            Some(forced) if forced != kind => {
                warn!(arena = %label, requested = %kind, forced = %forced, "allocator strategy overridden");
                forced
            }
            _ => kind,
        };
        debug!(arena = %label, %kind, "allocator created");

        Self {
            inner: Rc::new(Inner {
                kind,
                label,
                strategy: RefCell::new(Some(new_strategy(kind))),
                in_scope: Cell::new(true),
                generation: Cell::new(0),
                pins: Cell::new(0),
                attached: RefCell::new(Vec::new()),
                stats: AllocatorStats::new(),
            }),
        }
    }

    pub fn kind(&self) -> AllocatorKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Number of times this arena has been bulk-freed (or destroyed).
    pub fn generation(&self) -> u64 {
        self.inner.generation.get()
    }

    pub fn is_in_scope(&self) -> bool {
        self.inner.in_scope.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.strategy.borrow().is_none()
    }

    /// Whether both handles refer to the same arena.
    pub fn ptr_eq(&self, other: &Allocator) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Allocates `size` uninitialized bytes aligned to [`ALIGNMENT`].
    pub fn alloc(&self, size: usize) -> NonNull<u8> {
        self.assert_in_scope("allocate from");
        self.inner.stats.increment_allocations(size);
        self.with_strategy(|strategy| strategy.alloc(size))
    }

    /// Allocates `size` zeroed bytes.
    pub fn alloc_zeroed(&self, size: usize) -> NonNull<u8> {
        let ptr = self.alloc(size);
        // SAFETY: `ptr` is valid for `size` bytes, freshly allocated above.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        ptr
    }

    /// Resizes an allocation, possibly moving it. Contents up to the smaller
    /// of the two sizes are preserved.
    ///
    /// # Safety
    /// `ptr` must have been returned by this allocator, not freed, and not
    /// invalidated by `free_all`.
    pub unsafe fn realloc(&self, ptr: NonNull<u8>, new_size: usize) -> NonNull<u8> {
        self.assert_in_scope("reallocate from");
        self.inner.stats.increment_reallocations(new_size);
        self.with_strategy(|strategy| strategy.realloc(ptr, new_size))
    }

    /// Frees one allocation. A no-op under `block_fast`.
    ///
    /// # Safety
    /// Same requirements as [`Allocator::realloc`].
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        self.assert_in_scope("free into");
        self.inner.stats.increment_frees();
        self.with_strategy(|strategy| strategy.free(ptr));
    }

    /// Invalidates every outstanding allocation at once. The arena stays
    /// usable; structures attached with [`AttachRole::Data`] are reset.
    pub fn free_all(&self) {
        self.assert_alive("free");
        self.assert_unpinned("free_all");
        self.with_strategy(|strategy| strategy.free_all());
        self.inner.generation.set(self.inner.generation.get() + 1);
        self.inner.stats.increment_free_alls();
        self.notify(ArenaEvent::FreeAll);
    }

    /// Returns unused backing memory to the system where the strategy can.
    /// Never invalidates a live allocation.
    pub fn compact(&self) {
        self.assert_alive("compact");
        self.inner.stats.increment_compactions();
        self.with_strategy(|strategy| strategy.compact());
    }

    /// Frees everything and releases the arena's backing memory. Every
    /// handle onto this arena is unusable afterwards.
    pub fn destroy(&self) {
        self.assert_alive("destroy");
        self.assert_unpinned("destroy");
        self.notify(ArenaEvent::Destroy);
        let strategy = self.inner.strategy.borrow_mut().take();
        drop(strategy);
        self.inner.generation.set(self.inner.generation.get() + 1);
        self.inner.attached.borrow_mut().clear();
        debug!(arena = %self.label(), "allocator destroyed");
    }

    /// Attaches a structure so it hears about this arena's lifecycle.
    ///
    /// Only a weak reference is kept: dropping the structure detaches it.
    pub fn attach(&self, role: AttachRole, target: Weak<dyn ScopedStructure>) {
        let mut attached = self.inner.attached.borrow_mut();
        attached.retain(|entry| entry.is_live());
        attached.push(Attachment::new(role, target));
    }

    /// Removes every attachment of `target`.
    pub fn detach(&self, target: &Weak<dyn ScopedStructure>) {
        self.inner
            .attached
            .borrow_mut()
            .retain(|entry| !entry.refers_to(target));
    }

    /// Number of live structures attached to this arena.
    pub fn attached_count(&self) -> usize {
        self.inner
            .attached
            .borrow()
            .iter()
            .filter(|entry| entry.is_live())
            .count()
    }

    /// Moves `value` into the arena.
    ///
    /// The value is never dropped by the arena; types owning heap resources
    /// leak them when the arena is freed.
    pub fn alloc_value<T>(&self, value: T) -> NonNull<T> {
        assert_alignment::<T>();
        let ptr = self.alloc(mem::size_of::<T>()).cast::<T>();
        // SAFETY: the block is large enough and aligned for `T`.
        unsafe { ptr.as_ptr().write(value) };
        ptr
    }

    /// Allocates uninitialized room for `len` values of `T`.
    pub fn alloc_slice<T>(&self, len: usize) -> NonNull<T> {
        assert_alignment::<T>();
        self.alloc(slice_bytes::<T>(len)).cast()
    }

    /// Allocates room for `len` values of `T` with every byte zeroed.
    pub fn alloc_slice_zeroed<T>(&self, len: usize) -> NonNull<T> {
        assert_alignment::<T>();
        self.alloc_zeroed(slice_bytes::<T>(len)).cast()
    }

    /// Resizes a slice allocation to hold `new_len` values.
    ///
    /// # Safety
    /// Same requirements as [`Allocator::realloc`].
    pub unsafe fn realloc_slice<T>(&self, ptr: NonNull<T>, new_len: usize) -> NonNull<T> {
        self.realloc(ptr.cast(), slice_bytes::<T>(new_len)).cast()
    }

    /// Frees a value or slice allocation without running destructors.
    ///
    /// # Safety
    /// Same requirements as [`Allocator::free`].
    pub unsafe fn free_value<T>(&self, ptr: NonNull<T>) {
        self.free(ptr.cast());
    }

    /// Copies `bytes` into the arena.
    pub fn dup_bytes(&self, bytes: &[u8]) -> NonNull<[u8]> {
        let ptr = self.alloc(bytes.len());
        // SAFETY: `ptr` is valid for `bytes.len()` bytes and cannot overlap
        // caller memory.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
        NonNull::slice_from_raw_parts(ptr, bytes.len())
    }

    /// Copies `s` into the arena.
    pub fn dup_str(&self, s: &str) -> NonNull<str> {
        let bytes = self.dup_bytes(s.as_bytes());
        // SAFETY: the bytes were copied from a valid `str`.
        unsafe { NonNull::new_unchecked(bytes.as_ptr() as *mut str) }
    }

    /// Formats `args` straight into the arena.
    pub fn dup_fmt(&self, args: fmt::Arguments<'_>) -> NonNull<str> {
        match args.as_str() {
            Some(literal) => self.dup_str(literal),
            None => self.dup_str(&fmt::format(args)),
        }
    }

    pub(crate) fn set_in_scope(&self, in_scope: bool) {
        self.inner.in_scope.set(in_scope);
    }

    /// Forbids `free_all`/`destroy` until the guard is dropped.
    pub(crate) fn pin(&self) -> PinGuard<'_> {
        self.inner.pins.set(self.inner.pins.get() + 1);
        PinGuard { allocator: self }
    }

    /// Panics unless the arena is alive and still in `generation`.
    pub(crate) fn assert_generation(&self, generation: u64, what: &str) {
        self.assert_alive(&format!("use {what} from"));
        let current = self.generation();
        assert!(
            current == generation,
            "{what} used after its allocator '{}' was freed (built in generation {generation}, arena is at {current})",
            self.label()
        );
    }

    pub(crate) fn assert_alive(&self, action: &str) {
        assert!(
            !self.is_destroyed(),
            "cannot {action} allocator '{}': it has been destroyed",
            self.label()
        );
    }

    /// Whether a structure built in `generation` may still touch its memory.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        !self.is_destroyed() && self.is_in_scope() && self.generation() == generation
    }

    fn assert_in_scope(&self, action: &str) {
        self.assert_alive(action);
        assert!(
            self.is_in_scope(),
            "cannot {action} allocator '{}' while its scope is inactive",
            self.label()
        );
    }

    fn assert_unpinned(&self, action: &str) {
        assert!(
            self.inner.pins.get() == 0,
            "{action} called on allocator '{}' while a structure is iterating over it",
            self.label()
        );
    }

    fn with_strategy<R>(&self, f: impl FnOnce(&mut dyn Strategy) -> R) -> R {
        let mut strategy = self.inner.strategy.borrow_mut();
        match strategy.as_deref_mut() {
            Some(strategy) => f(strategy),
            None => panic!("allocator '{}' used after destroy", self.label()),
        }
    }

    fn notify(&self, event: ArenaEvent) {
        // Take the list so structures may attach or detach while notified.
        let attached = mem::take(&mut *self.inner.attached.borrow_mut());
        let mut kept = Vec::with_capacity(attached.len());
        for entry in attached {
            if entry.deliver(event) {
                kept.push(entry);
            }
        }
        let mut current = self.inner.attached.borrow_mut();
        kept.append(&mut current);
        *current = kept;
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("label", &self.label())
            .field("kind", &self.kind())
            .field("generation", &self.generation())
            .field("in_scope", &self.is_in_scope())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Keeps an allocator pinned while a structure runs user code over it.
pub(crate) struct PinGuard<'a> {
    allocator: &'a Allocator,
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        let pins = &self.allocator.inner.pins;
        pins.set(pins.get() - 1);
    }
}

fn assert_alignment<T>() {
    assert!(
        mem::align_of::<T>() <= ALIGNMENT,
        "type {} needs {}-byte alignment; arenas guarantee {ALIGNMENT}",
        std::any::type_name::<T>(),
        mem::align_of::<T>()
    );
}

fn slice_bytes<T>(len: usize) -> usize {
    mem::size_of::<T>()
        .checked_mul(len)
        .unwrap_or_else(|| panic!("capacity overflow allocating {len} elements"))
}
