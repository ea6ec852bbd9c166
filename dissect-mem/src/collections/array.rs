//! Growable array backed by one arena.

use std::cmp::Ordering;
use std::fmt;
use std::ptr::{self, NonNull};
use std::slice;

use crate::alloc::Allocator;

/// Contiguous, growable buffer of `T` living in an arena.
///
/// With the null terminator enabled, an all-zero `T` always follows the last
/// element, so [`Array::as_ptr`] can be handed to code expecting a
/// terminated buffer.
pub struct Array<T: Copy> {
    allocator: Allocator,
    buf: NonNull<T>,
    len: usize,
    capacity: usize,
    null_terminated: bool,
    generation: u64,
}

impl<T: Copy> Array<T> {
    pub fn new(allocator: &Allocator) -> Self {
        Self::with_capacity(allocator, 1)
    }

    /// Creates an array with room for `capacity` elements (at least one).
    pub fn with_capacity(allocator: &Allocator, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: allocator.alloc_slice::<T>(capacity),
            allocator: allocator.clone(),
            len: 0,
            capacity,
            null_terminated: false,
            generation: allocator.generation(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_null_terminated(&self) -> bool {
        self.null_terminated
    }

    /// Appends copies of `items`, doubling the capacity as often as needed.
    pub fn append(&mut self, items: &[T]) {
        self.check();
        self.grow_to(self.len + items.len());
        // SAFETY: `grow_to` made room for `items.len()` more elements, and
        // the arena buffer cannot overlap a borrowed slice.
        unsafe {
            ptr::copy_nonoverlapping(items.as_ptr(), self.buf.as_ptr().add(self.len), items.len());
        }
        self.len += items.len();
        self.write_terminator();
    }

    pub fn append_one(&mut self, item: T) {
        self.append(slice::from_ref(&item));
    }

    /// Returns the element at `index`.
    ///
    /// # Panics
    /// If `index >= len()`.
    #[track_caller]
    pub fn index(&self, index: usize) -> T {
        match self.try_index(index) {
            Some(item) => item,
            None => panic!("array index {index} out of bounds (len {})", self.len),
        }
    }

    pub fn try_index(&self, index: usize) -> Option<T> {
        self.check();
        // SAFETY: elements below `len` are initialized.
        (index < self.len).then(|| unsafe { self.buf.as_ptr().add(index).read() })
    }

    /// Overwrites the element at `index`.
    ///
    /// # Panics
    /// If `index >= len()`.
    #[track_caller]
    pub fn set(&mut self, index: usize, item: T) {
        self.check();
        assert!(index < self.len, "array index {index} out of bounds (len {})", self.len);
        // SAFETY: bounds checked above.
        unsafe { self.buf.as_ptr().add(index).write(item) };
    }

    /// Enables or disables the zero terminator.
    pub fn set_null_terminator(&mut self, enabled: bool) {
        self.check();
        self.null_terminated = enabled;
        self.grow_to(self.len);
        self.write_terminator();
    }

    /// Makes room for `additional` more elements.
    pub fn reserve(&mut self, additional: usize) {
        self.check();
        self.grow_to(self.len + additional);
    }

    /// Drops every element, keeping the buffer.
    pub fn clear(&mut self) {
        self.check();
        self.len = 0;
        self.write_terminator();
    }

    /// Sorts the elements in place.
    pub fn sort_by(&mut self, compare: impl FnMut(&T, &T) -> Ordering) {
        self.check();
        let _pin = self.allocator.pin();
        // SAFETY: the first `len` elements are initialized and exclusively
        // borrowed through `&mut self`.
        let items = unsafe { slice::from_raw_parts_mut(self.buf.as_ptr(), self.len) };
        items.sort_by(compare);
    }

    /// Lends the elements as a slice for the duration of `f`.
    pub fn with_slice<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.check();
        let _pin = self.allocator.pin();
        // SAFETY: the arena cannot be bulk-freed while pinned, and `&self`
        // rules out growth.
        f(unsafe { slice::from_raw_parts(self.buf.as_ptr(), self.len) })
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.with_slice(<[T]>::to_vec)
    }

    /// Raw pointer to the first element; valid until the array changes or
    /// its arena is freed.
    pub fn as_ptr(&self) -> *const T {
        self.check();
        self.buf.as_ptr()
    }

    fn check(&self) {
        self.allocator.assert_generation(self.generation, "array");
    }

    fn grow_to(&mut self, len: usize) {
        let needed = len + usize::from(self.null_terminated);
        if needed <= self.capacity {
            return;
        }
        let mut capacity = self.capacity;
        while capacity < needed {
            capacity = capacity
                .checked_mul(2)
                .unwrap_or_else(|| panic!("array capacity overflow"));
        }
        // SAFETY: `buf` came from this allocator in the current generation.
        self.buf = unsafe { self.allocator.realloc_slice(self.buf, capacity) };
        self.capacity = capacity;
    }

    fn write_terminator(&mut self) {
        if self.null_terminated {
            // SAFETY: `grow_to` always leaves room for the terminator.
            unsafe { ptr::write_bytes(self.buf.as_ptr().add(self.len), 0, 1) };
        }
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_slice(|items| f.debug_list().entries(items).finish())
    }
}

impl<T: Copy> Drop for Array<T> {
    fn drop(&mut self) {
        if self.allocator.is_current(self.generation) && self.allocator.kind().reclaims_frees() {
            // SAFETY: the buffer is still live in this generation.
            unsafe { self.allocator.free_value(self.buf) };
        }
    }
}
