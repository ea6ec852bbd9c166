//! ## dissect-mem::collections
//! **Containers whose storage lives in an arena**
//!
//! Every container holds an [`Allocator`](crate::Allocator) handle and
//! records the arena generation it was built in. Touching a container after
//! its arena was bulk-freed panics instead of reading freed memory; the
//! auto-reset map and tree instead follow their arena's lifecycle.

pub mod array;
pub mod list;
pub mod map;
pub mod slab;
pub mod splay;

pub use array::Array;
pub use list::{Frame, SList};
pub use map::{KeyHash, Map};
pub use slab::Slab;
pub use splay::SplayTree;
