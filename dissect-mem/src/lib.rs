//! # dissect-mem
//!
//! Memory arenas for a protocol dissection engine.
//!
//! Decoders allocate freely from scoped arenas and never free individually:
//! everything allocated while dissecting a packet goes away when the packet
//! scope is left, everything allocated for a capture goes away with the
//! session scope.
//!
//! ### Key Submodules:
//! - `alloc`: the `Allocator` handle and its four strategies (`bumpalo`-backed
//!   `block` and `block_fast`, `simple`, `strict`)
//! - `scope`: packet/session/process arenas and their nesting rules
//! - `collections`: array, hash map, splay tree, slab and list over an arena
//! - `hash`: seeded hashing shared by the maps
//!
//! ### Lifecycle:
//! ```
//! dissect_mem::init().unwrap();
//! dissect_mem::enter_session_scope();
//! dissect_mem::enter_packet_scope();
//! let name = dissect_mem::packet_scope().dup_str("tcp.port");
//! assert_eq!(unsafe { name.as_ref() }, "tcp.port");
//! dissect_mem::leave_packet_scope();
//! dissect_mem::leave_session_scope();
//! dissect_mem::cleanup().unwrap();
//! ```

pub mod alloc;
pub mod collections;
pub mod error;
pub mod hash;
pub mod scope;

pub mod prelude {
    pub use crate::alloc::*;
    pub use crate::collections::*;
    pub use crate::error::*;
    pub use crate::scope::*;
}

use tracing::info;

pub use alloc::{set_kind_override, Allocator, AllocatorKind, StatsSnapshot};
pub use error::{ParseKindError, ScopeError};
pub use scope::{
    enter_packet_scope, enter_session_scope, leave_packet_scope, leave_session_scope,
    packet_scope, process_scope, session_scope, with_scopes, ScopeKind, ScopeSettings, Scopes,
};

/// Initializes the memory subsystem with default settings.
pub fn init() -> Result<(), ScopeError> {
    init_with(&ScopeSettings::default())
}

/// Draws the hash seeds, applies the strategy override and creates this
/// thread's scope arenas.
pub fn init_with(settings: &ScopeSettings) -> Result<(), ScopeError> {
    hash::init_hashing();
    scope::init_scopes(settings)?;
    info!(kind_override = ?settings.kind_override, "memory subsystem initialized");
    Ok(())
}

/// Destroys this thread's scope arenas. Packet and session must be inactive.
pub fn cleanup() -> Result<(), ScopeError> {
    scope::cleanup_scopes()?;
    info!("memory subsystem cleaned up");
    Ok(())
}
