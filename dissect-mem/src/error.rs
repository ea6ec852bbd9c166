//! Error types for the fallible parts of the arena API.
//!
//! Contract violations on arenas and collections panic; these errors cover
//! the operations a caller may reasonably want to recover from.

use thiserror::Error;

use crate::scope::ScopeKind;

/// Rejected scope transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("memory scopes are not initialized on this thread")]
    NotInitialized,

    #[error("memory scopes are already initialized on this thread")]
    AlreadyInitialized,

    #[error("cannot enter {scope} scope: {parent} scope is not active")]
    ParentInactive { scope: ScopeKind, parent: ScopeKind },

    #[error("{0} scope is already active")]
    AlreadyActive(ScopeKind),

    #[error("{0} scope is not active")]
    NotActive(ScopeKind),

    #[error("cannot leave {scope} scope while {child} scope is active")]
    ChildActive { scope: ScopeKind, child: ScopeKind },

    #[error("{0} scope is still active at teardown")]
    ActiveAtTeardown(ScopeKind),
}

/// Unknown allocation strategy name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown allocator kind '{0}' (expected simple, block, block_fast or strict)")]
pub struct ParseKindError(pub String);
