//! Strategy selection for the three memory scopes.

use dissect_mem::{AllocatorKind, ScopeSettings};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Which allocation strategy backs each scope arena.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validation::validate_scope_kinds))]
pub struct ScopesConfig {
    /// Packet scope; bulk-freed after every packet.
    #[serde(default = "default_packet")]
    pub packet: AllocatorKind,

    /// Session scope; bulk-freed at the end of a capture.
    #[serde(default = "default_block")]
    pub session: AllocatorKind,

    /// Process scope; never bulk-freed, so it must reclaim single frees.
    #[serde(default = "default_block")]
    pub process: AllocatorKind,

    /// Forces every arena onto one strategy (e.g. `strict` while debugging).
    #[serde(default, rename = "override")]
    pub kind_override: Option<AllocatorKind>,
}

fn default_packet() -> AllocatorKind {
    AllocatorKind::BlockFast
}

fn default_block() -> AllocatorKind {
    AllocatorKind::Block
}

impl Default for ScopesConfig {
    fn default() -> Self {
        Self {
            packet: default_packet(),
            session: default_block(),
            process: default_block(),
            kind_override: None,
        }
    }
}

impl From<&ScopesConfig> for ScopeSettings {
    fn from(config: &ScopesConfig) -> Self {
        ScopeSettings {
            packet: config.packet,
            session: config.session,
            process: config.process,
            kind_override: config.kind_override,
        }
    }
}
