//! ## dissect-mem::scope
//! **Packet, session and process scopes**
//!
//! Three nested arenas with well-defined lifetimes:
//!
//! - **process**: lives from [`crate::init`] to [`crate::cleanup`].
//! - **session**: one capture/file; entered and left inside the process.
//! - **packet**: one dissection pass; entered and left inside a session.
//!
//! Leaving a scope bulk-frees its arena. Allocating from an arena whose scope
//! is inactive panics.
//!
//! [`Scopes`] is the context object; the free functions at the bottom of the
//! module wrap a per-thread instance for code that wants a global.

use std::cell::RefCell;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alloc::{Allocator, AllocatorKind};
use crate::error::ScopeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Packet,
    Session,
    Process,
}

impl ScopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Packet => "packet",
            ScopeKind::Session => "session",
            ScopeKind::Process => "process",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy selection for the three scope arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSettings {
    pub packet: AllocatorKind,
    pub session: AllocatorKind,
    pub process: AllocatorKind,
    /// Forces every arena created after `init` onto one strategy.
    pub kind_override: Option<AllocatorKind>,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            packet: AllocatorKind::BlockFast,
            session: AllocatorKind::Block,
            process: AllocatorKind::Block,
            kind_override: None,
        }
    }
}

/// The three scope arenas and their nesting state.
#[derive(Debug)]
pub struct Scopes {
    packet: Allocator,
    session: Allocator,
    process: Allocator,
}

impl Scopes {
    /// Creates the arenas. Packet and session start inactive.
    pub fn new(settings: &ScopeSettings) -> Self {
        let packet = Allocator::named(settings.packet, ScopeKind::Packet.as_str());
        let session = Allocator::named(settings.session, ScopeKind::Session.as_str());
        let process = Allocator::named(settings.process, ScopeKind::Process.as_str());
        packet.set_in_scope(false);
        session.set_in_scope(false);
        Self {
            packet,
            session,
            process,
        }
    }

    pub fn packet(&self) -> &Allocator {
        &self.packet
    }

    pub fn session(&self) -> &Allocator {
        &self.session
    }

    pub fn process(&self) -> &Allocator {
        &self.process
    }

    pub fn get(&self, kind: ScopeKind) -> &Allocator {
        match kind {
            ScopeKind::Packet => &self.packet,
            ScopeKind::Session => &self.session,
            ScopeKind::Process => &self.process,
        }
    }

    pub fn is_active(&self, kind: ScopeKind) -> bool {
        self.get(kind).is_in_scope()
    }

    pub fn try_enter_packet(&self) -> Result<(), ScopeError> {
        if !self.session.is_in_scope() {
            return Err(ScopeError::ParentInactive {
                scope: ScopeKind::Packet,
                parent: ScopeKind::Session,
            });
        }
        if self.packet.is_in_scope() {
            return Err(ScopeError::AlreadyActive(ScopeKind::Packet));
        }
        self.packet.set_in_scope(true);
        debug!(scope = "packet", "entered scope");
        Ok(())
    }

    pub fn try_leave_packet(&self) -> Result<(), ScopeError> {
        if !self.packet.is_in_scope() {
            return Err(ScopeError::NotActive(ScopeKind::Packet));
        }
        self.packet.free_all();
        self.packet.set_in_scope(false);
        debug!(scope = "packet", "left scope");
        Ok(())
    }

    pub fn try_enter_session(&self) -> Result<(), ScopeError> {
        if self.session.is_in_scope() {
            return Err(ScopeError::AlreadyActive(ScopeKind::Session));
        }
        self.session.set_in_scope(true);
        debug!(scope = "session", "entered scope");
        Ok(())
    }

    pub fn try_leave_session(&self) -> Result<(), ScopeError> {
        if self.packet.is_in_scope() {
            return Err(ScopeError::ChildActive {
                scope: ScopeKind::Session,
                child: ScopeKind::Packet,
            });
        }
        if !self.session.is_in_scope() {
            return Err(ScopeError::NotActive(ScopeKind::Session));
        }
        self.session.free_all();
        self.session.set_in_scope(false);
        self.session.compact();
        self.packet.compact();
        debug!(scope = "session", "left scope");
        Ok(())
    }

    /// # Panics
    /// If the session scope is inactive or the packet scope already active.
    pub fn enter_packet(&self) {
        fatal(self.try_enter_packet());
    }

    /// # Panics
    /// If the packet scope is not active.
    pub fn leave_packet(&self) {
        fatal(self.try_leave_packet());
    }

    /// # Panics
    /// If the session scope is already active.
    pub fn enter_session(&self) {
        fatal(self.try_enter_session());
    }

    /// # Panics
    /// If the session scope is inactive or the packet scope still active.
    pub fn leave_session(&self) {
        fatal(self.try_leave_session());
    }

    /// Fails if packet or session is still active.
    pub fn ensure_idle(&self) -> Result<(), ScopeError> {
        for kind in [ScopeKind::Packet, ScopeKind::Session] {
            if self.is_active(kind) {
                return Err(ScopeError::ActiveAtTeardown(kind));
            }
        }
        Ok(())
    }

    /// Destroys all three arenas.
    pub fn teardown(self) -> Result<(), ScopeError> {
        self.ensure_idle()?;
        self.packet.destroy();
        self.session.destroy();
        self.process.destroy();
        Ok(())
    }
}

#[track_caller]
fn fatal(result: Result<(), ScopeError>) {
    if let Err(err) = result {
        panic!("memory scope violation: {err}");
    }
}

thread_local! {
    static SCOPES: RefCell<Option<Scopes>> = const { RefCell::new(None) };
}

/// Installs this thread's scopes and applies the strategy override. A
/// rejected call leaves the override untouched.
pub fn init_scopes(settings: &ScopeSettings) -> Result<(), ScopeError> {
    SCOPES.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(ScopeError::AlreadyInitialized);
        }
        crate::alloc::set_kind_override(settings.kind_override);
        *slot = Some(Scopes::new(settings));
        info!(
            packet = %settings.packet,
            session = %settings.session,
            process = %settings.process,
            "memory scopes initialized"
        );
        Ok(())
    })
}

/// Tears down this thread's scopes. They are left installed on failure.
pub fn cleanup_scopes() -> Result<(), ScopeError> {
    SCOPES.with(|slot| {
        let mut slot = slot.borrow_mut();
        let scopes = slot.as_ref().ok_or(ScopeError::NotInitialized)?;
        scopes.ensure_idle()?;
        if let Some(scopes) = slot.take() {
            scopes.teardown()?;
        }
        info!("memory scopes torn down");
        Ok(())
    })
}

/// Whether this thread's scopes are installed.
pub fn scopes_initialized() -> bool {
    SCOPES.with(|slot| slot.borrow().is_some())
}

/// Runs `f` against this thread's scopes.
pub fn with_scopes<R>(f: impl FnOnce(&Scopes) -> R) -> Result<R, ScopeError> {
    SCOPES.with(|slot| {
        let slot = slot.borrow();
        slot.as_ref().map(f).ok_or(ScopeError::NotInitialized)
    })
}

#[track_caller]
fn scope_handle(kind: ScopeKind) -> Allocator {
    match with_scopes(|scopes| scopes.get(kind).clone()) {
        Ok(allocator) => allocator,
        Err(err) => panic!("memory scope violation: {err}"),
    }
}

/// Handle onto this thread's packet arena.
///
/// # Panics
/// If the scopes are not initialized.
#[track_caller]
pub fn packet_scope() -> Allocator {
    scope_handle(ScopeKind::Packet)
}

/// Handle onto this thread's session arena.
#[track_caller]
pub fn session_scope() -> Allocator {
    scope_handle(ScopeKind::Session)
}

/// Handle onto this thread's process arena.
#[track_caller]
pub fn process_scope() -> Allocator {
    scope_handle(ScopeKind::Process)
}

#[track_caller]
pub fn enter_packet_scope() {
    fatal(with_scopes(Scopes::try_enter_packet).and_then(|r| r));
}

#[track_caller]
pub fn leave_packet_scope() {
    fatal(with_scopes(Scopes::try_leave_packet).and_then(|r| r));
}

#[track_caller]
pub fn enter_session_scope() {
    fatal(with_scopes(Scopes::try_enter_session).and_then(|r| r));
}

#[track_caller]
pub fn leave_session_scope() {
    fatal(with_scopes(Scopes::try_leave_session).and_then(|r| r));
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    fn scopes() -> Scopes {
        Scopes::new(&ScopeSettings::default())
    }

    #[test]
    fn test_default_settings_pick_fast_packet_arena() {
        let scopes = scopes();
        assert_eq!(scopes.packet().kind(), AllocatorKind::BlockFast);
        assert_eq!(scopes.session().kind(), AllocatorKind::Block);
        assert_eq!(scopes.process().kind(), AllocatorKind::Block);
        assert!(scopes.is_active(ScopeKind::Process));
        assert!(!scopes.is_active(ScopeKind::Session));
        assert!(!scopes.is_active(ScopeKind::Packet));
    }

    #[test]
    fn test_packet_requires_session() {
        let scopes = scopes();
        assert_eq!(
            scopes.try_enter_packet(),
            Err(ScopeError::ParentInactive {
                scope: ScopeKind::Packet,
                parent: ScopeKind::Session,
            })
        );
    }

    #[test]
    fn test_nested_enter_and_leave() {
        let scopes = scopes();
        scopes.enter_session();
        scopes.enter_packet();
        assert_eq!(
            scopes.try_leave_session(),
            Err(ScopeError::ChildActive {
                scope: ScopeKind::Session,
                child: ScopeKind::Packet,
            })
        );
        scopes.leave_packet();
        scopes.leave_session();
        assert_eq!(scopes.session().generation(), 1);
        assert_eq!(scopes.packet().generation(), 1);
    }

    #[test]
    fn test_double_enter_and_leave_are_rejected() {
        let scopes = scopes();
        scopes.enter_session();
        assert_eq!(
            scopes.try_enter_session(),
            Err(ScopeError::AlreadyActive(ScopeKind::Session))
        );
        assert_eq!(
            scopes.try_leave_packet(),
            Err(ScopeError::NotActive(ScopeKind::Packet))
        );
    }

    #[test]
    fn test_teardown_requires_idle_scopes() {
        let scopes = scopes();
        scopes.enter_session();
        assert_eq!(
            scopes.ensure_idle(),
            Err(ScopeError::ActiveAtTeardown(ScopeKind::Session))
        );
        scopes.leave_session();
        let packet = scopes.packet().clone();
        scopes.teardown().unwrap();
        assert!(packet.is_destroyed());
    }

    #[test]
    #[should_panic(expected = "memory scope violation: packet scope is not active")]
    fn test_asserting_form_panics() {
        scopes().leave_packet();
    }

    #[traced_test]
    #[test]
    fn test_thread_scopes_lifecycle() {
        init_scopes(&ScopeSettings::default()).unwrap();
        assert_eq!(
            init_scopes(&ScopeSettings::default()),
            Err(ScopeError::AlreadyInitialized)
        );
        assert!(logs_contain("memory scopes initialized"));

        enter_session_scope();
        enter_packet_scope();
        assert!(logs_contain("entered scope"));
        assert_eq!(
            cleanup_scopes(),
            Err(ScopeError::ActiveAtTeardown(ScopeKind::Packet))
        );
        assert!(scopes_initialized());

        leave_packet_scope();
        leave_session_scope();
        cleanup_scopes().unwrap();
        assert!(logs_contain("memory scopes torn down"));
        assert!(!scopes_initialized());
        assert_eq!(cleanup_scopes(), Err(ScopeError::NotInitialized));
    }

    #[test]
    #[should_panic(expected = "memory scopes are not initialized")]
    fn test_scope_handles_require_init() {
        packet_scope();
    }
}
