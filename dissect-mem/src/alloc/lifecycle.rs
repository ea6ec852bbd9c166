//! ## dissect-mem::alloc::lifecycle
//! **Arena lifecycle callbacks**
//!
//! Structures that live across the bulk frees of one arena (auto-reset maps
//! and trees) attach themselves to their allocators here and are told when
//! the memory under them disappears.

use std::rc::Weak;

/// A structure that can be told about its allocators' lifecycle.
pub trait ScopedStructure {
    /// The data arena was bulk-freed: forget every element.
    fn reset(&self);

    /// The arena holding the structure itself is gone: stop touching any
    /// arena and detach.
    fn on_owner_dropped(&self);
}

/// How a structure relates to the arena it attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachRole {
    /// The arena holds the structure's own header.
    Owner,
    /// The arena holds the structure's elements.
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArenaEvent {
    FreeAll,
    Destroy,
}

pub(crate) struct Attachment {
    role: AttachRole,
    target: Weak<dyn ScopedStructure>,
}

impl Attachment {
    pub(crate) fn new(role: AttachRole, target: Weak<dyn ScopedStructure>) -> Self {
        Self { role, target }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.target.strong_count() > 0
    }

    pub(crate) fn refers_to(&self, target: &Weak<dyn ScopedStructure>) -> bool {
        Weak::ptr_eq(&self.target, target)
    }

    /// Runs the callback for `event`; returns whether to stay attached.
    pub(crate) fn deliver(&self, event: ArenaEvent) -> bool {
        let Some(target) = self.target.upgrade() else {
            return false;
        };
        match (self.role, event) {
            (AttachRole::Data, ArenaEvent::FreeAll) => {
                target.reset();
                true
            }
            (AttachRole::Data, ArenaEvent::Destroy) => {
                target.reset();
                target.on_owner_dropped();
                false
            }
            (AttachRole::Owner, _) => {
                target.on_owner_dropped();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::alloc::{Allocator, AllocatorKind};

    #[derive(Default)]
    struct Probe {
        resets: Cell<u32>,
        dropped: Cell<u32>,
    }

    impl ScopedStructure for Probe {
        fn reset(&self) {
            self.resets.set(self.resets.get() + 1);
        }

        fn on_owner_dropped(&self) {
            self.dropped.set(self.dropped.get() + 1);
        }
    }

    fn weak(probe: &Rc<Probe>) -> Weak<dyn ScopedStructure> {
        let dyn_probe: Rc<dyn ScopedStructure> = probe.clone();
        Rc::downgrade(&dyn_probe)
    }

    #[test]
    fn test_data_attachment_resets_on_every_free_all() {
        let allocator = Allocator::new(AllocatorKind::Block);
        let probe = Rc::new(Probe::default());
        allocator.attach(AttachRole::Data, weak(&probe));

        allocator.free_all();
        allocator.free_all();

        assert_eq!(probe.resets.get(), 2);
        assert_eq!(probe.dropped.get(), 0);
        assert_eq!(allocator.attached_count(), 1);
    }

    #[test]
    fn test_owner_attachment_fires_once() {
        let allocator = Allocator::new(AllocatorKind::Block);
        let probe = Rc::new(Probe::default());
        allocator.attach(AttachRole::Owner, weak(&probe));

        allocator.free_all();
        allocator.free_all();

        assert_eq!(probe.dropped.get(), 1);
        assert_eq!(probe.resets.get(), 0);
        assert_eq!(allocator.attached_count(), 0);
    }

    #[test]
    fn test_destroy_resets_and_drops_data_attachments() {
        let allocator = Allocator::new(AllocatorKind::Simple);
        let probe = Rc::new(Probe::default());
        allocator.attach(AttachRole::Data, weak(&probe));

        allocator.destroy();

        assert_eq!(probe.resets.get(), 1);
        assert_eq!(probe.dropped.get(), 1);
    }

    #[test]
    fn test_dropped_structures_are_pruned() {
        let allocator = Allocator::new(AllocatorKind::Block);
        let probe = Rc::new(Probe::default());
        allocator.attach(AttachRole::Data, weak(&probe));
        drop(probe);

        assert_eq!(allocator.attached_count(), 0);
        allocator.free_all();
    }

    #[test]
    fn test_detach_removes_target() {
        let allocator = Allocator::new(AllocatorKind::Block);
        let probe = Rc::new(Probe::default());
        let target = weak(&probe);
        allocator.attach(AttachRole::Data, target.clone());
        allocator.detach(&target);

        allocator.free_all();
        assert_eq!(probe.resets.get(), 0);
    }
}
