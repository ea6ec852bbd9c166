//! Touches the process-wide strategy override, so it runs in its own binary.

use dissect_mem::alloc::kind_override;
use dissect_mem::{Allocator, AllocatorKind, ScopeError, ScopeSettings};

#[test]
fn test_rejected_init_leaves_override_alone() {
    dissect_mem::init().unwrap();

    let second = dissect_mem::init_with(&ScopeSettings {
        kind_override: Some(AllocatorKind::BlockFast),
        ..ScopeSettings::default()
    });
    assert_eq!(second, Err(ScopeError::AlreadyInitialized));
    assert_eq!(kind_override(), None);
    assert_eq!(Allocator::new(AllocatorKind::Block).kind(), AllocatorKind::Block);
    assert_eq!(dissect_mem::process_scope().kind(), AllocatorKind::Block);

    dissect_mem::cleanup().unwrap();
}
