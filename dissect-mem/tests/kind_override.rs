//! The strategy override is process-wide, so it gets a test binary of its own.

use dissect_mem::alloc::kind_override;
use dissect_mem::{Allocator, AllocatorKind, ScopeSettings};

#[test]
fn test_override_applies_to_allocators_created_after_init() {
    let before = Allocator::new(AllocatorKind::Block);

    dissect_mem::init_with(&ScopeSettings {
        kind_override: Some(AllocatorKind::Strict),
        ..ScopeSettings::default()
    })
    .unwrap();
    assert_eq!(kind_override(), Some(AllocatorKind::Strict));

    for scope in [
        dissect_mem::packet_scope(),
        dissect_mem::session_scope(),
        dissect_mem::process_scope(),
    ] {
        assert_eq!(scope.kind(), AllocatorKind::Strict, "{}", scope.label());
    }
    assert_eq!(Allocator::new(AllocatorKind::BlockFast).kind(), AllocatorKind::Strict);
    assert_eq!(before.kind(), AllocatorKind::Block);

    dissect_mem::cleanup().unwrap();
    dissect_mem::set_kind_override(None);
    assert_eq!(Allocator::new(AllocatorKind::Simple).kind(), AllocatorKind::Simple);
}
