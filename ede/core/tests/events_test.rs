//! Event kind tests for ede-core
//! These tests run on the host with std, but verify no_std compatible code

use ede_core::{EdeError, EventKind, SenderHandle};

#[test]
fn test_engine_kinds_above_producer_range() {
    assert!(EventKind::EXTERNAL_SOURCE_INIT.is_engine_internal());
    assert!(EventKind::INTERNAL_SOURCE_INIT.is_engine_internal());
    assert!(EventKind::TIMER_ELAPSED.is_engine_internal());
    assert!(!EventKind::LAST.is_engine_internal());
    assert!(!EventKind::FIRST_CUSTOM.is_engine_internal());
}

#[test]
fn test_engine_kinds_are_distinct() {
    assert_ne!(EventKind::EXTERNAL_SOURCE_INIT, EventKind::INTERNAL_SOURCE_INIT);
    assert_ne!(EventKind::INTERNAL_SOURCE_INIT, EventKind::TIMER_ELAPSED);
    assert_ne!(EventKind::EXTERNAL_SOURCE_INIT, EventKind::TIMER_ELAPSED);
}

#[test]
fn test_predefined_range() {
    assert!(EventKind::new(5).is_predefined());
    assert!(EventKind::LAST_PREDEFINED.is_predefined());
    assert!(!EventKind::FIRST_CUSTOM.is_predefined());
}

#[test]
fn test_kind_display() {
    assert_eq!(EventKind::new(42).to_string(), "EventKind(42)");
    assert_eq!(EventKind::TIMER_ELAPSED.to_string(), "EventKind(TIMER)");
}

#[test]
fn test_sender_handle_roundtrip() {
    let handle = SenderHandle::from(0x7ff);
    assert_eq!(handle.raw(), 0x7ff);
    assert_eq!(handle.to_string(), "SenderHandle(0x7ff)");
}

#[test]
fn test_error_display() {
    assert_eq!(EdeError::CapacityExhausted.to_string(), "Table capacity exhausted");
    assert_eq!(EdeError::QueueFull.to_string(), "Queue is full");
}
