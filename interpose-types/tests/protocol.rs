//! Protocol-level tests for the interpose data model.
//!
//! Tests cover:
//! - Trait object safety (Box/Arc<dyn Trait> is Send + Sync)
//! - Envelope wire shape

use interpose_types::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// --- object safety ---

fn _assert_send_sync<T: Send + Sync>() {}

#[test]
fn module_runtime_is_object_safe_send_sync() {
    _assert_send_sync::<Box<dyn ModuleRuntime>>();
    _assert_send_sync::<Arc<dyn ModuleRuntime>>();
}

#[test]
fn observability_sink_is_object_safe_send_sync() {
    _assert_send_sync::<Box<dyn ObservabilitySink>>();
    _assert_send_sync::<Arc<dyn ObservabilitySink>>();
}

#[test]
fn errors_are_send_sync() {
    _assert_send_sync::<RuntimeError>();
    _assert_send_sync::<RegistryError>();
    _assert_send_sync::<ChainAborted>();
}

// --- envelope wire shape ---

#[test]
fn envelope_deserializes_without_headers() {
    let env: Envelope = serde_json::from_value(json!({
        "payload": {"id": 7},
        "direction": "outbound"
    }))
    .unwrap();
    assert_eq!(env.direction, Leg::Request);
    assert!(env.headers.is_empty());
    assert!(env.route.is_none());
}

#[test]
fn envelope_headers_collapse_case_variants() {
    let env: Envelope = serde_json::from_value(json!({
        "payload": null,
        "headers": {"X-Id": "1"},
        "direction": "response",
        "route": {"target": "billing"}
    }))
    .unwrap();
    assert_eq!(env.headers.get("x-id"), Some("1"));
    assert_eq!(env.route.unwrap().target.as_deref(), Some("billing"));
}

#[test]
fn resource_limit_defaults() {
    let limits = ResourceLimits::default();
    assert_eq!(limits.timeout, Duration::from_secs(1));
    assert_eq!(limits.max_output_bytes, 1024 * 1024);
    assert!(limits.memory_bytes.is_none());
}
