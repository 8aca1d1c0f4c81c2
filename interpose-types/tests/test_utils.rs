//! Contracts of the in-memory test runtimes and sinks.

#![cfg(feature = "test-utils")]

use interpose_types::test_utils::{RecordingRuntime, RecordingSink, SleepRuntime, StaticRuntime};
use interpose_types::*;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn static_runtime_counts_calls() {
    let rt = StaticRuntime::json(json!({"payload": 1}));
    let ctx = CallContext::new(ResourceLimits::default());
    let out = rt.call(b"{}".to_vec(), &ctx).await.unwrap();
    assert_eq!(out.completion, Completion::Success);
    assert_eq!(out.stdout, br#"{"payload":1}"#);
    rt.call(Vec::new(), &ctx).await.unwrap();
    assert_eq!(rt.calls(), 2);
}

#[tokio::test]
async fn sleep_runtime_stops_on_cancel() {
    let rt = SleepRuntime::new(Duration::from_secs(30));
    let ctx = CallContext::new(ResourceLimits::default());
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
    });
    let err = rt.call(Vec::new(), &ctx).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Cancelled));
    assert_eq!(rt.running(), 0);
}

#[tokio::test]
async fn sleep_runtime_slow_for_first_calls_only() {
    let rt = SleepRuntime::new(Duration::from_secs(30)).slow_for(0);
    let ctx = CallContext::new(ResourceLimits::default());
    rt.call(Vec::new(), &ctx).await.unwrap();
    assert_eq!(rt.calls(), 1);
}

#[tokio::test]
async fn recording_runtime_keeps_inputs() {
    let rt = RecordingRuntime::new(|doc| RawOutput::success(doc["payload"].to_string()));
    let ctx = CallContext::new(ResourceLimits::default());
    let out = rt.call(br#"{"payload":5}"#.to_vec(), &ctx).await.unwrap();
    assert_eq!(out.stdout, b"5");
    assert_eq!(rt.inputs(), vec![json!({"payload": 5})]);
}

#[test]
fn recording_sink_keeps_events() {
    let sink = RecordingSink::new();
    sink.record(&DispatchEvent::ChainFinished {
        route: RouteId::new("r"),
        leg: Leg::Request,
        finish: ChainFinish::Done,
        elapsed: Duration::ZERO,
    });
    sink.flush();
    assert_eq!(sink.events().len(), 1);
}
