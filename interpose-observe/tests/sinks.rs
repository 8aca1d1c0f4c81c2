use interpose_observe::{FanoutSink, MetricsSink, TracingSink};
use interpose_types::*;
use std::sync::Arc;
use std::time::Duration;

fn step(module: &str, index: usize, outcome: StepOutcome, ms: u64) -> DispatchEvent {
    DispatchEvent::StepCompleted {
        route: RouteId::new("orders"),
        leg: Leg::Request,
        record: StepRecord {
            index,
            module: ModuleRef::new(module),
            outcome,
            attempts: 1,
            elapsed: Duration::from_millis(ms),
        },
    }
}

fn finished(finish: ChainFinish) -> DispatchEvent {
    DispatchEvent::ChainFinished {
        route: RouteId::new("orders"),
        leg: Leg::Request,
        finish,
        elapsed: Duration::from_millis(5),
    }
}

// --- MetricsSink ---

#[test]
fn metrics_count_invocations_failures_and_duration() {
    let sink = MetricsSink::new();
    sink.record(&step("enrich", 0, StepOutcome::Transformed, 3));
    sink.record(&step("enrich", 0, StepOutcome::Unchanged, 4));
    sink.record(&step(
        "enrich",
        0,
        StepOutcome::Failed {
            reason: FailureReason::Timeout { timeout_ms: 10 },
        },
        10,
    ));

    let stats = sink.module(&RouteId::new("orders"), Leg::Request, &ModuleRef::new("enrich"));
    assert_eq!(stats.invocations, 3);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.total_duration_ms, 17);
}

#[test]
fn metrics_are_keyed_by_leg() {
    let sink = MetricsSink::new();
    sink.record(&step("enrich", 0, StepOutcome::Unchanged, 1));
    let other_leg = sink.module(&RouteId::new("orders"), Leg::Response, &ModuleRef::new("enrich"));
    assert_eq!(other_leg.invocations, 0);
}

#[test]
fn metrics_count_chain_outcomes() {
    let sink = MetricsSink::new();
    sink.record(&finished(ChainFinish::Done));
    sink.record(&finished(ChainFinish::Aborted {
        index: 0,
        reason: FailureReason::Cancelled,
    }));
    sink.record(&finished(ChainFinish::FailedOpen {
        index: 1,
        reason: FailureReason::OutputTooLarge { limit: 1 },
    }));
    let stats = sink.chain(&RouteId::new("orders"), Leg::Request);
    assert_eq!(stats.dispatches, 3);
    assert_eq!(stats.aborted, 1);
    assert_eq!(stats.failed_open, 1);
}

#[test]
fn snapshot_serializes_with_readable_keys() {
    let sink = MetricsSink::new();
    sink.record(&step("enrich", 0, StepOutcome::Unchanged, 2));
    sink.record(&finished(ChainFinish::Done));
    let v = serde_json::to_value(sink.snapshot()).unwrap();
    assert_eq!(v["modules"]["orders/request/enrich"]["invocations"], 1);
    assert_eq!(v["chains"]["orders/request"]["dispatches"], 1);
}

#[test]
fn metrics_sink_is_shareable_across_threads() {
    let sink = Arc::new(MetricsSink::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sink = Arc::clone(&sink);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    sink.record(&step("m", 0, StepOutcome::Unchanged, 0));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let stats = sink.module(&RouteId::new("orders"), Leg::Request, &ModuleRef::new("m"));
    assert_eq!(stats.invocations, 800);
}

// --- FanoutSink ---

#[test]
fn fanout_forwards_to_every_sink() {
    let a = Arc::new(MetricsSink::new());
    let b = Arc::new(MetricsSink::new());
    let fanout = FanoutSink::new()
        .with(a.clone())
        .with(b.clone())
        .with(Arc::new(TracingSink::new()));
    assert_eq!(fanout.len(), 3);

    fanout.record(&finished(ChainFinish::Done));
    fanout.flush();

    assert_eq!(a.chain(&RouteId::new("orders"), Leg::Request).dispatches, 1);
    assert_eq!(b.chain(&RouteId::new("orders"), Leg::Request).dispatches, 1);
}

// --- TracingSink ---

#[test]
fn tracing_sink_emits_under_a_subscriber() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        let sink = TracingSink::new();
        sink.record(&step(
            "enrich",
            0,
            StepOutcome::Failed {
                reason: FailureReason::ModuleError {
                    diagnostic: "exit 1".into(),
                },
            },
            1,
        ));
        sink.record(&finished(ChainFinish::Aborted {
            index: 0,
            reason: FailureReason::ModuleError {
                diagnostic: "exit 1".into(),
            },
        }));
    });
}
