#![deny(missing_docs)]
//! Observability sinks for interpose.
//!
//! | Sink | What it does |
//! |------|-------------|
//! | [`TracingSink`] | Emits every dispatch event as a `tracing` event on the `interpose::audit` target |
//! | [`MetricsSink`] | Keeps invocation, failure and duration counters per (route, module, leg) |
//! | [`FanoutSink`] | Forwards to several sinks in order |
//!
//! Sinks are injected into the coordinator. Nothing here is global.

mod fanout;
mod metrics;
mod tracing_sink;

pub use fanout::FanoutSink;
pub use metrics::{ChainStats, MetricsSink, MetricsSnapshot, ModuleStats};
pub use tracing_sink::TracingSink;
