//! Observability sink protocol.
//!
//! The executor reports every step and every chain completion to a sink.
//! Sinks must be cheap and must not fail the dispatch: `record` returns
//! nothing, so a broken sink can lose events but never block a message.

use crate::envelope::Leg;
use crate::error::FailureReason;
use crate::id::RouteId;
use crate::outcome::StepRecord;
use std::time::Duration;

/// How a chain dispatch ended, as reported to sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainFinish {
    /// Every module ran.
    Done,
    /// A fail-open chain stopped early and forwarded the last good envelope.
    FailedOpen {
        /// Index of the failing module.
        index: usize,
        /// Why it failed.
        reason: FailureReason,
    },
    /// The chain aborted; the message is dropped.
    Aborted {
        /// Index of the failing module.
        index: usize,
        /// Why it failed.
        reason: FailureReason,
    },
}

/// One observability event.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// A module finished (after any retry).
    StepCompleted {
        /// Route the chain belongs to.
        route: RouteId,
        /// Leg the chain runs on.
        leg: Leg,
        /// The step's log entry.
        record: StepRecord,
    },
    /// A chain dispatch reached a terminal state.
    ChainFinished {
        /// Route the chain belongs to.
        route: RouteId,
        /// Leg the chain runs on.
        leg: Leg,
        /// Terminal state.
        finish: ChainFinish,
        /// Wall time of the whole dispatch.
        elapsed: Duration,
    },
}

/// Receives dispatch events.
pub trait ObservabilitySink: Send + Sync {
    /// Record one event. Must not block for long.
    fn record(&self, event: &DispatchEvent);

    /// Push out anything buffered.
    fn flush(&self) {}
}

/// A sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ObservabilitySink for NoopSink {
    fn record(&self, _event: &DispatchEvent) {}
}
