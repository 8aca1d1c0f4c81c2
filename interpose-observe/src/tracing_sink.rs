//! Concrete [`ObservabilitySink`] using the [`tracing`] crate.

use interpose_types::{ChainFinish, DispatchEvent, ObservabilitySink, StepOutcome};

/// An [`ObservabilitySink`] that emits structured [`tracing`] events.
///
/// Events go to the `interpose::audit` target so they can be routed
/// separately from the executor's own diagnostics.
///
/// | Event | Level |
/// |-------|-------|
/// | step unchanged or transformed, chain done | `DEBUG` |
/// | step failed, chain failed open | `INFO` |
/// | chain aborted | `WARN` |
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create a new `TracingSink`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ObservabilitySink for TracingSink {
    fn record(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::StepCompleted { route, leg, record } => match &record.outcome {
                StepOutcome::Failed { reason } => tracing::info!(
                    target: "interpose::audit",
                    route = %route,
                    leg = %leg,
                    index = record.index,
                    module = %record.module,
                    reason = reason.kind(),
                    detail = %reason,
                    attempts = record.attempts,
                    elapsed_ms = record.elapsed.as_millis() as u64,
                    "interpose.audit.step_failed"
                ),
                outcome => tracing::debug!(
                    target: "interpose::audit",
                    route = %route,
                    leg = %leg,
                    index = record.index,
                    module = %record.module,
                    outcome = ?outcome,
                    elapsed_ms = record.elapsed.as_millis() as u64,
                    "interpose.audit.step"
                ),
            },
            DispatchEvent::ChainFinished {
                route,
                leg,
                finish,
                elapsed,
            } => {
                let elapsed_ms = elapsed.as_millis() as u64;
                match finish {
                    ChainFinish::Done => tracing::debug!(
                        target: "interpose::audit",
                        route = %route,
                        leg = %leg,
                        elapsed_ms,
                        "interpose.audit.chain_done"
                    ),
                    ChainFinish::FailedOpen { index, reason } => tracing::info!(
                        target: "interpose::audit",
                        route = %route,
                        leg = %leg,
                        index,
                        reason = reason.kind(),
                        elapsed_ms,
                        "interpose.audit.chain_failed_open"
                    ),
                    ChainFinish::Aborted { index, reason } => tracing::warn!(
                        target: "interpose::audit",
                        route = %route,
                        leg = %leg,
                        index,
                        reason = reason.kind(),
                        detail = %reason,
                        elapsed_ms,
                        "interpose.audit.chain_aborted"
                    ),
                }
            }
            _ => {}
        }
    }
}
