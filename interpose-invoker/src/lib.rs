#![deny(missing_docs)]
//! Module invoker for interpose.
//!
//! The [`Invoker`] runs exactly one module against one serialized envelope
//! and turns whatever happened into a [`ModuleResult`]. It owns the
//! time budget: the runtime call is raced against the module's timeout,
//! the dispatch's overall deadline and the dispatch's cancellation token.
//! When any of those fire, the runtime's own token is cancelled and the
//! call is drained for at most the grace period, so no execution outlives
//! [`Invoker::invoke`].
//!
//! | What happened | Result |
//! |---------------|--------|
//! | module timeout expired | `Failed(Timeout)` |
//! | dispatch deadline expired, or caller cancelled | `Failed(Cancelled)` |
//! | runtime could not start or talk to the module | `Failed(ModuleError)` |
//! | module terminated abnormally | `Failed(ModuleError)` |
//! | output over the cap | `Failed(OutputTooLarge)` |
//! | zero bytes of output | `Unchanged` |
//! | a response document | `Transformed` |
//! | anything else | `Failed(MalformedOutput)` |
//!
//! The invoker never retries.

use interpose_codec::Decoded;
use interpose_types::{
    CallContext, Completion, DEFAULT_GRACE_PERIOD, FailureReason, ModuleRef, ModuleResult,
    ModuleRuntime, RawOutput, ResourceLimits, RuntimeError,
};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One invocation request.
pub struct Invocation<'a> {
    /// Module being run, for logging.
    pub module: &'a ModuleRef,
    /// Runtime that executes it.
    pub runtime: &'a dyn ModuleRuntime,
    /// Budgets for this module.
    pub limits: ResourceLimits,
    /// Overall deadline of the dispatch this invocation belongs to.
    pub deadline: Instant,
    /// Cancellation of the dispatch this invocation belongs to.
    pub cancel: &'a CancellationToken,
}

/// Why the invoker stopped waiting for a call.
enum Interrupt {
    Timeout,
    Cancelled,
}

/// Runs single module invocations under resource limits.
#[derive(Debug, Clone, Copy)]
pub struct Invoker {
    grace: Duration,
}

impl Default for Invoker {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl Invoker {
    /// An invoker that allows `grace` for a cancelled call to wind down.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Grace period for cancelled calls.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Run one module against `input` and classify the result.
    pub async fn invoke(&self, inv: Invocation<'_>, input: Vec<u8>) -> ModuleResult {
        if inv.cancel.is_cancelled() || Instant::now() >= inv.deadline {
            return ModuleResult::Failed(FailureReason::Cancelled);
        }

        let call_cancel = inv.cancel.child_token();
        let ctx = CallContext {
            limits: inv.limits,
            cancel: call_cancel.clone(),
            grace: self.grace,
        };

        tracing::trace!(
            module = %inv.module,
            runtime = %inv.runtime.kind(),
            input_bytes = input.len(),
            "interpose.invoke.started"
        );

        let call = inv.runtime.call(input, &ctx);
        tokio::pin!(call);

        let interrupt = tokio::select! {
            biased;
            _ = inv.cancel.cancelled() => Interrupt::Cancelled,
            result = &mut call => return classify(inv.module, result, &inv.limits),
            _ = tokio::time::sleep_until(inv.deadline) => Interrupt::Cancelled,
            _ = tokio::time::sleep(inv.limits.timeout) => Interrupt::Timeout,
        };

        call_cancel.cancel();
        if tokio::time::timeout(self.grace, &mut call).await.is_err() {
            // The call future is dropped below; runtimes kill on drop.
            tracing::warn!(
                module = %inv.module,
                grace_ms = self.grace.as_millis() as u64,
                "interpose.invoke.grace_exceeded"
            );
        }

        let reason = match interrupt {
            Interrupt::Timeout => FailureReason::Timeout {
                timeout_ms: inv.limits.timeout.as_millis() as u64,
            },
            Interrupt::Cancelled => FailureReason::Cancelled,
        };
        tracing::debug!(module = %inv.module, reason = %reason, "interpose.invoke.interrupted");
        ModuleResult::Failed(reason)
    }
}

/// Turn a finished runtime call into a module result.
fn classify(
    module: &ModuleRef,
    result: Result<RawOutput, RuntimeError>,
    limits: &ResourceLimits,
) -> ModuleResult {
    let raw = match result {
        Ok(raw) => raw,
        Err(RuntimeError::OutputTooLarge { limit }) => {
            return ModuleResult::Failed(FailureReason::OutputTooLarge { limit });
        }
        Err(RuntimeError::Cancelled) => return ModuleResult::Failed(FailureReason::Cancelled),
        Err(e) => {
            tracing::debug!(module = %module, error = %e, "interpose.invoke.runtime_error");
            return ModuleResult::Failed(FailureReason::ModuleError {
                diagnostic: e.to_string(),
            });
        }
    };

    // Abnormal termination wins over whatever was written to stdout.
    if let Completion::Abnormal { diagnostic } = raw.completion {
        return ModuleResult::Failed(FailureReason::ModuleError { diagnostic });
    }

    if raw.stdout.len() > limits.max_output_bytes {
        return ModuleResult::Failed(FailureReason::OutputTooLarge {
            limit: limits.max_output_bytes,
        });
    }

    match interpose_codec::decode(&raw.stdout) {
        Ok(Decoded::Unchanged) => ModuleResult::Unchanged,
        Ok(Decoded::Transformed { payload, headers }) => {
            ModuleResult::Transformed { payload, headers }
        }
        Err(e) => ModuleResult::Failed(FailureReason::MalformedOutput {
            detail: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limits() -> ResourceLimits {
        ResourceLimits::default().with_max_output_bytes(64)
    }

    fn m() -> ModuleRef {
        ModuleRef::new("m")
    }

    #[test]
    fn abnormal_wins_over_parseable_stdout() {
        let raw = RawOutput {
            completion: Completion::Abnormal {
                diagnostic: "exit status 3".into(),
            },
            stdout: br#"{"payload": 1}"#.to_vec(),
        };
        assert_eq!(
            classify(&m(), Ok(raw), &limits()),
            ModuleResult::Failed(FailureReason::ModuleError {
                diagnostic: "exit status 3".into()
            })
        );
    }

    #[test]
    fn oversize_stdout_is_rejected_even_if_runtime_did_not_cap() {
        let raw = RawOutput::success(vec![b' '; 65]);
        assert_eq!(
            classify(&m(), Ok(raw), &limits()),
            ModuleResult::Failed(FailureReason::OutputTooLarge { limit: 64 })
        );
    }

    #[test]
    fn output_exactly_at_cap_is_accepted() {
        let doc = br#"{"payload":"x"}"#;
        let raw = RawOutput::success(doc.to_vec());
        let limits = ResourceLimits::default().with_max_output_bytes(doc.len());
        assert_eq!(
            classify(&m(), Ok(raw), &limits),
            ModuleResult::Transformed {
                payload: json!("x"),
                headers: None
            }
        );
    }

    #[test]
    fn spawn_failure_is_module_error() {
        let result = classify(&m(), Err(RuntimeError::Spawn("no such file".into())), &limits());
        match result {
            ModuleResult::Failed(FailureReason::ModuleError { diagnostic }) => {
                assert!(diagnostic.contains("no such file"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn runtime_cap_maps_to_output_too_large() {
        let result = classify(&m(), Err(RuntimeError::OutputTooLarge { limit: 8 }), &limits());
        assert_eq!(
            result,
            ModuleResult::Failed(FailureReason::OutputTooLarge { limit: 8 })
        );
    }
}
