//! The chain executor: `Ready -> Running(0) -> ... -> Running(N-1) -> Done`,
//! or `Running(i) -> Aborted`.

use crate::merge::merge;
use interpose_invoker::{Invocation, Invoker};
use interpose_types::{
    ChainFinish, ChainPolicy, DispatchEvent, Envelope, ExecutionOutcome, ExecutionStatus,
    FailurePolicy, FailureReason, Leg, ModuleRef, ModuleResult, ModuleRuntime, ModuleSpec,
    CancellationToken, NoopSink, ObservabilitySink, RouteId, StepOutcome, StepRecord,
};
use std::sync::Arc;
use tokio::time::Instant;

/// One resolved module in a chain.
#[derive(Clone)]
pub struct ChainStep {
    /// Module name.
    pub module: ModuleRef,
    /// Runtime that executes it.
    pub runtime: Arc<dyn ModuleRuntime>,
    /// Its limits and retry eligibility.
    pub spec: ModuleSpec,
}

impl std::fmt::Debug for ChainStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStep")
            .field("module", &self.module)
            .field("runtime", &self.runtime.kind())
            .field("spec", &self.spec)
            .finish()
    }
}

/// An ordered, immutable module sequence bound to one (route, leg).
///
/// Built once at registration and shared across dispatches behind an
/// `Arc`. Nothing in a chain changes while it runs.
#[derive(Debug, Clone)]
pub struct Chain {
    route: RouteId,
    leg: Leg,
    steps: Vec<ChainStep>,
    policy: ChainPolicy,
}

impl Chain {
    /// Bind `steps` to (`route`, `leg`) under `policy`.
    pub fn new(route: RouteId, leg: Leg, steps: Vec<ChainStep>, policy: ChainPolicy) -> Self {
        Self {
            route,
            leg,
            steps,
            policy,
        }
    }

    /// Route this chain belongs to.
    pub fn route(&self) -> &RouteId {
        &self.route
    }

    /// Leg this chain runs on.
    pub fn leg(&self) -> Leg {
        self.leg
    }

    /// Failure and retry policy.
    pub fn policy(&self) -> ChainPolicy {
        self.policy
    }

    /// The steps, in execution order.
    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    /// Module names, in execution order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleRef> {
        self.steps.iter().map(|s| &s.module)
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True for a chain with no modules.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Runs chains. Holds no per-dispatch state, so one executor serves any
/// number of concurrent dispatches.
#[derive(Clone)]
pub struct ChainExecutor {
    invoker: Invoker,
    sink: Arc<dyn ObservabilitySink>,
}

impl Default for ChainExecutor {
    fn default() -> Self {
        Self::new(Invoker::default(), Arc::new(NoopSink))
    }
}

impl ChainExecutor {
    /// An executor that invokes through `invoker` and reports to `sink`.
    pub fn new(invoker: Invoker, sink: Arc<dyn ObservabilitySink>) -> Self {
        Self { invoker, sink }
    }

    /// The sink events are reported to.
    pub fn sink(&self) -> &Arc<dyn ObservabilitySink> {
        &self.sink
    }

    /// Run `chain` once against `envelope`.
    ///
    /// The envelope's direction is taken as given; stamping it is the
    /// caller's job. `deadline` bounds the whole dispatch and `cancel`
    /// abandons it; either one aborts the chain with `Cancelled`
    /// regardless of policy, and no module is started afterwards.
    pub async fn execute(
        &self,
        chain: &Chain,
        envelope: Envelope,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let mut current = envelope;
        let mut log = Vec::with_capacity(chain.len());

        for (index, step) in chain.steps.iter().enumerate() {
            if cancel.is_cancelled() || Instant::now() >= deadline {
                let status = ExecutionStatus::Aborted {
                    index,
                    reason: FailureReason::Cancelled,
                };
                let finish = ChainFinish::Aborted {
                    index,
                    reason: FailureReason::Cancelled,
                };
                return self.finish(chain, status, finish, log, started);
            }

            let step_started = Instant::now();
            let (result, attempts) = self.run_step(chain, step, &current, deadline, cancel).await;
            let record = StepRecord {
                index,
                module: step.module.clone(),
                outcome: StepOutcome::from_result(&result),
                attempts,
                elapsed: step_started.elapsed(),
            };
            tracing::debug!(
                route = %chain.route,
                leg = %chain.leg,
                index,
                module = %step.module,
                outcome = ?record.outcome,
                attempts,
                elapsed_ms = record.elapsed.as_millis() as u64,
                "interpose.step.completed"
            );
            self.sink.record(&DispatchEvent::StepCompleted {
                route: chain.route.clone(),
                leg: chain.leg,
                record: record.clone(),
            });
            log.push(record);

            let Err(reason) = merge(&mut current, result) else {
                continue;
            };
            // Cancellation aborts under either policy.
            let fail_open = chain.policy.on_failure == FailurePolicy::FailOpen
                && reason != FailureReason::Cancelled;
            let (status, finish) = if fail_open {
                let status = ExecutionStatus::Done {
                    envelope: current,
                    failed_open_at: Some(index),
                };
                (status, ChainFinish::FailedOpen { index, reason })
            } else {
                let finish = ChainFinish::Aborted {
                    index,
                    reason: reason.clone(),
                };
                (ExecutionStatus::Aborted { index, reason }, finish)
            };
            return self.finish(chain, status, finish, log, started);
        }

        let status = ExecutionStatus::Done {
            envelope: current,
            failed_open_at: None,
        };
        self.finish(chain, status, ChainFinish::Done, log, started)
    }

    /// Invoke one module, retrying a timeout once when allowed.
    async fn run_step(
        &self,
        chain: &Chain,
        step: &ChainStep,
        current: &Envelope,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> (ModuleResult, u32) {
        // The module only ever gets a serialized copy.
        let input = match interpose_codec::encode(current) {
            Ok(bytes) => bytes,
            Err(e) => {
                let reason = FailureReason::ModuleError {
                    diagnostic: e.to_string(),
                };
                return (ModuleResult::Failed(reason), 0);
            }
        };

        let retry_allowed = chain.policy.retry.retry_timeouts && step.spec.side_effect_free;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let invocation = Invocation {
                module: &step.module,
                runtime: step.runtime.as_ref(),
                limits: step.spec.limits,
                deadline,
                cancel,
            };
            let result = self.invoker.invoke(invocation, input.clone()).await;
            let timed_out = matches!(result, ModuleResult::Failed(FailureReason::Timeout { .. }));
            if timed_out && retry_allowed && attempts == 1 {
                tracing::debug!(
                    route = %chain.route,
                    module = %step.module,
                    "interpose.step.retry"
                );
                continue;
            }
            return (result, attempts);
        }
    }

    fn finish(
        &self,
        chain: &Chain,
        status: ExecutionStatus,
        finish: ChainFinish,
        log: Vec<StepRecord>,
        started: Instant,
    ) -> ExecutionOutcome {
        let elapsed = started.elapsed();
        match &finish {
            ChainFinish::Done => tracing::debug!(
                route = %chain.route,
                leg = %chain.leg,
                steps = log.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "interpose.chain.completed"
            ),
            ChainFinish::FailedOpen { index, reason } => tracing::warn!(
                route = %chain.route,
                leg = %chain.leg,
                index,
                reason = %reason,
                "interpose.chain.failed_open"
            ),
            ChainFinish::Aborted { index, reason } => tracing::warn!(
                route = %chain.route,
                leg = %chain.leg,
                index,
                reason = %reason,
                policy = %chain.policy.on_failure,
                "interpose.chain.aborted"
            ),
        }
        self.sink.record(&DispatchEvent::ChainFinished {
            route: chain.route.clone(),
            leg: chain.leg,
            finish,
            elapsed,
        });

        ExecutionOutcome {
            status,
            log,
            policy: chain.policy,
        }
    }
}
