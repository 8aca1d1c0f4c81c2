//! Outcome types: one module invocation, one step of a chain, one dispatch.

use crate::envelope::{Envelope, Headers};
use crate::error::{ChainAborted, FailureReason};
use crate::id::ModuleRef;
use crate::policy::ChainPolicy;
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

/// What a single module invocation produced, after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleResult {
    /// The module emitted nothing; the envelope passes through as-is.
    Unchanged,
    /// The module replaced the payload and optionally updated headers.
    Transformed {
        /// New payload. May have a completely different shape.
        payload: serde_json::Value,
        /// Header updates, applied onto the prior header set.
        headers: Option<Headers>,
    },
    /// The invocation failed.
    Failed(FailureReason),
}

impl ModuleResult {
    /// True for [`ModuleResult::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, ModuleResult::Failed(_))
    }
}

/// How one step of a chain ended, as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Passed through.
    Unchanged,
    /// Replaced the payload.
    Transformed,
    /// Failed.
    Failed {
        /// Why.
        reason: FailureReason,
    },
}

impl StepOutcome {
    /// Summarize a module result for the log.
    pub fn from_result(result: &ModuleResult) -> Self {
        match result {
            ModuleResult::Unchanged => StepOutcome::Unchanged,
            ModuleResult::Transformed { .. } => StepOutcome::Transformed,
            ModuleResult::Failed(reason) => StepOutcome::Failed {
                reason: reason.clone(),
            },
        }
    }

    /// The failure reason, if this step failed.
    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            StepOutcome::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// One entry of the per-dispatch execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// Zero-based position in the chain.
    pub index: usize,
    /// Module that ran.
    pub module: ModuleRef,
    /// How it ended.
    #[serde(flatten)]
    pub outcome: StepOutcome,
    /// Invocations made, 2 when a timeout was retried.
    pub attempts: u32,
    /// Wall time across all attempts.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Terminal state of one chain dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The message may proceed with this envelope.
    Done {
        /// Final envelope.
        envelope: Envelope,
        /// Set when a fail-open chain stopped early at this index. The
        /// envelope is then the last good one before the failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        failed_open_at: Option<usize>,
    },
    /// The message must not proceed.
    Aborted {
        /// Index of the failing module.
        index: usize,
        /// Why it failed.
        reason: FailureReason,
    },
}

/// Everything a dispatch produced: status plus the ordered step log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    /// Done or aborted.
    #[serde(flatten)]
    pub status: ExecutionStatus,
    /// One record per attempted module, in chain order.
    pub log: Vec<StepRecord>,
    /// Policy the chain ran under.
    pub policy: ChainPolicy,
}

impl ExecutionOutcome {
    /// True when the message may proceed.
    pub fn is_done(&self) -> bool {
        matches!(self.status, ExecutionStatus::Done { .. })
    }

    /// True when the message must be dropped.
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, ExecutionStatus::Aborted { .. })
    }

    /// The final envelope, if the dispatch completed.
    pub fn envelope(&self) -> Option<&Envelope> {
        match &self.status {
            ExecutionStatus::Done { envelope, .. } => Some(envelope),
            ExecutionStatus::Aborted { .. } => None,
        }
    }

    /// Collapse to the envelope or the abort error, dropping the log.
    pub fn into_result(self) -> Result<Envelope, ChainAborted> {
        match self.status {
            ExecutionStatus::Done { envelope, .. } => Ok(envelope),
            ExecutionStatus::Aborted { index, reason } => Err(ChainAborted {
                policy: self.policy.on_failure,
                index,
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Leg;
    use crate::policy::FailurePolicy;
    use serde_json::json;

    #[test]
    fn step_record_serializes_flat() {
        let record = StepRecord {
            index: 1,
            module: ModuleRef::new("enrich"),
            outcome: StepOutcome::Failed {
                reason: FailureReason::Timeout { timeout_ms: 50 },
            },
            attempts: 2,
            elapsed: Duration::from_millis(104),
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["outcome"], "failed");
        assert_eq!(v["reason"]["kind"], "timeout");
        assert_eq!(v["attempts"], 2);
        assert_eq!(v["elapsed_ms"], 104);
    }

    #[test]
    fn aborted_outcome_into_result_carries_policy() {
        let outcome = ExecutionOutcome {
            status: ExecutionStatus::Aborted {
                index: 0,
                reason: FailureReason::Cancelled,
            },
            log: vec![],
            policy: ChainPolicy::fail_open(),
        };
        assert!(outcome.is_aborted());
        assert!(outcome.envelope().is_none());
        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.policy, FailurePolicy::FailOpen);
        assert_eq!(err.reason, FailureReason::Cancelled);
    }

    #[test]
    fn done_outcome_serializes_status_tag() {
        let outcome = ExecutionOutcome {
            status: ExecutionStatus::Done {
                envelope: Envelope::new(json!(1), Leg::Response),
                failed_open_at: None,
            },
            log: vec![],
            policy: ChainPolicy::default_for(Leg::Response),
        };
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["status"], "done");
        assert_eq!(v["envelope"]["payload"], 1);
        assert!(v.get("failed_open_at").is_none());
        assert_eq!(v["policy"]["on_failure"], "fail_open");
    }
}
