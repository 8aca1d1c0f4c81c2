//! Failure and retry policy for a chain.

use crate::envelope::Leg;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a chain does when one of its modules fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the chain; the message must not proceed.
    FailClosed,
    /// Stop the chain and continue with the last good envelope.
    FailOpen,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailClosed => f.write_str("fail-closed"),
            FailurePolicy::FailOpen => f.write_str("fail-open"),
        }
    }
}

/// Bounded retry. Only timeouts are ever retried, at most once, and only
/// for modules registered as side-effect-free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Re-run a side-effect-free module once after a timeout.
    #[serde(default)]
    pub retry_timeouts: bool,
}

/// Policy attached to one registered chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPolicy {
    /// Behaviour on module failure.
    pub on_failure: FailurePolicy,
    /// Retry behaviour.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl ChainPolicy {
    /// Fail-closed, no retries.
    pub fn fail_closed() -> Self {
        Self {
            on_failure: FailurePolicy::FailClosed,
            retry: RetryPolicy::default(),
        }
    }

    /// Fail-open, no retries.
    pub fn fail_open() -> Self {
        Self {
            on_failure: FailurePolicy::FailOpen,
            retry: RetryPolicy::default(),
        }
    }

    /// The leg's default failure policy, no retries.
    pub fn default_for(leg: Leg) -> Self {
        Self {
            on_failure: leg.default_failure_policy(),
            retry: RetryPolicy::default(),
        }
    }

    /// Enable the single timeout retry for side-effect-free modules.
    pub fn with_timeout_retry(mut self) -> Self {
        self.retry.retry_timeouts = true;
        self
    }
}
