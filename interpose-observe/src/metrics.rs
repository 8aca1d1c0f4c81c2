//! In-process counters, keyed the way interceptor metrics are reported:
//! per route, module and leg.

use interpose_types::{
    ChainFinish, DispatchEvent, FailureReason, Leg, ModuleRef, ObservabilitySink, RouteId,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// Counters for one (route, module, leg).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModuleStats {
    /// Completed steps, retries counted once.
    pub invocations: u64,
    /// Steps that ended in failure.
    pub failures: u64,
    /// Failures that were timeouts.
    pub timeouts: u64,
    /// Wall time across all steps, in milliseconds.
    pub total_duration_ms: u64,
}

/// Counters for one (route, leg).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainStats {
    /// Dispatches that reached a terminal state.
    pub dispatches: u64,
    /// Dispatches that aborted.
    pub aborted: u64,
    /// Dispatches that failed open.
    pub failed_open: u64,
}

/// A point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Keyed by `route/leg/module`.
    pub modules: BTreeMap<String, ModuleStats>,
    /// Keyed by `route/leg`.
    pub chains: BTreeMap<String, ChainStats>,
}

#[derive(Default)]
struct Counters {
    modules: BTreeMap<(RouteId, Leg, ModuleRef), ModuleStats>,
    chains: BTreeMap<(RouteId, Leg), ChainStats>,
}

/// A sink that aggregates counters behind a mutex.
#[derive(Default)]
pub struct MetricsSink {
    counters: Mutex<Counters>,
}

impl MetricsSink {
    /// Empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for one module on one route and leg.
    pub fn module(&self, route: &RouteId, leg: Leg, module: &ModuleRef) -> ModuleStats {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .modules
            .get(&(route.clone(), leg, module.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Counters for one chain.
    pub fn chain(&self, route: &RouteId, leg: Leg) -> ChainStats {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .chains
            .get(&(route.clone(), leg))
            .copied()
            .unwrap_or_default()
    }

    /// Copy every counter out.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        MetricsSnapshot {
            modules: counters
                .modules
                .iter()
                .map(|((route, leg, module), stats)| (format!("{route}/{leg}/{module}"), *stats))
                .collect(),
            chains: counters
                .chains
                .iter()
                .map(|((route, leg), stats)| (format!("{route}/{leg}"), *stats))
                .collect(),
        }
    }
}

fn millis(d: &Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl ObservabilitySink for MetricsSink {
    fn record(&self, event: &DispatchEvent) {
        // Counters stay valid after a recorder panic.
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        match event {
            DispatchEvent::StepCompleted { route, leg, record } => {
                let stats = counters
                    .modules
                    .entry((route.clone(), *leg, record.module.clone()))
                    .or_default();
                stats.invocations += 1;
                stats.total_duration_ms += millis(&record.elapsed);
                if let Some(reason) = record.outcome.failure() {
                    stats.failures += 1;
                    if matches!(reason, FailureReason::Timeout { .. }) {
                        stats.timeouts += 1;
                    }
                }
            }
            DispatchEvent::ChainFinished {
                route, leg, finish, ..
            } => {
                let stats = counters.chains.entry((route.clone(), *leg)).or_default();
                stats.dispatches += 1;
                match finish {
                    ChainFinish::Done => {}
                    ChainFinish::FailedOpen { .. } => stats.failed_open += 1,
                    ChainFinish::Aborted { .. } => stats.aborted += 1,
                }
            }
            _ => {}
        }
    }
}
