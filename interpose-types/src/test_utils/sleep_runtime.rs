//! SleepRuntime: a slow module that honours cancellation.

use crate::error::RuntimeError;
use crate::module::{CallContext, ModuleRuntime, RawOutput, RuntimeKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A runtime that sleeps before answering.
///
/// Tracks how many calls are in flight so tests can check that nothing is
/// left running once the executor has returned.
pub struct SleepRuntime {
    delay: Duration,
    output: RawOutput,
    slow_calls: Option<usize>,
    calls: AtomicUsize,
    running: AtomicUsize,
}

impl SleepRuntime {
    /// Sleep `delay` on every call, then answer with zero bytes.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            output: RawOutput::success(Vec::new()),
            slow_calls: None,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
        }
    }

    /// Answer with `output` once the sleep is over.
    pub fn with_output(mut self, output: RawOutput) -> Self {
        self.output = output;
        self
    }

    /// Only the first `n` calls sleep; later calls answer immediately.
    pub fn slow_for(mut self, n: usize) -> Self {
        self.slow_calls = Some(n);
        self
    }

    /// Calls started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls currently in flight.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModuleRuntime for SleepRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::InProcess
    }

    async fn call(&self, _input: Vec<u8>, ctx: &CallContext) -> Result<RawOutput, RuntimeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.running.fetch_add(1, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        let slow = self.slow_calls.is_none_or(|limit| n < limit);
        if slow {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = ctx.cancel.cancelled() => return Err(RuntimeError::Cancelled),
            }
        }
        Ok(self.output.clone())
    }
}
