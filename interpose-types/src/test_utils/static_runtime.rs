//! StaticRuntime: returns the same raw output on every call.

use crate::error::RuntimeError;
use crate::module::{CallContext, ModuleRuntime, RawOutput, RuntimeKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A runtime that ignores its input and answers with a fixed output.
pub struct StaticRuntime {
    output: RawOutput,
    calls: AtomicUsize,
}

impl StaticRuntime {
    /// Answer every call with `output`.
    pub fn new(output: RawOutput) -> Self {
        Self {
            output,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer with zero bytes, which the invoker reads as "unchanged".
    pub fn empty() -> Self {
        Self::new(RawOutput::success(Vec::new()))
    }

    /// Answer with a serialized JSON document.
    pub fn json(doc: serde_json::Value) -> Self {
        Self::new(RawOutput::success(doc.to_string()))
    }

    /// Answer with raw bytes.
    pub fn bytes(stdout: impl Into<Vec<u8>>) -> Self {
        Self::new(RawOutput::success(stdout))
    }

    /// Terminate abnormally with a diagnostic.
    pub fn abnormal(diagnostic: impl Into<String>) -> Self {
        Self::new(RawOutput::abnormal(diagnostic))
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleRuntime for StaticRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::InProcess
    }

    async fn call(&self, _input: Vec<u8>, _ctx: &CallContext) -> Result<RawOutput, RuntimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}
