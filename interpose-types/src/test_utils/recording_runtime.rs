//! RecordingRuntime: captures every input and answers from a closure.

use crate::error::RuntimeError;
use crate::module::{CallContext, ModuleRuntime, RawOutput, RuntimeKind};
use async_trait::async_trait;
use std::sync::Mutex;

type Responder = Box<dyn Fn(&serde_json::Value) -> RawOutput + Send + Sync>;

/// A runtime that parses each input as JSON, keeps it, and answers with
/// whatever the responder returns for it.
pub struct RecordingRuntime {
    respond: Responder,
    inputs: Mutex<Vec<serde_json::Value>>,
}

impl RecordingRuntime {
    /// Answer each call with `respond(input)`.
    pub fn new(respond: impl Fn(&serde_json::Value) -> RawOutput + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Record inputs and answer with zero bytes.
    pub fn passthrough() -> Self {
        Self::new(|_| RawOutput::success(Vec::new()))
    }

    /// Snapshot of every input received, in call order.
    pub fn inputs(&self) -> Vec<serde_json::Value> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModuleRuntime for RecordingRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::InProcess
    }

    async fn call(&self, input: Vec<u8>, _ctx: &CallContext) -> Result<RawOutput, RuntimeError> {
        let doc: serde_json::Value = serde_json::from_slice(&input)
            .map_err(|e| RuntimeError::Other(Box::new(e)))?;
        let out = (self.respond)(&doc);
        self.inputs.lock().unwrap().push(doc);
        Ok(out)
    }
}
