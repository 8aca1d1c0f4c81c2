//! The module runtime protocol: run untrusted code against one envelope.

use crate::error::RuntimeError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-module wall-clock budget when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Output cap when none is configured (1 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1 << 20;

/// How long a cancelled invocation gets to be killed and reaped.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Budgets enforced on every invocation of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum time from start to terminal output.
    pub timeout: Duration,
    /// Maximum number of output bytes the host will buffer.
    pub max_output_bytes: usize,
    /// Address-space cap, where the runtime can enforce one.
    pub memory_bytes: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            memory_bytes: None,
        }
    }
}

impl ResourceLimits {
    /// Replace the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the output cap.
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Set an address-space cap.
    pub fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = Some(bytes);
        self
    }
}

/// Everything the host knows about a registered module besides its runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleSpec {
    /// Budgets for each invocation.
    pub limits: ResourceLimits,
    /// Declared free of side effects, which makes a timeout retry safe.
    pub side_effect_free: bool,
}

impl ModuleSpec {
    /// A spec with the given limits, not side-effect-free.
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            side_effect_free: false,
        }
    }

    /// Mark the module as side-effect-free.
    pub fn side_effect_free(mut self) -> Self {
        self.side_effect_free = true;
        self
    }
}

/// The family of sandbox a runtime executes modules in.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeKind {
    /// A fresh OS process per invocation.
    Process,
    /// A bytecode module run by a sandboxing engine.
    Bytecode,
    /// A plugin running inside the host process.
    InProcess,
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeKind::Process => f.write_str("process"),
            RuntimeKind::Bytecode => f.write_str("bytecode"),
            RuntimeKind::InProcess => f.write_str("in_process"),
        }
    }
}

/// Per-call context handed to a runtime.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Budgets for this call. Runtimes enforce `max_output_bytes` and
    /// `memory_bytes` themselves; the invoker owns the timeout.
    pub limits: ResourceLimits,
    /// Cancelled when the invocation must stop.
    pub cancel: CancellationToken,
    /// Time allowed between cancellation and the runtime returning.
    pub grace: Duration,
}

impl CallContext {
    /// A context with a fresh token and the default grace period.
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            cancel: CancellationToken::new(),
            grace: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// How a module's execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The module finished normally.
    Success,
    /// The module reported abnormal termination.
    Abnormal {
        /// Whatever the module emitted to explain itself.
        diagnostic: String,
    },
}

/// Raw result of running a module, before the host interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    /// Success or abnormal termination.
    pub completion: Completion,
    /// Bytes the module produced as its response.
    pub stdout: Vec<u8>,
}

impl RawOutput {
    /// Normal completion with the given output.
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            completion: Completion::Success,
            stdout: stdout.into(),
        }
    }

    /// Abnormal termination with a diagnostic and no output.
    pub fn abnormal(diagnostic: impl Into<String>) -> Self {
        Self {
            completion: Completion::Abnormal {
                diagnostic: diagnostic.into(),
            },
            stdout: Vec::new(),
        }
    }
}

/// A sandbox that can run one module against one serialized envelope.
///
/// Implementations:
/// - `ProcessRuntime`: fresh OS process, envelope on stdin, response on stdout
/// - `WasiRuntime`: WASI module run by an external engine, same ABI
/// - `LocalRuntime`: async plugin inside the host process
///
/// The runtime only ever sees `input`; it never receives host state.
/// When `ctx.cancel` fires it must stop the execution and return within
/// `ctx.grace`. Nothing it starts may keep running after `call` returns.
#[async_trait]
pub trait ModuleRuntime: Send + Sync {
    /// Which sandbox family this is.
    fn kind(&self) -> RuntimeKind;

    /// Run the module once.
    async fn call(&self, input: Vec<u8>, ctx: &CallContext) -> Result<RawOutput, RuntimeError>;

    /// Release resources held across calls.
    async fn close(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}
