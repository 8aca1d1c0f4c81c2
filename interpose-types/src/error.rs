//! Error types, one per boundary.

use crate::id::ModuleRef;
use crate::policy::FailurePolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why one module invocation failed.
///
/// Every parse problem and resource violation ends up here; none of them
/// may panic the host.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// No terminal output within the module's budget.
    #[error("module timed out after {timeout_ms}ms")]
    Timeout {
        /// The budget that expired.
        timeout_ms: u64,
    },

    /// The module terminated abnormally.
    #[error("module error: {diagnostic}")]
    ModuleError {
        /// Diagnostic the module (or its runtime) emitted.
        diagnostic: String,
    },

    /// Non-empty output that is not a valid response document.
    #[error("malformed module output: {detail}")]
    MalformedOutput {
        /// What was wrong with it.
        detail: String,
    },

    /// The module produced more output than the host will buffer.
    #[error("module output exceeded {limit} bytes")]
    OutputTooLarge {
        /// The configured cap.
        limit: usize,
    },

    /// The dispatch's deadline passed or its caller cancelled it.
    #[error("dispatch cancelled")]
    Cancelled,
}

impl FailureReason {
    /// Short stable name, used as a log and metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::Timeout { .. } => "timeout",
            FailureReason::ModuleError { .. } => "module_error",
            FailureReason::MalformedOutput { .. } => "malformed_output",
            FailureReason::OutputTooLarge { .. } => "output_too_large",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

/// Returned to callers when a chain aborted. The message must not proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("chain aborted at module {index} ({policy}): {reason}")]
pub struct ChainAborted {
    /// Policy of the chain that aborted.
    pub policy: FailurePolicy,
    /// Position of the failing module.
    pub index: usize,
    /// Why it failed.
    pub reason: FailureReason,
}

/// Failures inside a module runtime.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The sandbox could not be started.
    #[error("failed to start module: {0}")]
    Spawn(String),

    /// I/O with the sandbox failed.
    #[error("module i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Output went over the cap; the execution was stopped.
    #[error("module output exceeded {limit} bytes")]
    OutputTooLarge {
        /// The configured cap.
        limit: usize,
    },

    /// The call was cancelled before it finished.
    #[error("invocation cancelled")]
    Cancelled,

    /// The runtime was closed.
    #[error("runtime closed")]
    Closed,

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Envelope encoding and response decoding errors.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The envelope could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The module's output is not a valid response document.
    #[error("{0}")]
    Malformed(String),
}

/// Registration errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A chain references a module that was never registered.
    #[error("unknown module: {0}")]
    UnknownModule(ModuleRef),

    /// A module name was registered twice.
    #[error("module already registered: {0}")]
    DuplicateModule(ModuleRef),

    /// A chain contains an empty module reference.
    #[error("chain for route {0} has an empty module reference")]
    EmptyChainRef(crate::id::RouteId),

    /// Configuration named an in-process plugin the host did not supply.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    /// A runtime failed while being built or closed.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration loading errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("read {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid YAML for the config schema.
    #[error("parse: {0}")]
    Parse(String),

    /// The config parsed but failed validation. Every problem is listed.
    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
