//! # interpose-types — data model and protocol traits
//!
//! This crate defines everything the interceptor core shares across its
//! boundaries: the [`Envelope`] that flows through a chain, the typed
//! outcome of one module invocation, the failure taxonomy, and the two
//! protocol traits the rest of the workspace is written against.
//!
//! ## The Protocols
//!
//! | Protocol | Trait | What it does |
//! |----------|-------|-------------|
//! | Module runtime | [`ModuleRuntime`] | Run one untrusted module against one serialized envelope |
//! | Observability | [`ObservabilitySink`] | Receive the ordered per-module event log |
//!
//! The chain executor depends only on [`ModuleRuntime`]. Whether a module
//! is a subprocess, a WASI binary behind an engine, or an in-process
//! plugin is an implementation concern of the runtime crates.
//!
//! ## Data flow
//!
//! ```text
//! Envelope ──encode──▶ bytes ──ModuleRuntime::call──▶ RawOutput
//!     ▲                                                  │
//!     └────────── merge ◀── ModuleResult ◀──classify─────┘
//! ```
//!
//! Payloads are always `serde_json::Value`. A module may change the
//! payload's shape entirely between hops, so nothing downstream assumes a
//! schema.

#![deny(missing_docs)]

pub mod envelope;
pub mod error;
pub mod id;
pub mod module;
pub mod outcome;
pub mod policy;
pub mod sink;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use envelope::{Envelope, Headers, Leg, RouteHints};
pub use error::{
    ChainAborted, CodecError, ConfigError, FailureReason, RegistryError, RuntimeError,
};
pub use id::{ModuleRef, RouteId};
pub use module::{
    CallContext, Completion, ModuleRuntime, ModuleSpec, RawOutput, ResourceLimits, RuntimeKind,
    DEFAULT_GRACE_PERIOD, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT,
};
pub use outcome::{ExecutionOutcome, ExecutionStatus, ModuleResult, StepOutcome, StepRecord};
pub use policy::{ChainPolicy, FailurePolicy, RetryPolicy};
pub use sink::{ChainFinish, DispatchEvent, NoopSink, ObservabilitySink};

pub use tokio_util::sync::CancellationToken;
