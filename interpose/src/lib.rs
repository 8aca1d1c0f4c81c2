#![deny(missing_docs)]
//! # interpose — umbrella crate
//!
//! A single import surface for the interceptor execution core. Re-exports
//! the protocol crate and each implementation behind feature flags, plus a
//! `prelude` for the common path: load a config, build a coordinator, run
//! a chain.

#[cfg(feature = "core")]
pub use interpose_chain;
#[cfg(feature = "core")]
pub use interpose_codec;
#[cfg(feature = "coordinator")]
pub use interpose_coordinator;
#[cfg(feature = "core")]
pub use interpose_invoker;
#[cfg(feature = "observe")]
pub use interpose_observe;
#[cfg(feature = "runtime-local")]
pub use interpose_runtime_local;
#[cfg(feature = "runtime-process")]
pub use interpose_runtime_process;
#[cfg(feature = "core")]
pub use interpose_types;

/// Happy-path imports for hosting interceptor chains.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use interpose_types::{
        CancellationToken, ChainAborted, ChainPolicy, Envelope, ExecutionOutcome,
        ExecutionStatus, FailurePolicy, FailureReason, Headers, Leg, ModuleRef, ModuleRuntime,
        ModuleSpec, ObservabilitySink, ResourceLimits, RouteId, StepOutcome,
    };

    #[cfg(feature = "core")]
    pub use interpose_chain::{Chain, ChainExecutor};

    #[cfg(feature = "core")]
    pub use interpose_codec::{InvocationDocument, ResponseDocument};

    #[cfg(feature = "runtime-process")]
    pub use interpose_runtime_process::{ProcessRuntime, WasiRuntime};

    #[cfg(feature = "runtime-local")]
    pub use interpose_runtime_local::{LocalRuntime, Plugin, PluginError, json_plugin};

    #[cfg(feature = "coordinator")]
    pub use interpose_coordinator::{Coordinator, InterposeConfig, PluginCatalog};

    #[cfg(feature = "observe")]
    pub use interpose_observe::{FanoutSink, MetricsSink, TracingSink};
}
