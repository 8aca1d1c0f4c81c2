#![deny(missing_docs)]
//! Subprocess-backed module runtimes for interpose.
//!
//! [`ProcessRuntime`] starts a fresh OS process per invocation: the
//! invocation document goes to stdin, the response is read from stdout,
//! and a non-zero exit is abnormal termination with stderr as the
//! diagnostic. [`WasiRuntime`] runs a WASI module the same way through an
//! external engine binary.
//!
//! Each child gets an empty environment plus whatever was configured
//! explicitly, its own process group on Unix, and optionally an
//! address-space cap. Output beyond the cap kills the child immediately.

mod process;
mod wasi;

pub use process::ProcessRuntime;
pub use wasi::{DEFAULT_ENGINE, WasiRuntime};
