//! WASI modules behind an external engine.

use crate::process::ProcessRuntime;
use async_trait::async_trait;
use interpose_types::{CallContext, ModuleRuntime, RawOutput, RuntimeError, RuntimeKind};
use std::path::{Path, PathBuf};

/// Engine used when none is configured.
pub const DEFAULT_ENGINE: &str = "wasmtime";

/// Runs a WASI module through an engine binary such as `wasmtime run`.
///
/// The module uses the same ABI as a subprocess module: it reads the
/// invocation document from stdin and writes its response to stdout. The
/// engine provides the bytecode sandbox; the host still enforces every
/// limit on the engine process.
#[derive(Debug, Clone)]
pub struct WasiRuntime {
    module: PathBuf,
    inner: ProcessRuntime,
}

impl WasiRuntime {
    /// Run `module` with `wasmtime run`.
    pub fn new(module: impl Into<PathBuf>) -> Self {
        Self::with_engine(module, DEFAULT_ENGINE, ["run"])
    }

    /// Run `module` with `engine`, passing `engine_args` before the module path.
    pub fn with_engine<I, S>(module: impl Into<PathBuf>, engine: impl Into<PathBuf>, engine_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let module = module.into();
        let inner = ProcessRuntime::new(engine)
            .args(engine_args)
            .arg(module.to_string_lossy().into_owned());
        Self { module, inner }
    }

    /// Expose one environment variable to the engine process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner = self.inner.env(key, value);
        self
    }

    /// The module file.
    pub fn module(&self) -> &Path {
        &self.module
    }
}

#[async_trait]
impl ModuleRuntime for WasiRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Bytecode
    }

    async fn call(&self, input: Vec<u8>, ctx: &CallContext) -> Result<RawOutput, RuntimeError> {
        self.inner.call(input, ctx).await
    }
}
