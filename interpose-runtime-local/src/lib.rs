#![deny(missing_docs)]
//! In-process plugin runtime for interpose.
//!
//! No OS isolation: the plugin runs inside the host. What the runtime does
//! give is the same contract as the sandboxed runtimes. The plugin sees
//! only the serialized invocation document, runs on its own task so a
//! panic becomes abnormal termination instead of taking down the host,
//! and is aborted when the invocation is cancelled.
//!
//! Suitable for trusted transforms compiled into the host, and for tests.
//! Aborting only takes effect at an `.await`: a plugin that loops or
//! blocks synchronously cannot be stopped, and keeps its worker thread
//! after the call has returned `Cancelled`. Untrusted code belongs in a
//! process or WASI runtime.

use async_trait::async_trait;
use interpose_codec::{InvocationDocument, ResponseDocument};
use interpose_types::{CallContext, ModuleRuntime, RawOutput, RuntimeError, RuntimeKind};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Errors a plugin reports. All of them become abnormal termination.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin could not make sense of its input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The plugin failed.
    #[error("{0}")]
    Failed(String),
}

/// A module compiled into the host.
///
/// Receives the invocation document bytes and returns response bytes.
/// Returning an empty vector means "no mutation".
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Transform one serialized envelope.
    async fn transform(&self, input: &[u8]) -> Result<Vec<u8>, PluginError>;
}

struct FnPlugin<F>(F);

#[async_trait]
impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&[u8]) -> Result<Vec<u8>, PluginError> + Send + Sync + 'static,
{
    async fn transform(&self, input: &[u8]) -> Result<Vec<u8>, PluginError> {
        (self.0)(input)
    }
}

/// Wrap a byte-level closure as a plugin.
pub fn plugin_fn<F>(f: F) -> Arc<dyn Plugin>
where
    F: Fn(&[u8]) -> Result<Vec<u8>, PluginError> + Send + Sync + 'static,
{
    Arc::new(FnPlugin(f))
}

/// Wrap a closure over the typed wire documents as a plugin.
///
/// Returning `Ok(None)` writes zero bytes, leaving the envelope unchanged.
pub fn json_plugin<F>(f: F) -> Arc<dyn Plugin>
where
    F: Fn(InvocationDocument) -> Result<Option<ResponseDocument>, PluginError>
        + Send
        + Sync
        + 'static,
{
    plugin_fn(move |input| {
        let doc = InvocationDocument::from_slice(input)
            .map_err(|e| PluginError::InvalidInput(e.to_string()))?;
        match f(doc)? {
            Some(response) => response
                .to_vec()
                .map_err(|e| PluginError::Failed(e.to_string())),
            None => Ok(Vec::new()),
        }
    })
}

/// Aborts the task if the call future is dropped before it finished.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs a [`Plugin`] on its own task per invocation.
pub struct LocalRuntime {
    plugin: Arc<dyn Plugin>,
}

impl LocalRuntime {
    /// Create a runtime for the given plugin.
    pub fn new(plugin: Arc<dyn Plugin>) -> Self {
        Self { plugin }
    }
}

#[async_trait]
impl ModuleRuntime for LocalRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::InProcess
    }

    async fn call(&self, input: Vec<u8>, ctx: &CallContext) -> Result<RawOutput, RuntimeError> {
        let plugin = Arc::clone(&self.plugin);
        let mut task = AbortOnDrop(tokio::spawn(async move { plugin.transform(&input).await }));

        let joined = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            joined = &mut task.0 => Some(joined),
        };

        let Some(joined) = joined else {
            task.0.abort();
            if tokio::time::timeout(ctx.grace, &mut task.0).await.is_err() {
                tracing::warn!("interpose.local.abort_timeout");
            }
            return Err(RuntimeError::Cancelled);
        };

        match joined {
            Ok(Ok(stdout)) if stdout.len() > ctx.limits.max_output_bytes => {
                Err(RuntimeError::OutputTooLarge {
                    limit: ctx.limits.max_output_bytes,
                })
            }
            Ok(Ok(stdout)) => Ok(RawOutput::success(stdout)),
            Ok(Err(e)) => Ok(RawOutput::abnormal(e.to_string())),
            Err(e) if e.is_panic() => Ok(RawOutput::abnormal(panic_message(e.into_panic()))),
            Err(e) => Err(RuntimeError::Other(Box::new(e))),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("plugin panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("plugin panicked: {s}")
    } else {
        "plugin panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interpose_types::{Completion, ResourceLimits};

    fn ctx() -> CallContext {
        CallContext::new(ResourceLimits::default())
    }

    #[tokio::test]
    async fn plugin_fn_output_is_returned() {
        let rt = LocalRuntime::new(plugin_fn(|input| Ok(input.to_vec())));
        let out = rt.call(b"abc".to_vec(), &ctx()).await.unwrap();
        assert_eq!(out, RawOutput::success(b"abc".to_vec()));
    }

    #[tokio::test]
    async fn plugin_error_is_abnormal() {
        let rt = LocalRuntime::new(plugin_fn(|_| Err(PluginError::Failed("nope".into()))));
        let out = rt.call(Vec::new(), &ctx()).await.unwrap();
        assert_eq!(
            out.completion,
            Completion::Abnormal {
                diagnostic: "nope".into()
            }
        );
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let rt = LocalRuntime::new(plugin_fn(|_| panic!("kaboom")));
        let out = rt.call(Vec::new(), &ctx()).await.unwrap();
        assert_eq!(
            out.completion,
            Completion::Abnormal {
                diagnostic: "plugin panicked: kaboom".into()
            }
        );
    }

    #[tokio::test]
    async fn oversize_output_is_rejected() {
        let rt = LocalRuntime::new(plugin_fn(|_| Ok(vec![b'x'; 10])));
        let ctx = CallContext::new(ResourceLimits::default().with_max_output_bytes(9));
        let err = rt.call(Vec::new(), &ctx).await.unwrap_err();
        assert!(matches!(err, RuntimeError::OutputTooLarge { limit: 9 }));
    }

    #[test]
    fn local_runtime_implements_module_runtime() {
        fn _assert_runtime<T: ModuleRuntime>() {}
        _assert_runtime::<LocalRuntime>();
    }
}
