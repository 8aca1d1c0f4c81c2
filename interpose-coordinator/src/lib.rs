#![deny(missing_docs)]
//! Direction coordinator and host interface for interpose.
//!
//! The [`Coordinator`] owns the module registry and the chains bound to
//! each (route, leg). A dispatch looks the chain up, stamps the envelope's
//! direction with the leg, and hands both to the chain executor. Chains for
//! the two legs of a route are independent of each other.
//!
//! Registries sit behind `tokio::sync::RwLock`. A dispatch holds the read
//! lock only long enough to clone the `Arc<Chain>`, so registration never
//! waits on a running chain and running chains never see a half-updated
//! registry.

mod catalog;
pub mod config;

pub use catalog::PluginCatalog;
pub use config::InterposeConfig;

use config::RuntimeConfig;
use interpose_chain::{Chain, ChainExecutor, ChainStep};
use interpose_invoker::Invoker;
use interpose_runtime_local::LocalRuntime;
use interpose_runtime_process::{DEFAULT_ENGINE, ProcessRuntime, WasiRuntime};
use interpose_types::{
    CancellationToken, ChainPolicy, Envelope, ExecutionOutcome, ExecutionStatus, Leg, ModuleRef,
    ModuleRuntime, ModuleSpec, NoopSink, ObservabilitySink, RegistryError, RouteId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct RegisteredModule {
    runtime: Arc<dyn ModuleRuntime>,
    spec: ModuleSpec,
}

/// Selects the chain for a (route, leg) and runs it.
pub struct Coordinator {
    modules: RwLock<HashMap<ModuleRef, RegisteredModule>>,
    chains: RwLock<HashMap<(RouteId, Leg), Arc<Chain>>>,
    executor: ChainExecutor,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(Arc::new(NoopSink))
    }
}

impl Coordinator {
    /// A coordinator reporting to `sink`, with the default grace period.
    pub fn new(sink: Arc<dyn ObservabilitySink>) -> Self {
        Self::with_invoker(Invoker::default(), sink)
    }

    /// A coordinator with an explicit invoker.
    pub fn with_invoker(invoker: Invoker, sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
            chains: RwLock::new(HashMap::new()),
            executor: ChainExecutor::new(invoker, sink),
        }
    }

    /// Build a coordinator from configuration.
    ///
    /// `local` runtimes are looked up in `catalog`. Every module is
    /// registered before any chain, so chains may list modules in any
    /// order relative to the module list.
    pub async fn from_config(
        config: &InterposeConfig,
        catalog: &PluginCatalog,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Result<Self, RegistryError> {
        config.validate()?;
        let coordinator = Self::with_invoker(Invoker::new(config.grace_period()), sink);

        for module in &config.modules {
            let runtime = build_runtime(&module.runtime, catalog)?;
            coordinator
                .register_module(ModuleRef::new(module.name.as_str()), runtime, module.spec())
                .await?;
        }

        for route in &config.routes {
            for (leg, cfg) in route.legs() {
                let refs = cfg.modules.iter().map(|m| ModuleRef::new(m.as_str())).collect();
                coordinator
                    .register_chain(RouteId::new(route.name.as_str()), leg, refs, cfg.policy(leg))
                    .await?;
            }
        }

        tracing::info!(
            modules = config.modules.len(),
            routes = config.routes.len(),
            "interpose.coordinator.configured"
        );
        Ok(coordinator)
    }

    /// Register a module under `module`. Names are unique.
    pub async fn register_module(
        &self,
        module: ModuleRef,
        runtime: Arc<dyn ModuleRuntime>,
        spec: ModuleSpec,
    ) -> Result<(), RegistryError> {
        let mut modules = self.modules.write().await;
        if modules.contains_key(&module) {
            return Err(RegistryError::DuplicateModule(module));
        }
        tracing::debug!(module = %module, runtime = %runtime.kind(), "interpose.module.registered");
        modules.insert(module, RegisteredModule { runtime, spec });
        Ok(())
    }

    /// Bind an ordered list of modules to (`route`, `leg`).
    ///
    /// References are resolved now, once; later dispatches reuse the
    /// resolved chain. Registering again for the same (route, leg)
    /// replaces the chain for dispatches that start afterwards.
    pub async fn register_chain(
        &self,
        route: RouteId,
        leg: Leg,
        modules: Vec<ModuleRef>,
        policy: ChainPolicy,
    ) -> Result<Arc<Chain>, RegistryError> {
        let steps = {
            let registry = self.modules.read().await;
            modules
                .into_iter()
                .map(|module| {
                    if module.is_empty() {
                        return Err(RegistryError::EmptyChainRef(route.clone()));
                    }
                    let registered = registry
                        .get(&module)
                        .ok_or_else(|| RegistryError::UnknownModule(module.clone()))?;
                    Ok(ChainStep {
                        module,
                        runtime: Arc::clone(&registered.runtime),
                        spec: registered.spec,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let chain = Arc::new(Chain::new(route.clone(), leg, steps, policy));
        tracing::debug!(
            route = %route,
            leg = %leg,
            modules = chain.len(),
            policy = %policy.on_failure,
            "interpose.chain.registered"
        );
        self.chains
            .write()
            .await
            .insert((route, leg), Arc::clone(&chain));
        Ok(chain)
    }

    /// The chain bound to (`route`, `leg`), if any.
    pub async fn chain(&self, route: &RouteId, leg: Leg) -> Option<Arc<Chain>> {
        self.chains.read().await.get(&(route.clone(), leg)).cloned()
    }

    /// Run the chain for (`route`, `leg`) against `envelope`, bounded by
    /// `deadline`.
    pub async fn run_chain(
        &self,
        route: &RouteId,
        leg: Leg,
        envelope: Envelope,
        deadline: Instant,
    ) -> ExecutionOutcome {
        self.run_chain_with_cancel(route, leg, envelope, deadline, &CancellationToken::new())
            .await
    }

    /// [`Coordinator::run_chain`], abandoned early when `cancel` fires.
    pub async fn run_chain_with_cancel(
        &self,
        route: &RouteId,
        leg: Leg,
        mut envelope: Envelope,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        envelope.direction = leg;

        let Some(chain) = self.chain(route, leg).await else {
            tracing::trace!(route = %route, leg = %leg, "interpose.chain.none");
            return ExecutionOutcome {
                status: ExecutionStatus::Done {
                    envelope,
                    failed_open_at: None,
                },
                log: Vec::new(),
                policy: ChainPolicy::default_for(leg),
            };
        };

        self.executor.execute(&chain, envelope, deadline, cancel).await
    }

    /// Close every runtime and flush the sink.
    ///
    /// All runtimes are closed even if some fail; the first error is
    /// returned.
    pub async fn close(&self) -> Result<(), RegistryError> {
        let modules: Vec<_> = self
            .modules
            .read()
            .await
            .iter()
            .map(|(name, m)| (name.clone(), Arc::clone(&m.runtime)))
            .collect();

        let mut first_err = None;
        for (name, runtime) in modules {
            if let Err(e) = runtime.close().await {
                tracing::warn!(module = %name, error = %e, "interpose.module.close_failed");
                first_err.get_or_insert(e);
            }
        }
        self.executor.sink().flush();

        match first_err {
            Some(e) => Err(RegistryError::Runtime(e)),
            None => Ok(()),
        }
    }
}

/// Build the runtime a module config describes.
fn build_runtime(
    config: &RuntimeConfig,
    catalog: &PluginCatalog,
) -> Result<Arc<dyn ModuleRuntime>, RegistryError> {
    let runtime: Arc<dyn ModuleRuntime> = match config {
        RuntimeConfig::Process {
            program,
            args,
            env,
            working_dir,
        } => {
            let mut rt = ProcessRuntime::new(program).args(args.iter().cloned());
            for (k, v) in env {
                rt = rt.env(k.as_str(), v.as_str());
            }
            if let Some(dir) = working_dir {
                rt = rt.working_dir(dir);
            }
            Arc::new(rt)
        }
        RuntimeConfig::Wasi {
            module,
            engine,
            engine_args,
            env,
        } => {
            let mut rt = match (engine, engine_args) {
                (None, None) => WasiRuntime::new(module),
                (engine, args) => WasiRuntime::with_engine(
                    module,
                    engine.clone().unwrap_or_else(|| DEFAULT_ENGINE.into()),
                    args.clone().unwrap_or_else(|| vec!["run".to_string()]),
                ),
            };
            for (k, v) in env {
                rt = rt.env(k.as_str(), v.as_str());
            }
            Arc::new(rt)
        }
        RuntimeConfig::Local { plugin } => {
            let plugin = catalog
                .get(plugin)
                .ok_or_else(|| RegistryError::UnknownPlugin(plugin.clone()))?;
            Arc::new(LocalRuntime::new(plugin))
        }
    };
    Ok(runtime)
}
