//! YAML configuration: modules, their runtimes and limits, and the
//! per-route chains that use them.
//!
//! ```yaml
//! grace_period_ms: 100
//! modules:
//!   - name: enrich
//!     runtime: { type: process, program: /usr/local/bin/enrich }
//!     limits: { timeout_ms: 500, max_output_bytes: 65536 }
//!     side_effect_free: true
//!   - name: categorize
//!     runtime: { type: local, plugin: categorize }
//! routes:
//!   - name: orders
//!     request:  { modules: [enrich, categorize], policy: fail_closed, retry_timeouts: true }
//!     response: { modules: [] }
//! ```

use interpose_types::{
    ChainPolicy, ConfigError, FailurePolicy, Leg, ModuleSpec, ResourceLimits, RetryPolicy,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterposeConfig {
    /// Time a cancelled invocation gets to be killed and reaped.
    #[serde(default)]
    pub grace_period_ms: Option<u64>,
    /// Every module chains may reference.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    /// Routes and their per-leg chains.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// One module.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    /// Name chains use to refer to it.
    pub name: String,
    /// How it is executed.
    pub runtime: RuntimeConfig,
    /// Per-invocation budgets; unset fields take the defaults.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Declared free of side effects, allowing a single timeout retry.
    #[serde(default)]
    pub side_effect_free: bool,
}

/// How a module is executed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeConfig {
    /// A child process per invocation.
    Process {
        /// Executable.
        program: PathBuf,
        /// Arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Environment; nothing else is inherited.
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Working directory.
        #[serde(default)]
        working_dir: Option<PathBuf>,
    },
    /// A WASI module run by an engine binary.
    Wasi {
        /// The `.wasm` file.
        module: PathBuf,
        /// Engine executable, `wasmtime` when unset.
        #[serde(default)]
        engine: Option<PathBuf>,
        /// Arguments placed before the module path, `[run]` when unset.
        #[serde(default)]
        engine_args: Option<Vec<String>>,
        /// Environment for the engine process.
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// A plugin the host registered in its [`PluginCatalog`](crate::PluginCatalog).
    Local {
        /// Catalog name.
        plugin: String,
    },
}

/// Resource limits as written in configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Per-invocation timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Output cap in bytes.
    #[serde(default)]
    pub max_output_bytes: Option<usize>,
    /// Address-space cap in bytes.
    #[serde(default)]
    pub memory_bytes: Option<u64>,
}

impl LimitsConfig {
    /// Resolve against the defaults.
    pub fn to_limits(&self) -> ResourceLimits {
        let defaults = ResourceLimits::default();
        ResourceLimits {
            timeout: self
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            max_output_bytes: self.max_output_bytes.unwrap_or(defaults.max_output_bytes),
            memory_bytes: self.memory_bytes,
        }
    }
}

impl ModuleConfig {
    /// The module's spec.
    pub fn spec(&self) -> ModuleSpec {
        ModuleSpec {
            limits: self.limits.to_limits(),
            side_effect_free: self.side_effect_free,
        }
    }
}

/// One route.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Route name.
    pub name: String,
    /// Chain run before the message is forwarded.
    #[serde(default, alias = "outbound")]
    pub request: Option<LegConfig>,
    /// Chain run before the response is returned.
    #[serde(default, alias = "inbound")]
    pub response: Option<LegConfig>,
}

impl RouteConfig {
    /// The configured legs, request first.
    pub fn legs(&self) -> impl Iterator<Item = (Leg, &LegConfig)> {
        [(Leg::Request, &self.request), (Leg::Response, &self.response)]
            .into_iter()
            .filter_map(|(leg, cfg)| cfg.as_ref().map(|c| (leg, c)))
    }
}

/// One leg's chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegConfig {
    /// Module names, in execution order.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Failure policy; the leg's default when unset.
    #[serde(default)]
    pub policy: Option<FailurePolicy>,
    /// Retry a timed-out side-effect-free module once.
    #[serde(default)]
    pub retry_timeouts: bool,
}

impl LegConfig {
    /// The chain policy for this leg.
    pub fn policy(&self, leg: Leg) -> ChainPolicy {
        ChainPolicy {
            on_failure: self.policy.unwrap_or(leg.default_failure_policy()),
            retry: RetryPolicy {
                retry_timeouts: self.retry_timeouts,
            },
        }
    }
}

impl InterposeConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Grace period, or the default.
    pub fn grace_period(&self) -> Duration {
        self.grace_period_ms
            .map(Duration::from_millis)
            .unwrap_or(interpose_types::DEFAULT_GRACE_PERIOD)
    }

    /// Check everything, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = Vec::new();

        let mut names = HashSet::new();
        for (i, m) in self.modules.iter().enumerate() {
            if m.name.trim().is_empty() {
                errs.push(format!("modules[{i}].name is required"));
            } else if !names.insert(m.name.as_str()) {
                errs.push(format!("modules[{i}].name {:?} is already defined", m.name));
            }

            match &m.runtime {
                RuntimeConfig::Process { program, .. } if program.as_os_str().is_empty() => {
                    errs.push(format!("modules[{i}].runtime.program is required"));
                }
                RuntimeConfig::Wasi { module, .. } if module.as_os_str().is_empty() => {
                    errs.push(format!("modules[{i}].runtime.module is required"));
                }
                RuntimeConfig::Wasi {
                    engine: Some(engine),
                    ..
                } if engine.as_os_str().is_empty() => {
                    errs.push(format!("modules[{i}].runtime.engine must not be empty"));
                }
                RuntimeConfig::Local { plugin } if plugin.trim().is_empty() => {
                    errs.push(format!("modules[{i}].runtime.plugin is required"));
                }
                _ => {}
            }

            if m.limits.timeout_ms == Some(0) {
                errs.push(format!("modules[{i}].limits.timeout_ms must be > 0"));
            }
            if m.limits.max_output_bytes == Some(0) {
                errs.push(format!("modules[{i}].limits.max_output_bytes must be > 0"));
            }
            if m.limits.memory_bytes == Some(0) {
                errs.push(format!("modules[{i}].limits.memory_bytes must be > 0"));
            }
        }

        if self.grace_period_ms == Some(0) {
            errs.push("grace_period_ms must be > 0".to_string());
        }

        let mut routes = HashSet::new();
        for (i, r) in self.routes.iter().enumerate() {
            if r.name.trim().is_empty() {
                errs.push(format!("routes[{i}].name is required"));
            } else if !routes.insert(r.name.as_str()) {
                errs.push(format!("routes[{i}].name {:?} is already defined", r.name));
            }
            if r.request.is_none() && r.response.is_none() {
                errs.push(format!("routes[{i}] must define request or response"));
            }
            for (leg, cfg) in r.legs() {
                for (j, module) in cfg.modules.iter().enumerate() {
                    if module.trim().is_empty() {
                        errs.push(format!("routes[{i}].{leg}.modules[{j}] is empty"));
                    } else if !names.contains(module.as_str()) {
                        errs.push(format!(
                            "routes[{i}].{leg}.modules[{j}] references unknown module {module:?}"
                        ));
                    }
                }
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errs))
        }
    }
}
