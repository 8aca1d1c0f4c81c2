//! Named in-process plugins that configuration can refer to.

use interpose_runtime_local::Plugin;
use std::collections::HashMap;
use std::sync::Arc;

/// Plugins the host compiled in, by the name configuration uses for them.
#[derive(Default, Clone)]
pub struct PluginCatalog {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a plugin.
    pub fn register(&mut self, name: impl Into<String>, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(name.into(), plugin);
    }

    /// Builder form of [`PluginCatalog::register`].
    pub fn with(mut self, name: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
        self.register(name, plugin);
        self
    }

    /// Look a plugin up.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// True when a plugin with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }
}
