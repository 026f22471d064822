//! CM handle ownership lookup.

use std::collections::HashMap;

use crate::types::PluginName;

/// Resolves which DMI plugin owns a CM handle.
pub trait PluginResolver: Send + Sync {
    /// Returns the owning plugin, or `None` for an unknown handle.
    fn resolve_plugin(&self, cm_handle_id: &str) -> Option<PluginName>;
}

/// Resolver backed by a fixed handle → plugin table.
#[derive(Debug, Clone, Default)]
pub struct StaticPluginResolver {
    owners: HashMap<String, PluginName>,
}

impl StaticPluginResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `plugin` as the owner of `cm_handle_id`.
    pub fn with_handle(mut self, cm_handle_id: impl Into<String>, plugin: impl Into<PluginName>) -> Self {
        self.owners.insert(cm_handle_id.into(), plugin.into());
        self
    }

    /// Returns the number of known handles.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns true if no handles are known.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for StaticPluginResolver
where
    K: Into<String>,
    V: Into<PluginName>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            owners: iter
                .into_iter()
                .map(|(handle, plugin)| (handle.into(), plugin.into()))
                .collect(),
        }
    }
}

impl PluginResolver for StaticPluginResolver {
    fn resolve_plugin(&self, cm_handle_id: &str) -> Option<PluginName> {
        self.owners.get(cm_handle_id).cloned()
    }
}
