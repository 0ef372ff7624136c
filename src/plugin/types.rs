//! Host-side plugin descriptors.

use serde::{Deserialize, Serialize};

use crate::contract::{PluginState, PluginType};

/// A discovered plugin endpoint.
///
/// Created by the scanner on every refresh; only `enabled` survives from
/// one refresh to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    /// Endpoint authority, unique across all plugins.
    pub authority: String,
    /// Display label.
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Package that ships the endpoint.
    pub package_name: String,
    /// Provider class name inside the package.
    pub class_name: String,
    pub plugin_type: PluginType,
    /// Entry point for the plugin's settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_activity: Option<String>,
    /// Whether the user enabled this plugin.
    #[serde(default)]
    pub enabled: bool,
}

/// A plugin with its freshly queried state. `state` is `None` when the
/// plugin did not answer or answered something malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginWithState {
    pub plugin: Plugin,
    pub state: Option<PluginState>,
}

/// All plugins shipped by one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginPackage {
    pub package_name: String,
    pub label: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub plugins: Vec<Plugin>,
}

impl PluginPackage {
    /// Whether any plugin of the package is enabled.
    pub fn is_enabled(&self) -> bool {
        self.plugins.iter().any(|p| p.enabled)
    }
}
