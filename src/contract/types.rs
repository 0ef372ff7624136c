//! Core plugin types shared across the process boundary.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Search domain served by a plugin.
///
/// The wire name (`as_str`) is what a plugin answers to `GetType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginType {
    /// Calendar events and tasks.
    Calendar,
    /// Points of interest.
    LocationSearch,
    /// Generic file search.
    FileSearch,
    /// Weather forecasts.
    Weather,
}

impl PluginType {
    /// All known plugin types.
    pub const ALL: [Self; 4] = [Self::Calendar, Self::LocationSearch, Self::FileSearch, Self::Weather];

    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calendar => "Calendar",
            Self::LocationSearch => "LocationSearch",
            Self::FileSearch => "FileSearch",
            Self::Weather => "Weather",
        }
    }

    /// Get the display name for this plugin type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Calendar => "Calendar",
            Self::LocationSearch => "Places",
            Self::FileSearch => "Files",
            Self::Weather => "Weather",
        }
    }

    /// Get the icon for this plugin type.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Calendar => "📅",
            Self::LocationSearch => "📍",
            Self::FileSearch => "📄",
            Self::Weather => "🌤",
        }
    }
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Error returned when a type string is not a known plugin type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown plugin type: {0}")]
pub struct UnknownPluginType(pub String);

impl FromStr for PluginType {
    type Err = UnknownPluginType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownPluginType(s.to_string()))
    }
}

/// How the host may keep results it received from a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageStrategy {
    /// The host stores a full copy of the result.
    #[default]
    StoreCopy,
    /// The host stores only the id and asks the plugin again later.
    StoreReference,
    /// The host keeps the copy but asks the plugin to refresh it before use.
    Deferred,
}

/// Answer to the `GetConfig` out-of-band call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Result storage strategy.
    #[serde(default)]
    pub storage_strategy: StorageStrategy,
}

/// Answer to the `GetType` out-of-band call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeResponse {
    /// The plugin's domain.
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
}

/// Package identity plus a display label, used for callers and plugins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Package name, the identity grants are keyed on.
    pub package: String,
    /// Human readable name.
    pub label: String,
}

impl AppIdentity {
    /// Create an identity.
    pub fn new(package: impl Into<String>, label: impl Into<String>) -> Self {
        Self { package: package.into(), label: label.into() }
    }
}

impl std::fmt::Display for AppIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.package)
    }
}
