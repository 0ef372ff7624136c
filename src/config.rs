//! Configuration management for the plugin host.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::contract::AppIdentity;
use crate::plugin::{PluginError, PluginResult, QueryOptions};

/// Directory name below the platform config and data directories.
const APP_DIR: &str = "launcher-plugins";

/// Local config file name, looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = ".launcher-plugins.toml";

/// Host configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity and directories of the host
    pub host: HostConfig,

    /// Query defaults
    pub query: QueryConfig,

    /// Plugins directory watching
    pub watch: WatchConfig,
}

/// `[host]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Package name the host presents to plugins
    pub caller: String,

    /// Label shown in grant prompts
    pub caller_label: String,

    /// Where packages are installed
    pub plugins_dir: Option<PathBuf>,

    /// Where the descriptor registry is kept
    pub data_dir: Option<PathBuf>,
}

/// `[query]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Whether plugins may use the network
    pub allow_network: bool,

    /// Queries are cancelled after this many milliseconds; 0 disables it
    pub timeout_ms: u64,

    /// Preferred result language
    pub language: Option<String>,
}

/// `[watch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Rescan when the plugins directory changes
    pub enabled: bool,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.launcher-plugins.toml` in current directory
    /// 2. `~/.config/launcher-plugins/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> PluginResult<Self> {
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(global_config) = Self::global_path() {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> PluginResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PluginError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to the global config file.
    pub fn save(&self) -> PluginResult<PathBuf> {
        let path = Self::global_path()
            .ok_or_else(|| PluginError::Config("Could not determine config directory".to_string()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> PluginResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| PluginError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR))
    }

    fn global_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }

    /// Directory packages are installed in.
    pub fn plugins_dir(&self) -> PathBuf {
        self.host.plugins_dir.clone().unwrap_or_else(|| self.data_dir().join("plugins"))
    }

    /// Directory for host state.
    pub fn data_dir(&self) -> PathBuf {
        self.host
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_DIR)))
            .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
    }

    /// Path of the descriptor registry.
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir().join("registry.json")
    }

    /// Identity the host presents to plugins.
    pub fn caller(&self) -> AppIdentity {
        AppIdentity::new(self.host.caller.as_str(), self.host.caller_label.as_str())
    }

    /// Query options for plugin clients.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            allow_network: self.query.allow_network,
            lang: self.query.language.clone(),
            timeout: (self.query.timeout_ms > 0).then(|| Duration::from_millis(self.query.timeout_ms)),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            caller: "launcher".to_string(),
            caller_label: "Launcher".to_string(),
            plugins_dir: None,
            data_dir: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { allow_network: false, timeout_ms: 10_000, language: None }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host.caller, "launcher");
        assert!(!config.query.allow_network);
        assert!(config.watch.enabled);
        assert_eq!(config.query_options().timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[host]"));
        assert!(toml_str.contains("[query]"));
        assert!(toml_str.contains("[watch]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [host]
            caller = "org.example.launcher"
            plugins_dir = "/opt/plugins"

            [query]
            allow_network = true
            timeout_ms = 0
            language = "de"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.caller().package, "org.example.launcher");
        assert_eq!(config.caller().label, "Launcher");
        assert_eq!(config.plugins_dir(), PathBuf::from("/opt/plugins"));
        assert!(config.watch.enabled);

        let options = config.query_options();
        assert!(options.allow_network);
        assert_eq!(options.lang.as_deref(), Some("de"));
        assert_eq!(options.timeout, None);
    }

    #[test]
    fn test_directories_follow_data_dir() {
        let mut config = Config::default();
        config.host.data_dir = Some(PathBuf::from("/var/lib/launcher"));
        assert_eq!(config.plugins_dir(), PathBuf::from("/var/lib/launcher/plugins"));
        assert_eq!(config.registry_path(), PathBuf::from("/var/lib/launcher/registry.json"));
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.query.language = Some("fr".to_string());
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[query]\ntimeout_ms = \"soon\"").unwrap();

        assert!(matches!(Config::load_from_file(&path), Err(PluginError::Config(_))));
    }
}
