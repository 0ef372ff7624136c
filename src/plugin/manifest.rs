//! Package manifest parsing and validation.
//!
//! Every installed package lives in its own directory below the plugins
//! directory and describes itself in a `plugin.toml`:
//!
//! ```toml
//! [package]
//! name = "com.example"
//! label = "Example"
//!
//! [[providers]]
//! class = "CalendarProvider"
//! authority = "com.example.cal"
//! actions = ["launcher.plugin.action.PLUGIN"]
//!
//! [providers.exec]
//! command = "bin/example-plugin"
//! args = ["--calendar"]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{PluginError, PluginResult};

/// Manifest file name inside a package directory.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// A package manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Package metadata.
    pub package: PackageMetadata,
    /// Endpoints shipped by the package.
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

/// `[package]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Package name, also the identity used for grants.
    pub name: String,
    /// Display label.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// `[[providers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Provider class name.
    pub class: String,
    /// Endpoint authority. Entries without one are never discovered.
    #[serde(default)]
    pub authority: Option<String>,
    /// Display label; defaults to the package label.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub settings_activity: Option<String>,
    /// Declared actions, such as the plugin discovery marker.
    #[serde(default)]
    pub actions: Vec<String>,
    /// How to start the endpoint process.
    #[serde(default)]
    pub exec: Option<ExecSpec>,
}

/// Executable serving an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSpec {
    /// Program; relative paths resolve against the package directory.
    pub command: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment; values may reference `$VARS`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl ExecSpec {
    /// Resolve `command` and `working_dir` against the package directory.
    ///
    /// `~` and `$VAR` are expanded first. A relative command that exists in
    /// the package directory is made absolute; anything else is left for
    /// `PATH` lookup.
    pub fn resolve(mut self, package_dir: &Path) -> Self {
        let command = expand(&self.command);
        self.command = if command.is_relative() && package_dir.join(&command).exists() {
            package_dir.join(command)
        } else {
            command
        };

        self.working_dir = Some(match self.working_dir.take() {
            Some(dir) => package_dir.join(expand(&dir)),
            None => package_dir.to_path_buf(),
        });
        self
    }
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

impl PackageManifest {
    /// Parse a manifest from TOML string.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Parse and validate the manifest at `path`.
    pub fn from_file(path: &Path) -> PluginResult<Self> {
        let invalid = |message: String| PluginError::InvalidManifest { path: path.to_path_buf(), message };

        let content = std::fs::read_to_string(path)?;
        let manifest = Self::from_toml(&content).map_err(|e| invalid(e.to_string()))?;
        manifest.validate().map_err(invalid)?;
        Ok(manifest)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Validate the manifest.
    pub fn validate(&self) -> Result<(), String> {
        let name = &self.package.name;
        if name.is_empty() {
            return Err("Package name is required".to_string());
        }

        if !name.chars().all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_')) {
            return Err(
                "Package name must contain only alphanumeric characters, dots, hyphens, and underscores"
                    .to_string(),
            );
        }

        let mut authorities = HashSet::new();
        for provider in &self.providers {
            if provider.class.is_empty() {
                return Err("Provider class is required".to_string());
            }

            if let Some(ref authority) = provider.authority {
                if !authorities.insert(authority.as_str()) {
                    return Err(format!("Duplicate provider authority '{}'", authority));
                }
            }

            if let Some(ref exec) = provider.exec {
                if exec.command.as_os_str().is_empty() {
                    return Err(format!("Provider '{}' has an empty exec command", provider.class));
                }
            }
        }

        Ok(())
    }

    /// Display label of the package.
    pub fn label(&self) -> &str {
        self.package.label.as_deref().unwrap_or(&self.package.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_MANIFEST: &str = r#"
[package]
name = "com.example"
label = "Example"
author = "community"

[[providers]]
class = "CalendarProvider"
authority = "com.example.cal"
label = "Example Calendar"
settings_activity = "settings"
actions = ["launcher.plugin.action.PLUGIN"]

[providers.exec]
command = "bin/example-plugin"
args = ["--calendar"]
env = { EXAMPLE_MODE = "calendar" }

[[providers]]
class = "SyncProvider"
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = PackageManifest::from_toml(SAMPLE_MANIFEST).unwrap();

        assert_eq!(manifest.package.name, "com.example");
        assert_eq!(manifest.label(), "Example");
        assert_eq!(manifest.providers.len(), 2);

        let calendar = &manifest.providers[0];
        assert_eq!(calendar.authority.as_deref(), Some("com.example.cal"));
        assert_eq!(calendar.actions, vec![crate::contract::DISCOVERY_ACTION.to_string()]);

        let exec = calendar.exec.as_ref().unwrap();
        assert_eq!(exec.args, vec!["--calendar".to_string()]);
        assert_eq!(exec.env["EXAMPLE_MODE"], "calendar");

        assert!(manifest.providers[1].authority.is_none());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_invalid_name() {
        let toml = r#"
[package]
name = "bad name"
"#;
        let manifest = PackageManifest::from_toml(toml).unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_duplicate_authority() {
        let toml = r#"
[package]
name = "com.example"

[[providers]]
class = "A"
authority = "com.example.x"

[[providers]]
class = "B"
authority = "com.example.x"
"#;
        let manifest = PackageManifest::from_toml(toml).unwrap();
        assert!(manifest.validate().unwrap_err().contains("Duplicate"));
    }

    #[test]
    fn test_from_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(MANIFEST_FILE);
        std::fs::write(&path, "[package]\nname = \"\"\n").unwrap();

        let err = PackageManifest::from_file(&path).unwrap_err();
        assert!(matches!(err, PluginError::InvalidManifest { .. }));
        assert!(err.to_string().contains("plugin.toml"));
    }

    #[test]
    fn test_resolve_exec() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("bin")).unwrap();
        std::fs::write(temp.path().join("bin/example-plugin"), "").unwrap();

        let local = ExecSpec {
            command: PathBuf::from("bin/example-plugin"),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
        .resolve(temp.path());
        assert_eq!(local.command, temp.path().join("bin/example-plugin"));
        assert_eq!(local.working_dir.as_deref(), Some(temp.path()));

        let on_path = ExecSpec { command: PathBuf::from("sh"), ..local.clone() }.resolve(temp.path());
        assert_eq!(on_path.command, PathBuf::from("sh"));
    }

    #[test]
    fn test_serialize_manifest() {
        let manifest = PackageManifest::from_toml(SAMPLE_MANIFEST).unwrap();
        let serialized = manifest.to_toml().unwrap();
        assert!(serialized.contains("com.example.cal"));
    }
}
