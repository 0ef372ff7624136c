//! Installed package lookup.

use std::path::{Path, PathBuf};

use super::manifest::{ExecSpec, PackageManifest, MANIFEST_FILE};
use crate::contract::DISCOVERY_ACTION;

/// An installed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub label: String,
    pub description: Option<String>,
    pub author: Option<String>,
    /// Directory the package is installed in.
    pub dir: PathBuf,
}

/// An endpoint declared by an installed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub package_name: String,
    pub class_name: String,
    pub authority: Option<String>,
    /// Provider label, falling back to the package label.
    pub label: String,
    pub description: Option<String>,
    pub settings_activity: Option<String>,
    /// Resolved executable, if the endpoint can be started.
    pub exec: Option<ExecSpec>,
}

/// Read access to the set of installed packages.
pub trait PackageIndex: Send + Sync {
    /// Endpoints declaring `action`, in a stable order.
    fn query_providers(&self, action: &str) -> Vec<ProviderInfo>;

    /// Look up an installed package.
    fn package(&self, package_name: &str) -> Option<PackageInfo>;

    /// Look up a plugin endpoint by authority.
    fn provider(&self, authority: &str) -> Option<ProviderInfo> {
        self.query_providers(DISCOVERY_ACTION)
            .into_iter()
            .find(|p| p.authority.as_deref() == Some(authority))
    }
}

/// Package index over `<root>/<package>/plugin.toml` manifests.
///
/// Manifests are read on every lookup so the index always reflects the
/// directory as it is now. Packages are ordered by directory name.
pub struct ManifestIndex {
    root: PathBuf,
}

impl ManifestIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the package directories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load every valid manifest. Invalid ones are logged and skipped.
    pub fn load_packages(&self) -> Vec<(PathBuf, PackageManifest)> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.root.display(), error = %e, "Failed to read plugins directory");
                }
                return Vec::new();
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.join(MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();

        dirs.into_iter()
            .filter_map(|dir| match PackageManifest::from_file(&dir.join(MANIFEST_FILE)) {
                Ok(manifest) => Some((dir, manifest)),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping package");
                    None
                }
            })
            .collect()
    }
}

fn package_info(dir: &Path, manifest: &PackageManifest) -> PackageInfo {
    PackageInfo {
        name: manifest.package.name.clone(),
        label: manifest.label().to_string(),
        description: manifest.package.description.clone(),
        author: manifest.package.author.clone(),
        dir: dir.to_path_buf(),
    }
}

impl PackageIndex for ManifestIndex {
    fn query_providers(&self, action: &str) -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        for (dir, manifest) in self.load_packages() {
            for entry in &manifest.providers {
                if !entry.actions.iter().any(|a| a == action) {
                    continue;
                }
                providers.push(ProviderInfo {
                    package_name: manifest.package.name.clone(),
                    class_name: entry.class.clone(),
                    authority: entry.authority.clone(),
                    label: entry.label.clone().unwrap_or_else(|| manifest.label().to_string()),
                    description: entry.description.clone(),
                    settings_activity: entry.settings_activity.clone(),
                    exec: entry.exec.clone().map(|exec| exec.resolve(&dir)),
                });
            }
        }

        providers
    }

    fn package(&self, package_name: &str) -> Option<PackageInfo> {
        self.load_packages()
            .into_iter()
            .find(|(_, manifest)| manifest.package.name == package_name)
            .map(|(dir, manifest)| package_info(&dir, &manifest))
    }
}
