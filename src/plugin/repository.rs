//! Persisted plugin descriptors.

use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::types::Plugin;
use super::{PluginError, PluginResult};
use crate::contract::PluginType;

/// Selects stored plugins. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginFilter {
    pub plugin_type: Option<PluginType>,
    pub enabled: Option<bool>,
    pub package_name: Option<String>,
}

impl PluginFilter {
    /// Match every plugin.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, plugin_type: PluginType) -> Self {
        self.plugin_type = Some(plugin_type);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn package(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = Some(package_name.into());
        self
    }

    pub fn matches(&self, plugin: &Plugin) -> bool {
        self.plugin_type.map_or(true, |t| plugin.plugin_type == t)
            && self.enabled.map_or(true, |e| plugin.enabled == e)
            && self.package_name.as_ref().map_or(true, |p| &plugin.package_name == p)
    }
}

/// Keyed table of plugin descriptors with change notification.
pub trait PluginRepository: Send + Sync {
    /// Stored plugins matching `filter`, in stored order.
    fn find_many(&self, filter: &PluginFilter) -> PluginResult<Vec<Plugin>>;

    fn get(&self, authority: &str) -> PluginResult<Option<Plugin>>;

    /// Change only the `enabled` flag of a stored plugin. Returns whether
    /// the plugin exists.
    fn set_enabled(&self, authority: &str, enabled: bool) -> PluginResult<bool>;

    /// Change the `enabled` flag of every plugin matching `filter` in one
    /// write. Returns how many plugins matched.
    fn set_enabled_where(&self, filter: &PluginFilter, enabled: bool) -> PluginResult<usize>;

    /// Replace the whole table in one step.
    fn replace_all(&self, plugins: Vec<Plugin>) -> PluginResult<()>;

    /// Receiver that changes on every write.
    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// Table state shared by both repositories.
struct Table {
    plugins: RwLock<Vec<Plugin>>,
    version: watch::Sender<u64>,
}

impl Table {
    fn new(plugins: Vec<Plugin>) -> Self {
        Self { plugins: RwLock::new(plugins), version: watch::Sender::new(0) }
    }

    fn find_many(&self, filter: &PluginFilter) -> Vec<Plugin> {
        self.plugins.read().iter().filter(|p| filter.matches(p)).cloned().collect()
    }

    fn get(&self, authority: &str) -> Option<Plugin> {
        self.plugins.read().iter().find(|p| p.authority == authority).cloned()
    }

    fn snapshot(&self) -> Vec<Plugin> {
        self.plugins.read().clone()
    }

    fn commit(&self, plugins: Vec<Plugin>) {
        *self.plugins.write() = plugins;
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

/// The table with the flag changed, or `Err(exists)` when there is
/// nothing to write.
fn with_enabled(mut plugins: Vec<Plugin>, authority: &str, enabled: bool) -> Result<Vec<Plugin>, bool> {
    match plugins.iter_mut().find(|p| p.authority == authority) {
        Some(plugin) if plugin.enabled == enabled => Err(true),
        Some(plugin) => {
            plugin.enabled = enabled;
            Ok(plugins)
        }
        None => Err(false),
    }
}

/// The table with the flag changed on every match, if anything changed,
/// and the number of matches.
fn with_enabled_where(
    mut plugins: Vec<Plugin>,
    filter: &PluginFilter,
    enabled: bool,
) -> (Option<Vec<Plugin>>, usize) {
    let mut matched = 0;
    let mut changed = false;
    for plugin in plugins.iter_mut().filter(|p| filter.matches(p)) {
        matched += 1;
        changed |= plugin.enabled != enabled;
        plugin.enabled = enabled;
    }
    (changed.then_some(plugins), matched)
}

/// Repository living only in memory.
pub struct MemoryPluginRepository {
    table: Table,
    write_lock: Mutex<()>,
}

impl MemoryPluginRepository {
    pub fn new() -> Self {
        Self { table: Table::new(Vec::new()), write_lock: Mutex::new(()) }
    }
}

impl Default for MemoryPluginRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRepository for MemoryPluginRepository {
    fn find_many(&self, filter: &PluginFilter) -> PluginResult<Vec<Plugin>> {
        Ok(self.table.find_many(filter))
    }

    fn get(&self, authority: &str) -> PluginResult<Option<Plugin>> {
        Ok(self.table.get(authority))
    }

    fn set_enabled(&self, authority: &str, enabled: bool) -> PluginResult<bool> {
        let _guard = self.write_lock.lock();
        match with_enabled(self.table.snapshot(), authority, enabled) {
            Ok(next) => {
                self.table.commit(next);
                Ok(true)
            }
            Err(found) => Ok(found),
        }
    }

    fn set_enabled_where(&self, filter: &PluginFilter, enabled: bool) -> PluginResult<usize> {
        let _guard = self.write_lock.lock();
        let (next, matched) = with_enabled_where(self.table.snapshot(), filter, enabled);
        if let Some(next) = next {
            self.table.commit(next);
        }
        Ok(matched)
    }

    fn replace_all(&self, plugins: Vec<Plugin>) -> PluginResult<()> {
        let _guard = self.write_lock.lock();
        self.table.commit(plugins);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.table.version.subscribe()
    }
}

/// Registry file format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PluginRegistry {
    plugins: Vec<Plugin>,
}

/// Repository persisted as a JSON registry file.
///
/// Every write goes to disk before it becomes visible.
pub struct JsonPluginRepository {
    path: PathBuf,
    table: Table,
    write_lock: Mutex<()>,
}

impl JsonPluginRepository {
    /// Open the registry at `path`. A missing file is an empty registry.
    pub fn open(path: impl Into<PathBuf>) -> PluginResult<Self> {
        let path = path.into();
        let registry = Self::load_registry(&path)?;
        Ok(Self { path, table: Table::new(registry.plugins), write_lock: Mutex::new(()) })
    }

    /// Get the path to the registry file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_registry(path: &Path) -> PluginResult<PluginRegistry> {
        if !path.exists() {
            return Ok(PluginRegistry::default());
        }

        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| PluginError::Registry(format!("{}: {}", path.display(), e)))
    }

    fn save_registry(&self, plugins: &[Plugin]) -> PluginResult<()> {
        let registry = PluginRegistry { plugins: plugins.to_vec() };

        let content = serde_json::to_string_pretty(&registry)
            .map_err(|e| PluginError::Registry(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}

impl PluginRepository for JsonPluginRepository {
    fn find_many(&self, filter: &PluginFilter) -> PluginResult<Vec<Plugin>> {
        Ok(self.table.find_many(filter))
    }

    fn get(&self, authority: &str) -> PluginResult<Option<Plugin>> {
        Ok(self.table.get(authority))
    }

    fn set_enabled(&self, authority: &str, enabled: bool) -> PluginResult<bool> {
        let _guard = self.write_lock.lock();
        match with_enabled(self.table.snapshot(), authority, enabled) {
            Ok(next) => {
                self.save_registry(&next)?;
                self.table.commit(next);
                Ok(true)
            }
            Err(found) => Ok(found),
        }
    }

    fn set_enabled_where(&self, filter: &PluginFilter, enabled: bool) -> PluginResult<usize> {
        let _guard = self.write_lock.lock();
        let (next, matched) = with_enabled_where(self.table.snapshot(), filter, enabled);
        if let Some(next) = next {
            self.save_registry(&next)?;
            self.table.commit(next);
        }
        Ok(matched)
    }

    fn replace_all(&self, plugins: Vec<Plugin>) -> PluginResult<()> {
        let _guard = self.write_lock.lock();
        self.save_registry(&plugins)?;
        self.table.commit(plugins);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.table.version.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn plugin(authority: &str, plugin_type: PluginType, enabled: bool) -> Plugin {
        Plugin {
            authority: authority.to_string(),
            label: authority.to_string(),
            description: None,
            package_name: "com.example".to_string(),
            class_name: "Provider".to_string(),
            plugin_type,
            settings_activity: None,
            enabled,
        }
    }

    #[test]
    fn test_filter() {
        let cal = plugin("cal", PluginType::Calendar, true);
        let files = plugin("files", PluginType::FileSearch, false);

        assert!(PluginFilter::all().matches(&cal));
        assert!(PluginFilter::all().of_type(PluginType::Calendar).matches(&cal));
        assert!(!PluginFilter::all().of_type(PluginType::Calendar).matches(&files));
        assert!(!PluginFilter::all().enabled(true).matches(&files));
        assert!(PluginFilter::all().package("com.example").enabled(false).matches(&files));
        assert!(!PluginFilter::all().package("org.other").matches(&files));
    }

    #[test]
    fn test_memory_repository() {
        let repo = MemoryPluginRepository::new();
        let mut changes = repo.subscribe();

        repo.replace_all(vec![
            plugin("cal", PluginType::Calendar, false),
            plugin("files", PluginType::FileSearch, false),
        ])
        .unwrap();
        assert!(changes.has_changed().unwrap());
        changes.borrow_and_update();

        assert!(repo.set_enabled("cal", true).unwrap());
        assert!(changes.has_changed().unwrap());
        assert!(repo.get("cal").unwrap().unwrap().enabled);

        let enabled = repo.find_many(&PluginFilter::all().enabled(true)).unwrap();
        assert_eq!(enabled.len(), 1);

        assert!(!repo.set_enabled("missing", true).unwrap());
    }

    #[test]
    fn test_set_enabled_to_same_value_does_not_notify() {
        let repo = MemoryPluginRepository::new();
        repo.replace_all(vec![plugin("cal", PluginType::Calendar, true)]).unwrap();
        let mut changes = repo.subscribe();
        changes.borrow_and_update();

        assert!(repo.set_enabled("cal", true).unwrap());
        assert!(!changes.has_changed().unwrap());
    }

    #[test]
    fn test_set_enabled_where_writes_once() {
        let mut other = plugin("weather", PluginType::LocationSearch, false);
        other.package_name = "org.other".to_string();
        let repo = MemoryPluginRepository::new();
        repo.replace_all(vec![
            plugin("cal", PluginType::Calendar, false),
            plugin("files", PluginType::FileSearch, true),
            other,
        ])
        .unwrap();
        let mut changes = repo.subscribe();
        let before = *changes.borrow_and_update();

        let matched = repo.set_enabled_where(&PluginFilter::all().package("com.example"), true).unwrap();
        assert_eq!(matched, 2);
        assert_eq!(*changes.borrow_and_update(), before.wrapping_add(1));

        let enabled: Vec<_> = repo
            .find_many(&PluginFilter::all().enabled(true))
            .unwrap()
            .into_iter()
            .map(|p| p.authority)
            .collect();
        assert_eq!(enabled, vec!["cal".to_string(), "files".to_string()]);

        // nothing to change
        assert_eq!(repo.set_enabled_where(&PluginFilter::all().package("com.example"), true).unwrap(), 2);
        assert!(!changes.has_changed().unwrap());
        assert_eq!(repo.set_enabled_where(&PluginFilter::all().package("org.none"), true).unwrap(), 0);
    }

    #[test]
    fn test_json_repository_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("registry.json");

        let repo = JsonPluginRepository::open(&path).unwrap();
        repo.replace_all(vec![plugin("cal", PluginType::Calendar, false)]).unwrap();
        repo.set_enabled("cal", true).unwrap();

        let reopened = JsonPluginRepository::open(&path).unwrap();
        let stored = reopened.get("cal").unwrap().unwrap();
        assert!(stored.enabled);
        assert_eq!(stored.plugin_type, PluginType::Calendar);
    }

    #[test]
    fn test_json_repository_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(JsonPluginRepository::open(&path), Err(PluginError::Registry(_))));
    }
}
