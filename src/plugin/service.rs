//! Plugin lifecycle on the host.
//!
//! The service keeps the repository in sync with the installed packages,
//! owns the user's enabled flags and answers live state queries. Nothing a
//! plugin process does can make these methods fail: every cross-process
//! failure becomes "no information".

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

use super::index::PackageIndex;
use super::reporter::ErrorReporter;
use super::repository::{PluginFilter, PluginRepository};
use super::scanner::PluginScanner;
use super::types::{Plugin, PluginPackage, PluginWithState};
use crate::contract::{methods, PluginState};
use crate::ipc::PluginTransport;

/// A change to the set of installed packages. Every event triggers a
/// refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageEvent {
    Installed(String),
    Uninstalled(String),
    Updated(String),
    /// A package was enabled or disabled as a whole.
    EnabledChanged(String),
}

impl PackageEvent {
    /// Name of the affected package.
    pub fn package_name(&self) -> &str {
        match self {
            Self::Installed(p) | Self::Uninstalled(p) | Self::Updated(p) | Self::EnabledChanged(p) => p,
        }
    }
}

struct Inner {
    repository: Arc<dyn PluginRepository>,
    index: Arc<dyn PackageIndex>,
    transport: Arc<dyn PluginTransport>,
    reporter: Arc<dyn ErrorReporter>,
    scanner: PluginScanner,
    refresh_lock: tokio::sync::Mutex<()>,
}

/// Host-side plugin service.
pub struct PluginService {
    inner: Arc<Inner>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl PluginService {
    pub fn new(
        repository: Arc<dyn PluginRepository>,
        index: Arc<dyn PackageIndex>,
        transport: Arc<dyn PluginTransport>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let scanner = PluginScanner::new(Arc::clone(&index), Arc::clone(&transport), Arc::clone(&reporter));
        Self {
            inner: Arc::new(Inner {
                repository,
                index,
                transport,
                reporter,
                scanner,
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Refresh now and again on every package event, until the service is
    /// dropped or `events` closes. Must be called inside a tokio runtime.
    pub fn start(&self, mut events: mpsc::Receiver<PackageEvent>) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            inner.refresh().await;
            while let Some(event) = events.recv().await {
                tracing::debug!(package = %event.package_name(), ?event, "Package changed");
                inner.refresh().await;
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Rescan installed plugins, keeping the enabled flags of plugins that
    /// are still installed. Concurrent refreshes run one after another.
    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    /// Stored plugins matching `filter`.
    pub fn plugins(&self, filter: &PluginFilter) -> Vec<Plugin> {
        self.inner.plugins(filter)
    }

    /// A stored plugin.
    pub fn plugin(&self, authority: &str) -> Option<Plugin> {
        match self.inner.repository.get(authority) {
            Ok(plugin) => plugin,
            Err(e) => {
                self.inner.reporter.report("reading plugin", &e);
                None
            }
        }
    }

    pub fn enable_plugin(&self, plugin: &Plugin) -> bool {
        self.set_enabled(&plugin.authority, true)
    }

    pub fn disable_plugin(&self, plugin: &Plugin) -> bool {
        self.set_enabled(&plugin.authority, false)
    }

    /// Change the stored enabled flag without rescanning. Returns whether
    /// the plugin is stored.
    pub fn set_enabled(&self, authority: &str, enabled: bool) -> bool {
        match self.inner.repository.set_enabled(authority, enabled) {
            Ok(found) => found,
            Err(e) => {
                self.inner.reporter.report("updating plugin", &e);
                false
            }
        }
    }

    /// Enable every stored plugin of a package. Returns whether the package
    /// has any stored plugin.
    pub fn enable_package(&self, package_name: &str) -> bool {
        self.set_package_enabled(package_name, true)
    }

    /// Disable every stored plugin of a package.
    pub fn disable_package(&self, package_name: &str) -> bool {
        self.set_package_enabled(package_name, false)
    }

    fn set_package_enabled(&self, package_name: &str, enabled: bool) -> bool {
        let filter = PluginFilter::all().package(package_name);
        match self.inner.repository.set_enabled_where(&filter, enabled) {
            Ok(matched) => {
                tracing::debug!(package = package_name, enabled, matched, "Package enabled flag changed");
                matched > 0
            }
            Err(e) => {
                self.inner.reporter.report("updating package", &e);
                false
            }
        }
    }

    /// Live state of `plugin`, queried now. `None` if the plugin did not
    /// answer or answered something malformed.
    pub async fn plugin_state(&self, plugin: &Plugin) -> Option<PluginState> {
        self.inner.plugin_state(plugin).await
    }

    /// Stored plugins matching `filter`, each with its live state. Emits on
    /// subscription and after every repository change, querying every
    /// plugin's state again each time.
    pub fn plugins_with_state(
        &self,
        filter: PluginFilter,
    ) -> impl Stream<Item = Vec<PluginWithState>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        WatchStream::new(inner.repository.subscribe()).then(move |_| {
            let inner = Arc::clone(&inner);
            let filter = filter.clone();
            async move { inner.with_states(inner.plugins(&filter)).await }
        })
    }

    /// One stored plugin with its live state, re-queried on every
    /// repository change. `None` while the plugin is not stored.
    pub fn plugin_with_state(
        &self,
        authority: &str,
    ) -> impl Stream<Item = Option<PluginWithState>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        let authority = authority.to_string();
        WatchStream::new(inner.repository.subscribe()).then(move |_| {
            let inner = Arc::clone(&inner);
            let authority = authority.clone();
            async move {
                let plugin = match inner.repository.get(&authority) {
                    Ok(plugin) => plugin?,
                    Err(e) => {
                        inner.reporter.report("reading plugin", &e);
                        return None;
                    }
                };
                let state = inner.plugin_state(&plugin).await;
                Some(PluginWithState { plugin, state })
            }
        })
    }

    /// Launch the plugin's interactive grant flow for this host. Returns
    /// whether access was granted.
    pub async fn request_permission(&self, plugin: &Plugin) -> bool {
        match self.inner.transport.request_permission(&plugin.authority).await {
            Ok(granted) => granted,
            Err(e) => {
                tracing::warn!(authority = %plugin.authority, error = %e, "Permission request failed");
                false
            }
        }
    }

    /// Stored plugins grouped by package, in stored order.
    pub fn plugin_packages(&self) -> Vec<PluginPackage> {
        self.inner.packages(&PluginFilter::all())
    }

    /// One package with its stored plugins. `None` if no plugin of the
    /// package is stored.
    pub fn plugin_package(&self, package_name: &str) -> Option<PluginPackage> {
        self.inner.packages(&PluginFilter::all().package(package_name)).pop()
    }
}

impl Drop for PluginService {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Inner {
    async fn refresh(&self) {
        let _guard = self.refresh_lock.lock().await;

        let enabled: HashSet<String> = match self.repository.find_many(&PluginFilter::all().enabled(true)) {
            Ok(plugins) => plugins.into_iter().map(|p| p.authority).collect(),
            Err(e) => {
                self.reporter.report("reading enabled plugins", &e);
                return;
            }
        };

        let mut plugins = self.scanner.find_plugins().await;
        for plugin in &mut plugins {
            plugin.enabled = enabled.contains(&plugin.authority);
        }

        let count = plugins.len();
        match self.repository.replace_all(plugins) {
            Ok(()) => tracing::debug!(count, "Plugins refreshed"),
            Err(e) => self.reporter.report("storing plugins", &e),
        }
    }

    fn plugins(&self, filter: &PluginFilter) -> Vec<Plugin> {
        match self.repository.find_many(filter) {
            Ok(plugins) => plugins,
            Err(e) => {
                self.reporter.report("reading plugins", &e);
                Vec::new()
            }
        }
    }

    fn packages(&self, filter: &PluginFilter) -> Vec<PluginPackage> {
        let mut packages: Vec<PluginPackage> = Vec::new();

        for plugin in self.plugins(filter) {
            if let Some(package) = packages.iter_mut().find(|p| p.package_name == plugin.package_name) {
                package.plugins.push(plugin);
                continue;
            }

            let info = self.index.package(&plugin.package_name);
            packages.push(PluginPackage {
                package_name: plugin.package_name.clone(),
                label: info.as_ref().map_or_else(|| plugin.package_name.clone(), |i| i.label.clone()),
                description: info.as_ref().and_then(|i| i.description.clone()),
                author: info.and_then(|i| i.author),
                plugins: vec![plugin],
            });
        }

        packages
    }

    async fn plugin_state(&self, plugin: &Plugin) -> Option<PluginState> {
        match self.transport.call(&plugin.authority, methods::GET_STATE).await {
            Ok(Some(bundle)) => {
                let state = PluginState::from_bundle(&bundle);
                if state.is_none() {
                    tracing::debug!(authority = %plugin.authority, "Plugin returned a malformed state");
                }
                state
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(authority = %plugin.authority, error = %e, "Failed to query plugin state");
                None
            }
        }
    }

    async fn with_states(&self, plugins: Vec<Plugin>) -> Vec<PluginWithState> {
        join_all(plugins.into_iter().map(|plugin| async move {
            let state = self.plugin_state(&plugin).await;
            PluginWithState { plugin, state }
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::PluginType;
    use crate::plugin::repository::MemoryPluginRepository;
    use crate::plugin::scanner::tests::{Answer, FakeIndex, FakeTransport, RecordingReporter};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        index: Arc<FakeIndex>,
        repository: Arc<MemoryPluginRepository>,
        service: PluginService,
    }

    fn fixture(authorities: &[&str], transport: FakeTransport) -> Fixture {
        let index = Arc::new(FakeIndex::with(authorities));
        let repository = Arc::new(MemoryPluginRepository::new());
        let service = PluginService::new(
            repository.clone(),
            index.clone(),
            Arc::new(transport),
            Arc::new(RecordingReporter::default()),
        );
        Fixture { index, repository, service }
    }

    fn authorities(plugins: &[Plugin]) -> Vec<&str> {
        plugins.iter().map(|p| p.authority.as_str()).collect()
    }

    #[tokio::test]
    async fn test_enabled_survives_rescan() {
        let transport = FakeTransport::default()
            .typed("a", Answer::Type("Calendar"))
            .typed("b", Answer::Type("FileSearch"));
        let f = fixture(&["a", "b"], transport);

        f.service.refresh().await;
        let a = f.service.plugin("a").unwrap();
        assert!(!a.enabled);

        assert!(f.service.enable_plugin(&a));
        f.service.refresh().await;

        assert!(f.service.plugin("a").unwrap().enabled);
        assert!(!f.service.plugin("b").unwrap().enabled);

        f.service.disable_plugin(&a);
        f.service.refresh().await;
        assert!(!f.service.plugin("a").unwrap().enabled);
    }

    #[tokio::test]
    async fn test_vanished_plugins_are_removed() {
        let transport = FakeTransport::default()
            .typed("a", Answer::Type("Calendar"))
            .typed("b", Answer::Type("FileSearch"));
        let f = fixture(&["a", "b"], transport);

        f.service.refresh().await;
        f.service.set_enabled("b", true);

        f.index.set(&["a"]);
        f.service.refresh().await;

        let stored = f.repository.find_many(&PluginFilter::all()).unwrap();
        assert_eq!(authorities(&stored), vec!["a"]);

        // reinstalling does not bring the old flag back
        f.index.set(&["a", "b"]);
        f.service.refresh().await;
        assert!(!f.service.plugin("b").unwrap().enabled);
    }

    #[tokio::test]
    async fn test_calendar_plugin_scenario() {
        let transport = FakeTransport::default()
            .typed("com.example.cal", Answer::Type("Calendar"))
            .state("com.example.cal", Answer::State(json!({ "type": "Ready" })));
        let f = fixture(&["com.example.cal"], transport);

        f.service.refresh().await;
        let plugin = f.service.plugin("com.example.cal").unwrap();
        assert_eq!(plugin.plugin_type, PluginType::Calendar);
        assert!(!plugin.enabled);

        f.service.enable_plugin(&plugin);

        let filter = PluginFilter::all().of_type(PluginType::Calendar).enabled(true);
        let mut stream = Box::pin(f.service.plugins_with_state(filter));
        let first = stream.next().await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].plugin.authority, "com.example.cal");
        assert!(first[0].plugin.enabled);
        assert_eq!(first[0].state, Some(PluginState::ready()));
    }

    #[tokio::test]
    async fn test_plugin_state_failures_are_none() {
        let transport = FakeTransport::default()
            .typed("ok", Answer::Type("Calendar"))
            .typed("setup", Answer::Type("Calendar"))
            .typed("bad", Answer::Type("Calendar"))
            .typed("gone", Answer::Type("Calendar"))
            .state("ok", Answer::State(json!({ "type": "Ready", "text": "3 calendars" })))
            .state("setup", Answer::State(json!({ "type": "SetupRequired", "setupActivity": "login" })))
            .state("bad", Answer::State(json!({ "type": "SetupRequired" })))
            .state("gone", Answer::Broken);
        let f = fixture(&["ok", "setup", "bad", "gone"], transport);
        f.service.refresh().await;

        async fn state(service: &PluginService, authority: &str) -> Option<PluginState> {
            let plugin = service.plugin(authority).unwrap();
            service.plugin_state(&plugin).await
        }

        let s = &f.service;
        assert_eq!(state(s, "ok").await, Some(PluginState::Ready { text: Some("3 calendars".to_string()) }));
        assert_eq!(state(s, "setup").await, Some(PluginState::setup_required("login")));
        assert_eq!(state(s, "bad").await, None);
        assert_eq!(state(s, "gone").await, None);
    }

    #[tokio::test]
    async fn test_stream_reemits_on_change() {
        let transport = FakeTransport::default()
            .typed("a", Answer::Type("Calendar"))
            .typed("b", Answer::Type("Calendar"));
        let f = fixture(&["a", "b"], transport);
        f.service.refresh().await;

        let mut stream = Box::pin(f.service.plugins_with_state(PluginFilter::all().enabled(true)));
        assert!(stream.next().await.unwrap().is_empty());

        f.service.set_enabled("b", true);
        let next = stream.next().await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].plugin.authority, "b");
        assert_eq!(next[0].state, None);

        let mut single = Box::pin(f.service.plugin_with_state("a"));
        assert_eq!(single.next().await.unwrap().unwrap().plugin.authority, "a");
        let mut missing = Box::pin(f.service.plugin_with_state("zzz"));
        assert!(missing.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_serialize() {
        let transport = FakeTransport::default().typed("a", Answer::Type("Calendar"));
        let f = fixture(&["a"], transport);
        f.service.refresh().await;
        f.service.set_enabled("a", true);

        let service = &f.service;
        futures::future::join_all((0..8).map(|_| service.refresh())).await;

        let stored = f.repository.find_many(&PluginFilter::all()).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].enabled);
    }

    #[tokio::test]
    async fn test_start_refreshes_on_events() {
        let transport = FakeTransport::default()
            .typed("a", Answer::Type("Calendar"))
            .typed("b", Answer::Type("LocationSearch"));
        let f = fixture(&["a"], transport);

        let (tx, rx) = mpsc::channel(8);
        let mut changes = f.repository.subscribe();
        f.service.start(rx);

        tokio::time::timeout(Duration::from_secs(5), changes.changed()).await.unwrap().unwrap();
        assert_eq!(authorities(&f.service.plugins(&PluginFilter::all())), vec!["a"]);

        f.index.set(&["a", "b"]);
        tx.send(PackageEvent::Installed("com.example".to_string())).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), changes.changed()).await.unwrap().unwrap();
        assert_eq!(authorities(&f.service.plugins(&PluginFilter::all())), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_plugin_packages() {
        let transport = FakeTransport::default()
            .typed("a", Answer::Type("Calendar"))
            .typed("b", Answer::Type("FileSearch"));
        let f = fixture(&["a", "b"], transport);
        f.service.refresh().await;

        let packages = f.service.plugin_packages();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].label, "Example");
        assert_eq!(packages[0].author.as_deref(), Some("someone"));
        assert_eq!(authorities(&packages[0].plugins), vec!["a", "b"]);
        assert!(!packages[0].is_enabled());
    }

    #[tokio::test]
    async fn test_enable_and_disable_package() {
        let transport = FakeTransport::default()
            .typed("a", Answer::Type("Calendar"))
            .typed("b", Answer::Type("FileSearch"));
        let f = fixture(&["a", "b"], transport);
        f.service.refresh().await;

        assert!(f.service.enable_package("com.example"));
        let package = f.service.plugin_package("com.example").unwrap();
        assert!(package.plugins.iter().all(|p| p.enabled));
        assert!(package.is_enabled());

        // survives a rescan like a per-plugin flag
        f.service.refresh().await;
        assert_eq!(f.service.plugins(&PluginFilter::all().enabled(true)).len(), 2);

        assert!(f.service.disable_package("com.example"));
        assert!(f.service.plugins(&PluginFilter::all().enabled(true)).is_empty());

        assert!(!f.service.enable_package("org.unknown"));
        assert!(f.service.plugin_package("org.unknown").is_none());
    }

    /// Repository whose reads always fail.
    struct BrokenRepository(tokio::sync::watch::Sender<u64>);

    impl PluginRepository for BrokenRepository {
        fn find_many(&self, _filter: &PluginFilter) -> crate::plugin::PluginResult<Vec<Plugin>> {
            Err(crate::plugin::PluginError::Registry("unreadable".to_string()))
        }

        fn get(&self, _authority: &str) -> crate::plugin::PluginResult<Option<Plugin>> {
            Err(crate::plugin::PluginError::Registry("unreadable".to_string()))
        }

        fn set_enabled(&self, _authority: &str, _enabled: bool) -> crate::plugin::PluginResult<bool> {
            Ok(false)
        }

        fn set_enabled_where(&self, _filter: &PluginFilter, _enabled: bool) -> crate::plugin::PluginResult<usize> {
            Ok(0)
        }

        fn replace_all(&self, _plugins: Vec<Plugin>) -> crate::plugin::PluginResult<()> {
            Ok(())
        }

        fn subscribe(&self) -> tokio::sync::watch::Receiver<u64> {
            self.0.subscribe()
        }
    }

    #[tokio::test]
    async fn test_plugin_with_state_reports_read_errors() {
        let reporter = Arc::new(RecordingReporter::default());
        let service = PluginService::new(
            Arc::new(BrokenRepository(tokio::sync::watch::Sender::new(0))),
            Arc::new(FakeIndex::with(&[])),
            Arc::new(FakeTransport::default()),
            reporter.clone(),
        );

        let mut stream = Box::pin(service.plugin_with_state("a"));
        assert_eq!(stream.next().await, Some(None));
        assert_eq!(*reporter.0.lock(), vec!["reading plugin".to_string()]);
    }

    #[tokio::test]
    async fn test_request_permission_unsupported_is_false() {
        let transport = FakeTransport::default().typed("a", Answer::Type("Calendar"));
        let f = fixture(&["a"], transport);
        f.service.refresh().await;

        let plugin = f.service.plugin("a").unwrap();
        assert!(!f.service.request_permission(&plugin).await);
    }
}
