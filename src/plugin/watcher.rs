//! Package change notifications from the plugins directory.

use std::path::{Component, Path, PathBuf};

use notify::event::EventKind;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::service::PackageEvent;
use super::PluginResult;

/// Watches the plugins directory and reports changed packages.
///
/// Every top-level directory is one package. Watching stops when the
/// watcher is dropped.
pub struct PackageWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl PackageWatcher {
    /// Start watching `root`, creating it if missing.
    ///
    /// Events are dropped while `events` is full; a later event triggers
    /// the same refresh.
    pub fn start(root: impl Into<PathBuf>, events: mpsc::Sender<PackageEvent>) -> PluginResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;

        let watch_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                for package_event in package_events(&watch_root, &event) {
                    if let Err(e) = events.try_send(package_event) {
                        tracing::debug!(error = %e, "Dropping package event");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "File watcher error"),
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::debug!(root = %root.display(), "Watching plugins directory");

        Ok(Self { root, _watcher: watcher })
    }

    /// The watched directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// One event per distinct package touched by `event`.
fn package_events(root: &Path, event: &Event) -> Vec<PackageEvent> {
    let mut events: Vec<PackageEvent> = Vec::new();
    for path in &event.paths {
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let mut components = relative.components();
        let Some(Component::Normal(name)) = components.next() else {
            continue;
        };
        let package = name.to_string_lossy().into_owned();
        // a file changing inside a package updates it
        let nested = components.next().is_some();

        let package_event = match event.kind {
            EventKind::Create(_) if !nested => PackageEvent::Installed(package),
            EventKind::Remove(_) if !nested => PackageEvent::Uninstalled(package),
            EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(_) => PackageEvent::Updated(package),
            _ => continue,
        };
        if !events.contains(&package_event) {
            events.push(package_event);
        }
    }
    events
}
