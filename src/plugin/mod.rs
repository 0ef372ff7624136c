//! Host side of the plugin system.
//!
//! Plugins are separate executables shipped in packages below the plugins
//! directory. The host discovers them, remembers which ones the user
//! enabled, and queries them through a [`PluginTransport`](crate::ipc::PluginTransport).
//!
//! # Architecture
//!
//! - [`PluginScanner`] asks every provider declaring the discovery action
//!   for its type
//! - [`PluginService`] keeps the descriptor table in a [`PluginRepository`]
//!   in sync with installed packages and exposes reactive views
//! - [`QueryPluginClient`] runs typed searches against one plugin
//!
//! # Example Manifest
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
//! command = "bin/example-calendar"
//! ```

mod client;
mod error;
mod index;
mod manifest;
mod reporter;
mod repository;
mod scanner;
mod service;
mod types;
#[cfg(feature = "file-watch")]
mod watcher;

pub use client::{QueryOptions, QueryPluginClient};
pub use error::{PluginError, PluginResult};
pub use index::{ManifestIndex, PackageIndex, PackageInfo, ProviderInfo};
pub use manifest::{ExecSpec, PackageManifest, PackageMetadata, ProviderEntry, MANIFEST_FILE};
pub use reporter::{ErrorReporter, TracingReporter};
pub use repository::{JsonPluginRepository, MemoryPluginRepository, PluginFilter, PluginRepository};
pub use scanner::PluginScanner;
pub use service::{PackageEvent, PluginService};
pub use types::{Plugin, PluginPackage, PluginWithState};
#[cfg(feature = "file-watch")]
pub use watcher::PackageWatcher;
