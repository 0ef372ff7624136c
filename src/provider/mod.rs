//! Plugin-side building blocks.
//!
//! A plugin executable wraps its search backend in a [`ProviderEndpoint`]
//! and hands it to [`run_plugin_main`]:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use launcher_plugins::contract::file::{File, FileDomain, FileQuery};
//! use launcher_plugins::permissions::PermissionManager;
//! use launcher_plugins::provider::{run_plugin_main, ProviderEndpoint, SearchProvider};
//!
//! struct Notes;
//!
//! #[async_trait]
//! impl SearchProvider<FileDomain> for Notes {
//!     async fn search(&self, _query: FileQuery, _allow_network: bool) -> Vec<File> {
//!         Vec::new()
//!     }
//! }
//!
//! fn main() {
//!     let runtime = tokio::runtime::Runtime::new().unwrap();
//!     let permissions = Arc::new(PermissionManager::open("grants").unwrap());
//!     let endpoint = ProviderEndpoint::new(Notes, Arc::clone(&permissions), runtime.handle().clone());
//!     std::process::exit(run_plugin_main(Arc::new(endpoint), permissions, "Notes"));
//! }
//! ```

mod bridge;
mod endpoint;
mod entry;
mod search;
mod server;

pub use bridge::block_on_cancellable;
pub use endpoint::{Endpoint, EndpointError};
pub use entry::{run_plugin, run_plugin_main};
pub use search::{CallPolicy, ProviderEndpoint, SearchProvider};
pub use server::ProviderServer;
