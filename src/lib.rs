//! # Launcher Plugins
//!
//! Out-of-process search plugins for an application launcher.
//!
//! Plugins are separate executables that answer typed search queries
//! (calendar events, places, files) over a small JSON-RPC protocol. The
//! host discovers installed plugins, remembers which ones the user enabled,
//! tracks their readiness and runs cancellable queries against them.
//!
//! ## Layout
//!
//! - [`contract`]: wire types both sides agree on
//! - [`ipc`]: transports between host and plugin processes
//! - [`plugin`]: host-side discovery, storage and querying
//! - [`provider`]: plugin-side endpoint and stdio server
//! - [`permissions`]: plugin-side caller grants
//! - [`config`]: host configuration

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::use_self)]

pub mod config;
pub mod contract;
pub mod ipc;
pub mod permissions;
pub mod plugin;
pub mod provider;

pub use config::Config;
pub use contract::{AppIdentity, PluginState, PluginType, QueryAddress};
pub use ipc::{PluginTransport, TransportError};
pub use plugin::{Plugin, PluginError, PluginFilter, PluginResult, PluginService, QueryPluginClient};
pub use provider::{ProviderEndpoint, SearchProvider};
