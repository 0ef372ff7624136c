//! Host-side plugin error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for host-side plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors from the host's own plugin bookkeeping.
///
/// Failures of plugin processes are `TransportError`s and never surface
/// through this type.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No stored plugin has this authority.
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// A second package declares an authority that is already taken.
    #[error("Authority {authority} of package {package} is already declared by {owner}")]
    DuplicateAuthority { authority: String, package: String, owner: String },

    /// Invalid package manifest.
    #[error("Invalid plugin manifest {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    /// The descriptor registry could not be read or written.
    #[error("Plugin registry error: {0}")]
    Registry(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem watcher error.
    #[cfg(feature = "file-watch")]
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}
