//! Plugin discovery.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::PluginError;
use super::index::{PackageIndex, ProviderInfo};
use super::reporter::ErrorReporter;
use super::types::Plugin;
use crate::contract::{methods, PluginType, TypeResponse, DISCOVERY_ACTION};
use crate::ipc::{PluginTransport, TransportError};

/// Finds installed plugin endpoints and classifies them.
pub struct PluginScanner {
    index: Arc<dyn PackageIndex>,
    transport: Arc<dyn PluginTransport>,
    reporter: Arc<dyn ErrorReporter>,
}

impl PluginScanner {
    pub fn new(
        index: Arc<dyn PackageIndex>,
        transport: Arc<dyn PluginTransport>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self { index, transport, reporter }
    }

    /// Every installed endpoint declaring the discovery action that
    /// answers `GetType` with a known type, in index order.
    ///
    /// A failing candidate is skipped without affecting the others. An
    /// authority belongs to the first package declaring it; later
    /// declarations are reported and skipped. Every returned plugin has
    /// `enabled == false`.
    pub async fn find_plugins(&self) -> Vec<Plugin> {
        let mut plugins = Vec::new();
        let mut owners: HashMap<String, String> = HashMap::new();

        for provider in self.index.query_providers(DISCOVERY_ACTION) {
            let Some(authority) = provider.authority.clone() else {
                tracing::debug!(
                    package = %provider.package_name,
                    class = %provider.class_name,
                    "Skipping provider without authority"
                );
                continue;
            };

            if let Some(owner) = owners.get(&authority) {
                let error = PluginError::DuplicateAuthority {
                    authority: authority.clone(),
                    package: provider.package_name.clone(),
                    owner: owner.clone(),
                };
                self.reporter.report(&format!("scanning plugin {}", authority), &error);
                continue;
            }
            owners.insert(authority.clone(), provider.package_name.clone());

            match self.plugin_type(&authority).await {
                Ok(Some(plugin_type)) => plugins.push(descriptor(provider, authority, plugin_type)),
                Ok(None) => {}
                Err(TransportError::PermissionDenied(_)) => {
                    tracing::debug!(authority = %authority, "Plugin refused discovery");
                }
                Err(e) => self.reporter.report(&format!("scanning plugin {}", authority), &e),
            }
        }

        tracing::debug!(count = plugins.len(), "Plugin scan finished");
        plugins
    }

    /// `None` when the endpoint returned nothing or an unknown type.
    async fn plugin_type(&self, authority: &str) -> Result<Option<PluginType>, TransportError> {
        let Some(bundle) = self.transport.call(authority, methods::GET_TYPE).await? else {
            tracing::debug!(authority, "Plugin returned no type");
            return Ok(None);
        };

        match serde_json::from_value::<TypeResponse>(bundle.into()) {
            Ok(response) => Ok(Some(response.plugin_type)),
            Err(e) => {
                tracing::debug!(authority, error = %e, "Plugin returned an unknown type");
                Ok(None)
            }
        }
    }
}

fn descriptor(provider: ProviderInfo, authority: String, plugin_type: PluginType) -> Plugin {
    Plugin {
        authority,
        label: provider.label,
        description: provider.description,
        package_name: provider.package_name,
        class_name: provider.class_name,
        plugin_type,
        settings_activity: provider.settings_activity,
        enabled: false,
    }
}
