//! Typed host-side queries against one plugin.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::types::Plugin;
use crate::contract::calendar::{CalendarDomain, CalendarList, CALENDAR_LISTS_PATH};
use crate::contract::weather::{WeatherDomain, WeatherLocation, WEATHER_LOCATIONS_PATH};
use crate::contract::{methods, params, paths, Domain, PluginConfig, QueryAddress, RowSet};
use crate::ipc::PluginTransport;

/// Per-client query settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Whether the plugin may use the network.
    pub allow_network: bool,
    /// Preferred result language.
    pub lang: Option<String>,
    /// Queries still running after this long are cancelled.
    pub timeout: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { allow_network: false, lang: None, timeout: Some(Duration::from_secs(10)) }
    }
}

/// Searches one plugin of domain `D`.
///
/// Every failure, including a timeout, reads as "no results".
pub struct QueryPluginClient<D: Domain> {
    transport: Arc<dyn PluginTransport>,
    authority: String,
    options: QueryOptions,
    _domain: PhantomData<fn() -> D>,
}

impl<D: Domain> QueryPluginClient<D> {
    /// Client for `plugin`, or `None` if it serves another domain.
    pub fn for_plugin(transport: Arc<dyn PluginTransport>, plugin: &Plugin) -> Option<Self> {
        (plugin.plugin_type == D::PLUGIN_TYPE).then(|| Self::new(transport, plugin.authority.clone()))
    }

    /// Client for an authority whose type is already known.
    pub fn new(transport: Arc<dyn PluginTransport>, authority: impl Into<String>) -> Self {
        Self {
            transport,
            authority: authority.into(),
            options: QueryOptions::default(),
            _domain: PhantomData,
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Search the plugin. Rows the plugin sent incomplete are dropped.
    pub async fn search(&self, query: &D::Query, cancel: CancellationToken) -> Vec<D::Item> {
        let address = D::append_query(self.address(paths::SEARCH), query);
        match self.rows(address, cancel).await {
            Some(rows) => D::from_rows(&rows),
            None => Vec::new(),
        }
    }

    /// Look up a single result by id.
    pub async fn get(&self, id: &str, cancel: CancellationToken) -> Option<D::Item> {
        let address = self.address(paths::GET).with_param(params::ID, id);
        let rows = self.rows(address, cancel).await?;
        D::from_rows(&rows).into_iter().next()
    }

    /// The plugin's `GetConfig` answer, defaulted when it sent none.
    pub async fn config(&self) -> Option<PluginConfig> {
        match self.transport.call(&self.authority, methods::GET_CONFIG).await {
            Ok(Some(bundle)) => serde_json::from_value(bundle.into()).ok(),
            Ok(None) => Some(PluginConfig::default()),
            Err(e) => {
                tracing::debug!(authority = %self.authority, error = %e, "Failed to query plugin config");
                None
            }
        }
    }

    fn address(&self, path: &str) -> QueryAddress {
        QueryAddress::new(self.authority.as_str(), path)
            .with_param(params::ALLOW_NETWORK, self.options.allow_network)
            .with_opt_param(params::LANG, self.options.lang.as_deref())
    }

    async fn rows(&self, address: QueryAddress, cancel: CancellationToken) -> Option<RowSet> {
        // child token: the deadline must not cancel the caller's token
        let token = cancel.child_token();
        let query = self.transport.query(&address, token.clone());
        tokio::pin!(query);

        let result = match self.options.timeout {
            Some(limit) => tokio::select! {
                result = &mut query => result,
                () = tokio::time::sleep(limit) => {
                    tracing::debug!(authority = %self.authority, "Query timed out");
                    token.cancel();
                    query.await
                }
            },
            None => query.await,
        };

        match result {
            Ok(rows) => rows,
            Err(e) => {
                tracing::debug!(authority = %self.authority, error = %e, "Plugin query failed");
                None
            }
        }
    }
}

impl QueryPluginClient<CalendarDomain> {
    /// Calendars the plugin offers, for exclusion settings.
    pub async fn calendar_lists(&self, cancel: CancellationToken) -> Vec<CalendarList> {
        match self.rows(self.address(CALENDAR_LISTS_PATH), cancel).await {
            Some(rows) => CalendarList::from_rows(&rows),
            None => Vec::new(),
        }
    }
}

impl QueryPluginClient<WeatherDomain> {
    /// Places matching `query` that forecasts can be requested for.
    pub async fn find_locations(&self, query: &str, cancel: CancellationToken) -> Vec<WeatherLocation> {
        let address = self.address(WEATHER_LOCATIONS_PATH).with_param(params::QUERY, query);
        match self.rows(address, cancel).await {
            Some(rows) => WeatherLocation::from_rows(&rows),
            None => Vec::new(),
        }
    }
}
