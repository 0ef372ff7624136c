//! Generic query endpoint for one search domain.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::bridge::block_on_cancellable;
use super::endpoint::{Endpoint, EndpointError};
use crate::contract::{
    methods, params, paths, Bundle, Domain, PluginConfig, PluginState, QueryAddress, RowSet,
    TypeResponse,
};
use crate::permissions::PermissionManager;

/// A plugin's search backend for domain `D`.
#[async_trait]
pub trait SearchProvider<D: Domain>: Send + Sync + 'static {
    /// Search for results. `allow_network` is false when the caller wants
    /// offline results only.
    ///
    /// Runs on the plugin's runtime; blocking work belongs in
    /// `tokio::task::spawn_blocking` so cancellation can drop the search.
    async fn search(&self, query: D::Query, allow_network: bool) -> Vec<D::Item>;

    /// Look up a single result by id.
    async fn get(&self, _id: &str) -> Option<D::Item> {
        None
    }

    /// Current readiness. Must be cheap; called synchronously.
    fn state(&self) -> PluginState {
        PluginState::ready()
    }

    /// Handle a domain-specific path other than `search` and `get`, such
    /// as the calendar's `calendar-lists`. `None` if the path is unknown.
    fn sub_path(&self, _segment: &str, _address: &QueryAddress) -> Option<RowSet> {
        None
    }
}

/// Which callers may use out-of-band calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallPolicy {
    /// Anyone may discover the plugin and read its state.
    #[default]
    Anyone,
    /// Only granted callers; others get a permission error.
    GrantedOnly,
}

/// Endpoint serving domain `D` from a [`SearchProvider`].
///
/// Queries are gated on the grant set and fail closed. Searches run on
/// `runtime` while the requesting thread waits, so cancelling the request
/// drops the search.
pub struct ProviderEndpoint<D: Domain, P> {
    provider: Arc<P>,
    permissions: Arc<PermissionManager>,
    runtime: Handle,
    config: PluginConfig,
    call_policy: CallPolicy,
    _domain: PhantomData<fn() -> D>,
}

impl<D: Domain, P: SearchProvider<D>> ProviderEndpoint<D, P> {
    pub fn new(provider: P, permissions: Arc<PermissionManager>, runtime: Handle) -> Self {
        Self {
            provider: Arc::new(provider),
            permissions,
            runtime,
            config: PluginConfig::default(),
            call_policy: CallPolicy::default(),
            _domain: PhantomData,
        }
    }

    /// Set the configuration returned by `GetConfig`.
    pub fn with_config(mut self, config: PluginConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_call_policy(mut self, policy: CallPolicy) -> Self {
        self.call_policy = policy;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn permissions(&self) -> &Arc<PermissionManager> {
        &self.permissions
    }

    fn search(&self, address: &QueryAddress, cancel: &CancellationToken) -> Option<RowSet> {
        let Some(query) = D::parse_query(address) else {
            tracing::debug!(address = %address, "Missing required query parameters");
            return None;
        };
        let allow_network = address.parse_param(params::ALLOW_NETWORK).unwrap_or(false);

        let provider = Arc::clone(&self.provider);
        let items = block_on_cancellable(&self.runtime, cancel, async move {
            provider.search(query, allow_network).await
        })?;

        Some(D::to_rows(&items))
    }

    fn get(&self, address: &QueryAddress, cancel: &CancellationToken) -> Option<RowSet> {
        let id = address.param(params::ID)?.to_string();

        let provider = Arc::clone(&self.provider);
        let found = block_on_cancellable(&self.runtime, cancel, async move { provider.get(&id).await })?;

        Some(D::to_rows(found.as_slice()))
    }
}

fn to_bundle<T: Serialize>(value: &T) -> Result<Bundle, EndpointError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(EndpointError::Internal(format!("Expected an object, got {other}"))),
        Err(e) => Err(EndpointError::Internal(e.to_string())),
    }
}

impl<D: Domain, P: SearchProvider<D>> Endpoint for ProviderEndpoint<D, P> {
    fn call(&self, caller: &str, method: &str) -> Result<Option<Bundle>, EndpointError> {
        if self.call_policy == CallPolicy::GrantedOnly && !self.permissions.has_permission(caller) {
            return Err(EndpointError::PermissionDenied(caller.to_string()));
        }

        let bundle = match method {
            methods::GET_TYPE => to_bundle(&TypeResponse { plugin_type: D::PLUGIN_TYPE })?,
            methods::GET_STATE => self.provider.state().to_bundle(),
            methods::GET_CONFIG => to_bundle(&self.config)?,
            other => return Err(EndpointError::Unsupported(format!("method {other}"))),
        };
        Ok(Some(bundle))
    }

    fn query(
        &self,
        caller: &str,
        address: &QueryAddress,
        cancel: &CancellationToken,
    ) -> Result<Option<RowSet>, EndpointError> {
        if !self.permissions.has_permission(caller) {
            tracing::debug!(caller, "Rejected query from caller without grant");
            return Ok(None);
        }

        match address.first_segment() {
            Some(paths::SEARCH) => Ok(self.search(address, cancel)),
            Some(paths::GET) => Ok(self.get(address, cancel)),
            Some(segment) => match self.provider.sub_path(segment, address) {
                Some(rows) => Ok(Some(rows)),
                None => Err(EndpointError::Unsupported(format!("path {segment}"))),
            },
            None => Err(EndpointError::Unsupported("empty path".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::calendar::{
        CalendarContentType, CalendarDomain, CalendarEvent, CalendarList, CalendarQuery,
        CALENDAR_LISTS_PATH,
    };
    use crate::contract::file::{File, FileDomain, FileQuery};
    use crate::contract::{PluginType, StorageStrategy};
    use std::time::Duration;

    struct Calendar {
        setup: bool,
    }

    fn event(id: &str, title: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            location: None,
            color: None,
            calendar_name: Some("Work".to_string()),
            start_time: Some(1_000),
            end_time: 2_000,
            include_time: true,
            attendees: Vec::new(),
            uri: format!("cal://{id}"),
            is_completed: None,
        }
    }

    #[async_trait]
    impl SearchProvider<CalendarDomain> for Calendar {
        async fn search(&self, query: CalendarQuery, _allow_network: bool) -> Vec<CalendarEvent> {
            let all = vec![event("1", "Standup"), event("2", "Lunch")];
            match query.query {
                Some(q) => all.into_iter().filter(|e| e.title.contains(&q)).collect(),
                None => all,
            }
        }

        async fn get(&self, id: &str) -> Option<CalendarEvent> {
            (id == "1").then(|| event("1", "Standup"))
        }

        fn state(&self) -> PluginState {
            if self.setup {
                PluginState::setup_required("settings")
            } else {
                PluginState::ready()
            }
        }

        fn sub_path(&self, segment: &str, _address: &QueryAddress) -> Option<RowSet> {
            (segment == CALENDAR_LISTS_PATH).then(|| {
                CalendarList::to_rows(&[CalendarList {
                    id: "work".to_string(),
                    name: "Work".to_string(),
                    color: None,
                    account_name: None,
                    content_types: vec![CalendarContentType::Calendar],
                }])
            })
        }
    }

    struct SlowFiles;

    #[async_trait]
    impl SearchProvider<FileDomain> for SlowFiles {
        async fn search(&self, _query: FileQuery, _allow_network: bool) -> Vec<File> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Vec::new()
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread().worker_threads(1).enable_all().build().unwrap()
    }

    fn granted() -> Arc<PermissionManager> {
        let permissions = PermissionManager::ephemeral();
        permissions.grant_permission("launcher").unwrap();
        Arc::new(permissions)
    }

    #[test]
    fn test_query_without_grant_fails_closed() {
        let rt = runtime();
        let endpoint = ProviderEndpoint::new(
            Calendar { setup: false },
            Arc::new(PermissionManager::ephemeral()),
            rt.handle().clone(),
        );
        let address = QueryAddress::new("cal", "search").with_param("query", "Standup");
        let result = endpoint.query("launcher", &address, &CancellationToken::new()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_search_encodes_results() {
        let rt = runtime();
        let endpoint = ProviderEndpoint::new(Calendar { setup: false }, granted(), rt.handle().clone());
        let address = QueryAddress::new("cal", "search").with_param("query", "Lunch");

        let rows = endpoint.query("launcher", &address, &CancellationToken::new()).unwrap().unwrap();
        let events = CalendarDomain::from_rows(&rows);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Lunch");
    }

    #[test]
    fn test_get_by_id() {
        let rt = runtime();
        let endpoint = ProviderEndpoint::new(Calendar { setup: false }, granted(), rt.handle().clone());

        let found = QueryAddress::new("cal", "get").with_param("id", "1");
        let rows = endpoint.query("launcher", &found, &CancellationToken::new()).unwrap().unwrap();
        assert_eq!(rows.len(), 1);

        let missing = QueryAddress::new("cal", "get").with_param("id", "9");
        let rows = endpoint.query("launcher", &missing, &CancellationToken::new()).unwrap().unwrap();
        assert!(rows.is_empty());

        let no_id = QueryAddress::new("cal", "get");
        assert!(endpoint.query("launcher", &no_id, &CancellationToken::new()).unwrap().is_none());
    }

    #[test]
    fn test_calendar_lists_sub_path() {
        let rt = runtime();
        let endpoint = ProviderEndpoint::new(Calendar { setup: false }, granted(), rt.handle().clone());
        let address = QueryAddress::new("cal", CALENDAR_LISTS_PATH);

        let rows = endpoint.query("launcher", &address, &CancellationToken::new()).unwrap().unwrap();
        let lists = CalendarList::from_rows(&rows);
        assert_eq!(lists[0].id, "work");

        let unknown = QueryAddress::new("cal", "weather");
        assert!(matches!(
            endpoint.query("launcher", &unknown, &CancellationToken::new()),
            Err(EndpointError::Unsupported(_))
        ));
    }

    #[test]
    fn test_missing_required_parameter() {
        let rt = runtime();
        let endpoint = ProviderEndpoint::new(SlowFiles, granted(), rt.handle().clone());
        let address = QueryAddress::new("files", "search");
        assert!(endpoint.query("launcher", &address, &CancellationToken::new()).unwrap().is_none());
    }

    #[test]
    fn test_cancelled_search_returns_none() {
        let rt = runtime();
        let endpoint = ProviderEndpoint::new(SlowFiles, granted(), rt.handle().clone());
        let address = QueryAddress::new("files", "search").with_param("query", "report");

        let token = CancellationToken::new();
        let canceller = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        assert!(endpoint.query("launcher", &address, &token).unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_out_of_band_calls() {
        let rt = runtime();
        let endpoint = ProviderEndpoint::new(Calendar { setup: true }, granted(), rt.handle().clone())
            .with_config(PluginConfig { storage_strategy: StorageStrategy::StoreReference });

        let bundle = endpoint.call("anyone", methods::GET_TYPE).unwrap().unwrap();
        let response: TypeResponse = serde_json::from_value(bundle.into()).unwrap();
        assert_eq!(response.plugin_type, PluginType::Calendar);

        let bundle = endpoint.call("anyone", methods::GET_STATE).unwrap().unwrap();
        assert_eq!(PluginState::from_bundle(&bundle), Some(PluginState::setup_required("settings")));

        let bundle = endpoint.call("anyone", methods::GET_CONFIG).unwrap().unwrap();
        assert_eq!(bundle["storageStrategy"], "StoreReference");

        assert!(matches!(endpoint.call("anyone", "Reboot"), Err(EndpointError::Unsupported(_))));
    }

    #[test]
    fn test_granted_only_call_policy() {
        let rt = runtime();
        let endpoint = ProviderEndpoint::new(Calendar { setup: false }, granted(), rt.handle().clone())
            .with_call_policy(CallPolicy::GrantedOnly);

        assert!(endpoint.call("launcher", methods::GET_TYPE).is_ok());
        assert!(matches!(
            endpoint.call("stranger", methods::GET_TYPE),
            Err(EndpointError::PermissionDenied(_))
        ));
    }
}
