//! Wire contract shared by the host and plugin processes.
//!
//! Everything both sides must agree on lives here: the discovery marker,
//! the out-of-band method names, query parameter names, and for every
//! search domain the ordered result columns and their encoding.
//!
//! # Domains
//!
//! A search domain is a [`Domain`] implementation. The host never
//! dispatches on concrete plugin classes, only on the [`PluginType`] tag
//! plus this shared interface:
//!
//! - [`calendar::CalendarDomain`]: events and tasks
//! - [`location::LocationDomain`]: points of interest
//! - [`file::FileDomain`]: generic file search
//! - [`weather::WeatherDomain`]: forecasts

pub mod calendar;
pub mod file;
pub mod location;
pub mod weather;

mod address;
mod rows;
mod state;
mod types;

pub use address::{AddressError, QueryAddress, SCHEME};
pub use rows::{Row, RowSet, Value};
pub use state::PluginState;
pub use types::{
    AppIdentity, PluginConfig, PluginType, StorageStrategy, TypeResponse, UnknownPluginType,
};

/// Key/value payload of an out-of-band call.
pub type Bundle = serde_json::Map<String, serde_json::Value>;

/// Action a package declares on a provider to be discovered as a plugin.
pub const DISCOVERY_ACTION: &str = "launcher.plugin.action.PLUGIN";

/// Out-of-band method names.
pub mod methods {
    /// Returns `{ "type": <PluginType> }`.
    pub const GET_TYPE: &str = "GetType";
    /// Returns a [`PluginState`](super::PluginState) bundle.
    pub const GET_STATE: &str = "GetState";
    /// Returns a [`PluginConfig`](super::PluginConfig) bundle.
    pub const GET_CONFIG: &str = "GetConfig";
}

/// Query parameters common to every domain.
pub mod params {
    /// Free-text search term.
    pub const QUERY: &str = "query";
    /// Whether the plugin may use the network for this query.
    pub const ALLOW_NETWORK: &str = "allowNetwork";
    /// Preferred language of the caller.
    pub const LANG: &str = "lang";
    /// Result id for `get` lookups.
    pub const ID: &str = "id";
}

/// Path segments common to every domain.
pub mod paths {
    /// Search path.
    pub const SEARCH: &str = "search";
    /// Lookup of a single result by id.
    pub const GET: &str = "get";
}

/// A search domain: typed query, typed result and their wire encoding.
pub trait Domain: Send + Sync + 'static {
    /// Parsed query.
    type Query: Clone + Send + Sync + 'static;
    /// Result value.
    type Item: Clone + Send + 'static;

    /// Plugin type answering queries for this domain.
    const PLUGIN_TYPE: PluginType;

    /// Ordered result columns.
    fn columns() -> &'static [&'static str];

    /// Parse a query out of a search address. Missing required parameters
    /// yield `None`.
    fn parse_query(address: &QueryAddress) -> Option<Self::Query>;

    /// Append the query parameters to an address.
    fn append_query(address: QueryAddress, query: &Self::Query) -> QueryAddress;

    /// Encode one result as a row in [`Domain::columns`] order. `None`
    /// drops the row.
    fn encode(item: &Self::Item) -> Option<Vec<Value>>;

    /// Decode one row. `None` when a required field is missing.
    fn decode(row: &Row<'_>) -> Option<Self::Item>;

    /// Encode results, dropping rows that fail to encode.
    fn to_rows(items: &[Self::Item]) -> RowSet {
        let mut rows = RowSet::new(Self::columns());
        for item in items {
            match Self::encode(item) {
                Some(row) => {
                    rows.push_row(row);
                }
                None => tracing::debug!(domain = %Self::PLUGIN_TYPE, "Dropping invalid result row"),
            }
        }
        rows
    }

    /// Decode every valid row.
    fn from_rows(rows: &RowSet) -> Vec<Self::Item> {
        let items: Vec<_> = rows.iter().filter_map(|row| Self::decode(&row)).collect();
        if items.len() < rows.len() {
            tracing::debug!(
                domain = %Self::PLUGIN_TYPE,
                dropped = rows.len() - items.len(),
                "Dropped rows with missing required fields"
            );
        }
        items
    }
}

/// Serde helper for `"HH:mm"` times.
pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}
