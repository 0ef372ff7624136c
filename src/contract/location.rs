//! Location domain: points of interest.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::{hhmm, paths, Domain, PluginType, QueryAddress, Row, Value};

/// Location query parameters.
pub mod params {
    pub use crate::contract::params::QUERY;
    /// User latitude, degrees.
    pub const USER_LATITUDE: &str = "lat";
    /// User longitude, degrees.
    pub const USER_LONGITUDE: &str = "lon";
    /// Search radius in meters. Required.
    pub const SEARCH_RADIUS: &str = "radius";
}

/// Location result columns.
pub mod columns {
    pub const ID: &str = "id";
    pub const LABEL: &str = "label";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const FIX_ME_URL: &str = "fix_me_url";
    pub const CATEGORY: &str = "category";
    pub const STREET: &str = "street";
    pub const HOUSE_NUMBER: &str = "house_number";
    pub const OPENING_SCHEDULE: &str = "opening_schedule";
    pub const WEBSITE_URL: &str = "website_url";
    pub const PHONE_NUMBER: &str = "phone_number";
    pub const USER_RATING: &str = "user_rating";
    pub const DEPARTURES: &str = "departures";

    pub const ALL: &[&str] = &[
        ID,
        LABEL,
        LATITUDE,
        LONGITUDE,
        FIX_ME_URL,
        CATEGORY,
        STREET,
        HOUSE_NUMBER,
        OPENING_SCHEDULE,
        WEBSITE_URL,
        PHONE_NUMBER,
        USER_RATING,
        DEPARTURES,
    ];
}

/// Location search query.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationQuery {
    pub query: String,
    pub user_latitude: Option<f64>,
    pub user_longitude: Option<f64>,
    /// Meters.
    pub search_radius: i64,
}

/// Opening hours of a place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningSchedule {
    pub is_twenty_four_seven: bool,
    #[serde(default)]
    pub opening_hours: Vec<OpeningHours>,
}

/// One opening interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningHours {
    /// ISO day of week, Monday = 1 … Sunday = 7.
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
}

impl OpeningSchedule {
    fn is_valid(&self) -> bool {
        self.opening_hours.iter().all(|h| (1..=7).contains(&h.day_of_week))
    }
}

/// A public transport departure from a stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Departure {
    /// Scheduled time.
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_minutes: Option<i64>,
    pub line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_stop: Option<String>,
    /// Vehicle type, e.g. `Bus` or `Tram`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub line_type: Option<String>,
}

/// A point of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: String,
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
    pub fix_me_url: Option<String>,
    pub category: Option<String>,
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub opening_schedule: Option<OpeningSchedule>,
    pub website_url: Option<String>,
    pub phone_number: Option<String>,
    pub user_rating: Option<f32>,
    pub departures: Option<Vec<Departure>>,
}

fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

/// Location domain contract.
pub struct LocationDomain;

impl Domain for LocationDomain {
    type Query = LocationQuery;
    type Item = Location;

    const PLUGIN_TYPE: PluginType = PluginType::LocationSearch;

    fn columns() -> &'static [&'static str] {
        columns::ALL
    }

    fn parse_query(address: &QueryAddress) -> Option<LocationQuery> {
        if address.first_segment() != Some(paths::SEARCH) {
            return None;
        }
        Some(LocationQuery {
            query: address.param(params::QUERY)?.to_string(),
            user_latitude: address.parse_param(params::USER_LATITUDE),
            user_longitude: address.parse_param(params::USER_LONGITUDE),
            search_radius: address.parse_param(params::SEARCH_RADIUS)?,
        })
    }

    fn append_query(address: QueryAddress, query: &LocationQuery) -> QueryAddress {
        address
            .with_param(params::QUERY, &query.query)
            .with_opt_param(params::USER_LATITUDE, query.user_latitude)
            .with_opt_param(params::USER_LONGITUDE, query.user_longitude)
            .with_param(params::SEARCH_RADIUS, query.search_radius)
    }

    fn encode(location: &Location) -> Option<Vec<Value>> {
        if location.id.is_empty() || !valid_coordinates(location.latitude, location.longitude) {
            return None;
        }
        Some(vec![
            location.id.as_str().into(),
            location.label.as_str().into(),
            location.latitude.into(),
            location.longitude.into(),
            location.fix_me_url.clone().into(),
            location.category.clone().into(),
            location.street.clone().into(),
            location.house_number.clone().into(),
            location.opening_schedule.as_ref().map_or(Value::Null, Value::json),
            location.website_url.clone().into(),
            location.phone_number.clone().into(),
            location.user_rating.into(),
            location.departures.as_ref().map_or(Value::Null, Value::json),
        ])
    }

    fn decode(row: &Row<'_>) -> Option<Location> {
        let latitude = row.real(columns::LATITUDE)?;
        let longitude = row.real(columns::LONGITUDE)?;
        if !valid_coordinates(latitude, longitude) {
            return None;
        }
        Some(Location {
            id: row.string(columns::ID)?,
            label: row.string(columns::LABEL)?,
            latitude,
            longitude,
            fix_me_url: row.string(columns::FIX_ME_URL),
            category: row.string(columns::CATEGORY),
            street: row.string(columns::STREET),
            house_number: row.string(columns::HOUSE_NUMBER),
            opening_schedule: row
                .json::<OpeningSchedule>(columns::OPENING_SCHEDULE)
                .filter(OpeningSchedule::is_valid),
            website_url: row.string(columns::WEBSITE_URL),
            phone_number: row.string(columns::PHONE_NUMBER),
            user_rating: row.real(columns::USER_RATING).map(|r| r as f32),
            departures: row.json(columns::DEPARTURES),
        })
    }
}
