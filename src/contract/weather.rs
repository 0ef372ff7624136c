//! Weather domain: forecasts for a location.
//!
//! The domain's search returns forecasts for a [`ForecastQuery`]. Plugins
//! also answer [`WEATHER_LOCATIONS_PATH`] so the user can pick a location
//! by name; the chosen [`WeatherLocation`] is sent back with every
//! forecast query.

use super::{paths, Domain, PluginType, QueryAddress, Row, RowSet, Value};

/// Path resolving a free-text place name into weather locations.
pub const WEATHER_LOCATIONS_PATH: &str = "locations";

/// Weather query parameters.
pub mod params {
    pub use crate::contract::params::QUERY;
    /// Latitude, degrees.
    pub const LATITUDE: &str = "lat";
    /// Longitude, degrees.
    pub const LONGITUDE: &str = "lon";
    /// Provider-specific location id.
    pub const LOCATION_ID: &str = "id";
    /// Name the user picked for the location.
    pub const LOCATION_NAME: &str = "locationName";
}

/// Forecast result columns.
pub mod columns {
    pub const TIMESTAMP: &str = "timestamp";
    pub const CREATED_AT: &str = "created_at";
    pub const TEMPERATURE: &str = "temperature";
    pub const TEMPERATURE_MIN: &str = "temperature_min";
    pub const TEMPERATURE_MAX: &str = "temperature_max";
    pub const PRESSURE: &str = "pressure";
    pub const HUMIDITY: &str = "humidity";
    pub const WIND_SPEED: &str = "wind_speed";
    pub const WIND_DIRECTION: &str = "wind_direction";
    pub const PRECIPITATION: &str = "precipitation";
    pub const RAIN_PROBABILITY: &str = "rain_probability";
    pub const CLOUDS: &str = "clouds";
    pub const LOCATION: &str = "location";
    pub const PROVIDER: &str = "provider";
    pub const PROVIDER_URL: &str = "provider_url";
    pub const NIGHT: &str = "night";
    pub const ICON: &str = "icon";
    pub const CONDITION: &str = "condition";

    pub const ALL: &[&str] = &[
        TIMESTAMP,
        CREATED_AT,
        TEMPERATURE,
        TEMPERATURE_MIN,
        TEMPERATURE_MAX,
        PRESSURE,
        HUMIDITY,
        WIND_SPEED,
        WIND_DIRECTION,
        PRECIPITATION,
        RAIN_PROBABILITY,
        CLOUDS,
        LOCATION,
        PROVIDER,
        PROVIDER_URL,
        NIGHT,
        ICON,
        CONDITION,
    ];
}

/// Weather location columns.
pub mod location_columns {
    pub const ID: &str = "id";
    pub const LATITUDE: &str = "lat";
    pub const LONGITUDE: &str = "lon";
    pub const NAME: &str = "name";

    pub const ALL: &[&str] = &[ID, LATITUDE, LONGITUDE, NAME];
}

/// A place forecasts can be requested for.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherLocation {
    /// Identified by coordinates.
    LatLon { name: String, lat: f64, lon: f64 },
    /// Identified by a provider-specific id.
    Id { id: String, name: String },
}

impl WeatherLocation {
    pub fn name(&self) -> &str {
        match self {
            Self::LatLon { name, .. } | Self::Id { name, .. } => name,
        }
    }

    /// Encode locations for the `locations` path. Locations with invalid
    /// coordinates or an empty id are left out.
    pub fn to_rows(locations: &[Self]) -> RowSet {
        let mut rows = RowSet::new(location_columns::ALL);
        for location in locations {
            let row = match location {
                Self::LatLon { name, lat, lon } if valid_coordinates(*lat, *lon) => {
                    vec![Value::Null, (*lat).into(), (*lon).into(), name.as_str().into()]
                }
                Self::Id { id, name } if !id.is_empty() => {
                    vec![id.as_str().into(), Value::Null, Value::Null, name.as_str().into()]
                }
                _ => continue,
            };
            rows.push_row(row);
        }
        rows
    }

    /// Decode locations, dropping rows without a name or a usable position.
    pub fn from_rows(rows: &RowSet) -> Vec<Self> {
        rows.iter()
            .filter_map(|row| {
                let name = row.string(location_columns::NAME)?;
                if let Some(id) = row.string(location_columns::ID) {
                    return Some(Self::Id { id, name });
                }
                let lat = row.real(location_columns::LATITUDE)?;
                let lon = row.real(location_columns::LONGITUDE)?;
                valid_coordinates(lat, lon).then_some(Self::LatLon { name, lat, lon })
            })
            .collect()
    }
}

/// Forecast request.
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastQuery {
    /// Weather at the user's current position.
    Current { lat: f64, lon: f64 },
    /// Weather at a location the user picked.
    At(WeatherLocation),
}

/// One forecast entry. Temperatures are in kelvin.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    /// Time the forecast is for, epoch milliseconds.
    pub timestamp: i64,
    /// Time the forecast was made, epoch milliseconds.
    pub created_at: i64,
    pub temperature: f64,
    pub temperature_min: Option<f64>,
    pub temperature_max: Option<f64>,
    /// Hectopascal.
    pub pressure: Option<f64>,
    /// Percent.
    pub humidity: Option<f64>,
    /// Meters per second.
    pub wind_speed: Option<f64>,
    /// Degrees.
    pub wind_direction: Option<f64>,
    /// Millimeters.
    pub precipitation: Option<f64>,
    /// Percent.
    pub rain_probability: Option<i64>,
    /// Percent.
    pub clouds: Option<i64>,
    pub location: String,
    pub provider: String,
    pub provider_url: Option<String>,
    pub night: bool,
    /// Icon name, e.g. `Sunny` or `Drizzle`.
    pub icon: String,
    /// Human-readable condition.
    pub condition: String,
}

fn valid_coordinates(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Weather domain contract.
pub struct WeatherDomain;

impl Domain for WeatherDomain {
    type Query = ForecastQuery;
    type Item = Forecast;

    const PLUGIN_TYPE: PluginType = PluginType::Weather;

    fn columns() -> &'static [&'static str] {
        columns::ALL
    }

    fn parse_query(address: &QueryAddress) -> Option<ForecastQuery> {
        if address.first_segment() != Some(paths::SEARCH) {
            return None;
        }

        let lat = address.parse_param::<f64>(params::LATITUDE);
        let lon = address.parse_param::<f64>(params::LONGITUDE);
        let id = address.param(params::LOCATION_ID);
        let name = address.param(params::LOCATION_NAME).map(str::to_string);

        match (lat, lon, id, name) {
            (Some(lat), Some(lon), _, None) => Some(ForecastQuery::Current { lat, lon }),
            (_, _, Some(id), Some(name)) => {
                Some(ForecastQuery::At(WeatherLocation::Id { id: id.to_string(), name }))
            }
            (Some(lat), Some(lon), None, Some(name)) => {
                Some(ForecastQuery::At(WeatherLocation::LatLon { name, lat, lon }))
            }
            _ => None,
        }
    }

    fn append_query(address: QueryAddress, query: &ForecastQuery) -> QueryAddress {
        match query {
            ForecastQuery::Current { lat, lon } => {
                address.with_param(params::LATITUDE, lat).with_param(params::LONGITUDE, lon)
            }
            ForecastQuery::At(WeatherLocation::LatLon { name, lat, lon }) => address
                .with_param(params::LATITUDE, lat)
                .with_param(params::LONGITUDE, lon)
                .with_param(params::LOCATION_NAME, name),
            ForecastQuery::At(WeatherLocation::Id { id, name }) => address
                .with_param(params::LOCATION_ID, id)
                .with_param(params::LOCATION_NAME, name),
        }
    }

    fn encode(forecast: &Forecast) -> Option<Vec<Value>> {
        if !forecast.temperature.is_finite() || forecast.location.is_empty() {
            return None;
        }
        Some(vec![
            forecast.timestamp.into(),
            forecast.created_at.into(),
            forecast.temperature.into(),
            forecast.temperature_min.into(),
            forecast.temperature_max.into(),
            forecast.pressure.into(),
            forecast.humidity.into(),
            forecast.wind_speed.into(),
            forecast.wind_direction.into(),
            forecast.precipitation.into(),
            forecast.rain_probability.into(),
            forecast.clouds.into(),
            forecast.location.as_str().into(),
            forecast.provider.as_str().into(),
            forecast.provider_url.clone().into(),
            forecast.night.into(),
            forecast.icon.as_str().into(),
            forecast.condition.as_str().into(),
        ])
    }

    fn decode(row: &Row<'_>) -> Option<Forecast> {
        Some(Forecast {
            timestamp: row.integer(columns::TIMESTAMP)?,
            created_at: row.integer(columns::CREATED_AT)?,
            temperature: row.real(columns::TEMPERATURE)?,
            temperature_min: row.real(columns::TEMPERATURE_MIN),
            temperature_max: row.real(columns::TEMPERATURE_MAX),
            pressure: row.real(columns::PRESSURE),
            humidity: row.real(columns::HUMIDITY),
            wind_speed: row.real(columns::WIND_SPEED),
            wind_direction: row.real(columns::WIND_DIRECTION),
            precipitation: row.real(columns::PRECIPITATION),
            rain_probability: row.integer(columns::RAIN_PROBABILITY),
            clouds: row.integer(columns::CLOUDS),
            location: row.string(columns::LOCATION)?,
            provider: row.string(columns::PROVIDER)?,
            provider_url: row.string(columns::PROVIDER_URL),
            night: row.boolean(columns::NIGHT).unwrap_or(false),
            icon: row.string(columns::ICON)?,
            condition: row.string(columns::CONDITION)?,
        })
    }
}
