//! Calendar domain: events and tasks.

use serde::{Deserialize, Serialize};

use super::{paths, Domain, PluginType, QueryAddress, Row, RowSet, Value};

/// Path listing the calendars a plugin can search.
pub const CALENDAR_LISTS_PATH: &str = "calendar-lists";

/// Calendar query parameters.
pub mod params {
    pub use crate::contract::params::QUERY;
    /// Range start, epoch milliseconds.
    pub const START: &str = "start";
    /// Range end, epoch milliseconds.
    pub const END: &str = "end";
    /// Comma separated calendar ids to leave out.
    pub const EXCLUDE: &str = "exclude";
}

/// Event result columns.
pub mod columns {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const LOCATION: &str = "location";
    pub const COLOR: &str = "color";
    pub const CALENDAR_NAME: &str = "calendar_name";
    pub const START_TIME: &str = "start_time";
    pub const END_TIME: &str = "end_time";
    pub const INCLUDE_TIME: &str = "include_time";
    pub const ATTENDEES: &str = "attendees";
    pub const URI: &str = "uri";
    pub const IS_COMPLETED: &str = "is_completed";

    pub const ALL: &[&str] = &[
        ID,
        TITLE,
        DESCRIPTION,
        LOCATION,
        COLOR,
        CALENDAR_NAME,
        START_TIME,
        END_TIME,
        INCLUDE_TIME,
        ATTENDEES,
        URI,
        IS_COMPLETED,
    ];
}

/// Calendar list columns.
pub mod list_columns {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const COLOR: &str = "color";
    pub const ACCOUNT_NAME: &str = "account_name";
    pub const CONTENT_TYPES: &str = "content_types";

    pub const ALL: &[&str] = &[ID, NAME, COLOR, ACCOUNT_NAME, CONTENT_TYPES];
}

/// Calendar search query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarQuery {
    /// Free text; `None` lists everything in range.
    pub query: Option<String>,
    /// Range start, epoch milliseconds.
    pub start: Option<i64>,
    /// Range end, epoch milliseconds.
    pub end: Option<i64>,
    /// Calendar ids to leave out.
    pub excluded_calendars: Vec<String>,
}

/// A calendar event or task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// ARGB color.
    pub color: Option<u32>,
    pub calendar_name: Option<String>,
    /// Epoch milliseconds; tasks may have no start.
    pub start_time: Option<i64>,
    /// Epoch milliseconds.
    pub end_time: i64,
    /// `false` for all-day events.
    pub include_time: bool,
    pub attendees: Vec<String>,
    /// Uri opened when the user taps the event.
    pub uri: String,
    /// Present only for tasks.
    pub is_completed: Option<bool>,
}

impl CalendarEvent {
    /// Whether this result is a task rather than an event.
    pub fn is_task(&self) -> bool {
        self.is_completed.is_some()
    }
}

/// Kind of entries a calendar holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarContentType {
    Calendar,
    Tasks,
}

/// A calendar offered by a plugin, used for exclusion settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarList {
    pub id: String,
    pub name: String,
    pub color: Option<u32>,
    pub account_name: Option<String>,
    pub content_types: Vec<CalendarContentType>,
}

impl CalendarList {
    /// Encode calendar lists for the `calendar-lists` path.
    pub fn to_rows(lists: &[Self]) -> RowSet {
        let mut rows = RowSet::new(list_columns::ALL);
        for list in lists.iter().filter(|l| !l.id.is_empty()) {
            rows.push_row(vec![
                list.id.as_str().into(),
                list.name.as_str().into(),
                list.color.into(),
                list.account_name.clone().into(),
                Value::json(&list.content_types),
            ]);
        }
        rows
    }

    /// Decode calendar lists, dropping incomplete rows.
    pub fn from_rows(rows: &RowSet) -> Vec<Self> {
        rows.iter()
            .filter_map(|row| {
                Some(Self {
                    id: row.string(list_columns::ID)?,
                    name: row.string(list_columns::NAME)?,
                    color: row.integer(list_columns::COLOR).and_then(argb),
                    account_name: row.string(list_columns::ACCOUNT_NAME),
                    content_types: row.json(list_columns::CONTENT_TYPES)?,
                })
            })
            .collect()
    }
}

/// Accept colors sent either as unsigned ARGB or as a signed 32-bit int.
fn argb(value: i64) -> Option<u32> {
    u32::try_from(value).ok().or_else(|| i32::try_from(value).ok().map(|v| v as u32))
}

/// Calendar domain contract.
pub struct CalendarDomain;

impl Domain for CalendarDomain {
    type Query = CalendarQuery;
    type Item = CalendarEvent;

    const PLUGIN_TYPE: PluginType = PluginType::Calendar;

    fn columns() -> &'static [&'static str] {
        columns::ALL
    }

    fn parse_query(address: &QueryAddress) -> Option<CalendarQuery> {
        if address.first_segment() != Some(paths::SEARCH) {
            return None;
        }
        Some(CalendarQuery {
            query: address.param(params::QUERY).map(str::to_string),
            start: address.parse_param(params::START),
            end: address.parse_param(params::END),
            excluded_calendars: address
                .param(params::EXCLUDE)
                .map(|csv| {
                    csv.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect()
                })
                .unwrap_or_default(),
        })
    }

    fn append_query(address: QueryAddress, query: &CalendarQuery) -> QueryAddress {
        let address = address
            .with_opt_param(params::QUERY, query.query.as_deref())
            .with_opt_param(params::START, query.start)
            .with_opt_param(params::END, query.end);
        if query.excluded_calendars.is_empty() {
            address
        } else {
            address.with_param(params::EXCLUDE, query.excluded_calendars.join(","))
        }
    }

    fn encode(event: &CalendarEvent) -> Option<Vec<Value>> {
        if event.id.is_empty() || event.uri.is_empty() {
            return None;
        }
        Some(vec![
            event.id.as_str().into(),
            event.title.as_str().into(),
            event.description.clone().into(),
            event.location.clone().into(),
            event.color.into(),
            event.calendar_name.clone().into(),
            event.start_time.into(),
            event.end_time.into(),
            event.include_time.into(),
            Value::json(&event.attendees),
            event.uri.as_str().into(),
            event.is_completed.into(),
        ])
    }

    fn decode(row: &Row<'_>) -> Option<CalendarEvent> {
        Some(CalendarEvent {
            id: row.string(columns::ID)?,
            title: row.string(columns::TITLE)?,
            description: row.string(columns::DESCRIPTION),
            location: row.string(columns::LOCATION),
            color: row.integer(columns::COLOR).and_then(argb),
            calendar_name: row.string(columns::CALENDAR_NAME),
            start_time: row.integer(columns::START_TIME),
            end_time: row.integer(columns::END_TIME)?,
            include_time: row.boolean(columns::INCLUDE_TIME).unwrap_or(true),
            attendees: row.json(columns::ATTENDEES).unwrap_or_default(),
            uri: row.string(columns::URI)?,
            is_completed: row.boolean(columns::IS_COMPLETED),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: "Standup".to_string(),
            description: None,
            location: Some("Room 4".to_string()),
            color: Some(0xFF33_66CC),
            calendar_name: Some("Work".to_string()),
            start_time: Some(1_700_000_000_000),
            end_time: 1_700_000_900_000,
            include_time: true,
            attendees: vec!["ana@example.com".to_string()],
            uri: format!("https://cal.example.com/{id}"),
            is_completed: None,
        }
    }

    #[test]
    fn test_parse_query() {
        let address = QueryAddress::new("com.example.cal", "search")
            .with_param("query", "standup")
            .with_param("start", 10)
            .with_param("end", 20)
            .with_param("exclude", "work,,home");

        let query = CalendarDomain::parse_query(&address).unwrap();
        assert_eq!(query.query.as_deref(), Some("standup"));
        assert_eq!(query.start, Some(10));
        assert_eq!(query.end, Some(20));
        assert_eq!(query.excluded_calendars, vec!["work", "home"]);
    }

    #[test]
    fn test_append_query_matches_parse() {
        let query = CalendarQuery {
            query: None,
            start: Some(1),
            end: None,
            excluded_calendars: vec!["a".to_string(), "b".to_string()],
        };
        let address =
            CalendarDomain::append_query(QueryAddress::new("x", paths::SEARCH), &query);
        assert_eq!(address.param("query"), None);
        assert_eq!(CalendarDomain::parse_query(&address), Some(query));
    }

    #[test]
    fn test_row_missing_end_time_is_dropped() {
        let mut rows = CalendarDomain::to_rows(&[event("1"), event("2")]);
        let mut broken = CalendarDomain::encode(&event("3")).unwrap();
        broken[7] = Value::Null;
        rows.push_row(broken);

        let decoded = CalendarDomain::from_rows(&rows);
        let ids: Vec<_> = decoded.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_decode_defaults() {
        let mut rows = RowSet::new(columns::ALL);
        rows.push_row(vec![
            "t1".into(),
            "Buy milk".into(),
            Value::Null,
            Value::Null,
            Value::Integer(-16_777_216),
            Value::Null,
            Value::Null,
            Value::Integer(5),
            Value::Null,
            Value::Null,
            "tasks://t1".into(),
            Value::Boolean(false),
        ]);

        let task = CalendarDomain::from_rows(&rows).pop().unwrap();
        assert!(task.include_time);
        assert!(task.attendees.is_empty());
        assert_eq!(task.start_time, None);
        assert_eq!(task.color, Some(0xFF00_0000));
        assert!(task.is_task());
    }

    #[test]
    fn test_encoder_drops_events_without_id() {
        let rows = CalendarDomain::to_rows(&[event(""), event("ok")]);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_calendar_lists() {
        let lists = vec![CalendarList {
            id: "work".to_string(),
            name: "Work".to_string(),
            color: None,
            account_name: Some("me@example.com".to_string()),
            content_types: vec![CalendarContentType::Calendar, CalendarContentType::Tasks],
        }];
        let rows = CalendarList::to_rows(&lists);
        let row = rows.iter().next().unwrap();
        assert_eq!(row.text(list_columns::CONTENT_TYPES), Some(r#"["calendar","tasks"]"#));
        assert_eq!(CalendarList::from_rows(&rows), lists);
    }
}
