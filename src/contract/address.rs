//! Query addresses: `content://<authority>/<path>?<params>`.

use std::fmt;
use std::str::FromStr;

/// URI scheme of every query address.
pub const SCHEME: &str = "content";

/// Errors from parsing a query address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The address does not start with `content://`.
    #[error("Address must use the content:// scheme: {0}")]
    Scheme(String),

    /// The authority part is empty.
    #[error("Address has no authority: {0}")]
    MissingAuthority(String),

    /// A component is not valid percent-encoded UTF-8.
    #[error("Invalid percent-encoding in address: {0}")]
    Encoding(String),
}

/// A parsed query address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAddress {
    authority: String,
    segments: Vec<String>,
    params: Vec<(String, String)>,
}

impl QueryAddress {
    /// Address of the endpoint root, without path.
    pub fn root(authority: impl Into<String>) -> Self {
        Self { authority: authority.into(), segments: Vec::new(), params: Vec::new() }
    }

    /// Address of a path below the endpoint.
    pub fn new(authority: impl Into<String>, path: &str) -> Self {
        Self::root(authority).with_path(path)
    }

    /// Append path segments (`a/b` appends two segments).
    pub fn with_path(mut self, path: &str) -> Self {
        self.segments
            .extend(path.split('/').filter(|s| !s.is_empty()).map(str::to_string));
        self
    }

    /// Append a query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Append a query parameter if a value is present.
    pub fn with_opt_param<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_param(key, value),
            None => self,
        }
    }

    /// The endpoint authority.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Decoded path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First path segment, used to dispatch on the endpoint side.
    pub fn first_segment(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// First value of a query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Parse a query parameter, treating unparsable values as absent.
    pub fn parse_param<T: FromStr>(&self, key: &str) -> Option<T> {
        self.param(key).and_then(|v| v.parse().ok())
    }

    /// All query parameters in order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

impl fmt::Display for QueryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}://{}", self.authority)?;
        for segment in &self.segments {
            write!(f, "/{}", urlencoding::encode(segment))?;
        }
        for (i, (key, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{}={}", urlencoding::encode(key), urlencoding::encode(value))?;
        }
        Ok(())
    }
}

fn decode(part: &str) -> Result<String, AddressError> {
    urlencoding::decode(part)
        .map(|s| s.into_owned())
        .map_err(|_| AddressError::Encoding(part.to_string()))
}

impl FromStr for QueryAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| AddressError::Scheme(s.to_string()))?;

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };

        let mut parts = location.split('/');
        let authority = parts.next().unwrap_or_default();
        if authority.is_empty() {
            return Err(AddressError::MissingAuthority(s.to_string()));
        }

        let segments = parts
            .filter(|p| !p.is_empty())
            .map(decode)
            .collect::<Result<Vec<_>, _>>()?;

        let mut params = Vec::new();
        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.push((decode(key)?, decode(value)?));
        }

        Ok(Self { authority: authority.to_string(), segments, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_address() {
        let address = QueryAddress::new("com.example.cal", "search")
            .with_param("query", "team sync")
            .with_param("start", 1_700_000_000_000_i64)
            .with_opt_param::<i64>("end", None);

        assert_eq!(
            address.to_string(),
            "content://com.example.cal/search?query=team%20sync&start=1700000000000"
        );
    }

    #[test]
    fn test_parse_address() {
        let address: QueryAddress =
            "content://com.example.cal/search?query=caf%C3%A9&exclude=a%2Cb&allowNetwork=true"
                .parse()
                .unwrap();

        assert_eq!(address.authority(), "com.example.cal");
        assert_eq!(address.first_segment(), Some("search"));
        assert_eq!(address.param("query"), Some("café"));
        assert_eq!(address.param("exclude"), Some("a,b"));
        assert_eq!(address.parse_param::<bool>("allowNetwork"), Some(true));
        assert_eq!(address.param("missing"), None);
    }

    #[test]
    fn test_parse_root_address() {
        let address: QueryAddress = "content://com.example.places".parse().unwrap();
        assert_eq!(address, QueryAddress::root("com.example.places"));
        assert_eq!(address.first_segment(), None);
    }

    #[test]
    fn test_display_then_parse_keeps_nested_path() {
        let address = QueryAddress::new("a.b", "calendar-lists/extra").with_param("k", "v&w");
        let parsed: QueryAddress = address.to_string().parse().unwrap();
        assert_eq!(parsed, address);
        assert_eq!(parsed.segments().len(), 2);
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(matches!(
            "https://example.com/search".parse::<QueryAddress>(),
            Err(AddressError::Scheme(_))
        ));
        assert!(matches!(
            "content:///search".parse::<QueryAddress>(),
            Err(AddressError::MissingAuthority(_))
        ));
    }

    #[test]
    fn test_unparsable_param_is_absent() {
        let address = QueryAddress::new("a", "search").with_param("radius", "far");
        assert_eq!(address.parse_param::<i64>("radius"), None);
    }
}
