//! Generic row/column transport.
//!
//! A [`RowSet`] carries typed domain results across the process boundary as
//! an ordered list of column names plus rows of primitive cells. Structured
//! sub-values travel as JSON text in a single cell.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL-style null.
    Null,
    /// Boolean.
    Boolean(bool),
    /// 64-bit integer.
    Integer(i64),
    /// Double.
    Real(f64),
    /// Text.
    Text(String),
}

impl Value {
    /// Encode a structured value as a JSON text cell.
    pub fn json<T: Serialize>(value: &T) -> Self {
        serde_json::to_string(value).map_or(Self::Null, Self::Text)
    }

    /// Whether this cell is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Real(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Ordered columns plus rows of cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Create an empty row set with the given columns.
    pub fn new(columns: &[&str]) -> Self {
        Self { columns: columns.iter().map(|c| (*c).to_string()).collect(), rows: Vec::new() }
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Append a row. Rows whose width does not match the columns are
    /// rejected and `false` is returned.
    pub fn push_row(&mut self, row: Vec<Value>) -> bool {
        if row.len() != self.columns.len() {
            return false;
        }
        self.rows.push(row);
        true
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over rows.
    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row { columns: &self.columns, cells })
    }
}

/// Borrowed view of a single row with typed, by-name accessors.
///
/// Every accessor returns `None` for a missing column, a null cell, or a
/// cell of an incompatible type.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    cells: &'a [Value],
}

impl<'a> Row<'a> {
    fn cell(&self, column: &str) -> Option<&'a Value> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.cells.get(index)
    }

    /// Text cell.
    pub fn text(&self, column: &str) -> Option<&'a str> {
        match self.cell(column)? {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Owned text cell.
    pub fn string(&self, column: &str) -> Option<String> {
        self.text(column).map(str::to_string)
    }

    /// Integer cell.
    pub fn integer(&self, column: &str) -> Option<i64> {
        match self.cell(column)? {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Real cell; integer cells are widened.
    pub fn real(&self, column: &str) -> Option<f64> {
        match self.cell(column)? {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean cell; integer cells follow the 0/1 convention.
    pub fn boolean(&self, column: &str) -> Option<bool> {
        match self.cell(column)? {
            Value::Boolean(v) => Some(*v),
            Value::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Structured cell decoded from its JSON text.
    pub fn json<T: DeserializeOwned>(&self, column: &str) -> Option<T> {
        let text = self.text(column)?;
        match serde_json::from_str(text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(column, error = %e, "Malformed structured cell");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RowSet {
        let mut rows = RowSet::new(&["id", "count", "ratio", "flag", "tags"]);
        assert!(rows.push_row(vec![
            "a".into(),
            Value::Integer(3),
            Value::Real(0.5),
            true.into(),
            Value::json(&vec!["x", "y"]),
        ]));
        rows
    }

    #[test]
    fn test_typed_accessors() {
        let rows = sample();
        let row = rows.iter().next().unwrap();

        assert_eq!(row.text("id"), Some("a"));
        assert_eq!(row.integer("count"), Some(3));
        assert_eq!(row.real("count"), Some(3.0));
        assert_eq!(row.real("ratio"), Some(0.5));
        assert_eq!(row.boolean("flag"), Some(true));
        assert_eq!(row.json::<Vec<String>>("tags"), Some(vec!["x".to_string(), "y".to_string()]));
    }

    #[test]
    fn test_type_mismatch_and_missing_column_are_absent() {
        let rows = sample();
        let row = rows.iter().next().unwrap();

        assert_eq!(row.integer("id"), None);
        assert_eq!(row.text("count"), None);
        assert_eq!(row.text("nope"), None);
        assert_eq!(row.json::<Vec<String>>("id"), None);
    }

    #[test]
    fn test_push_row_rejects_wrong_width() {
        let mut rows = RowSet::new(&["a", "b"]);
        assert!(!rows.push_row(vec![Value::Null]));
        assert!(rows.is_empty());
    }

    #[test]
    fn test_wire_shape() {
        let mut rows = RowSet::new(&["id", "n", "r", "b"]);
        rows.push_row(vec!["x".into(), Value::Integer(7), Value::Real(1.5), Value::Null]);

        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "columns": ["id", "n", "r", "b"], "rows": [["x", 7, 1.5, null]] })
        );

        let back: RowSet = serde_json::from_value(json).unwrap();
        let row = back.iter().next().unwrap();
        assert_eq!(row.integer("n"), Some(7));
        assert_eq!(row.real("r"), Some(1.5));
        assert!(row.text("b").is_none());
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some(4_i64)), Value::Integer(4));
    }
}
