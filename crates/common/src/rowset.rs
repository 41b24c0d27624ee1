//! Schema-free records and the ordered row sets built from them.

use std::collections::HashSet;

use serde_json::{Map, Value};

/// One parsed unit of input: field name to value, in source order.
pub type Record = Map<String, Value>;

static NULL: Value = Value::Null;

/// An ordered sequence of records sharing one column list.
///
/// Columns are the union of every record's keys in first-seen order, so
/// heterogeneous JSON lines still produce a stable schema. A record that
/// lacks a column reads as `null` in that position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    seen: HashSet<String>,
    records: Vec<Record>,
}

impl RowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A row set with a fixed leading column order, e.g. a CSV header.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rows = Self::new();
        for column in columns {
            rows.add_column(column.into());
        }
        rows
    }

    fn add_column(&mut self, column: String) {
        if self.seen.insert(column.clone()) {
            self.columns.push(column);
        }
    }

    pub fn push(&mut self, record: Record) {
        for key in record.keys() {
            if !self.seen.contains(key) {
                self.add_column(key.clone());
            }
        }
        self.records.push(record);
    }

    pub fn extend(&mut self, other: RowSet) {
        for record in other.records {
            self.push(record);
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Values of one record laid out in column order.
    pub fn row_values<'a>(&'a self, record: &'a Record) -> Vec<&'a Value> {
        self.columns
            .iter()
            .map(|column| record.get(column).unwrap_or(&NULL))
            .collect()
    }

    /// Every record laid out in column order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> + '_ {
        self.records.iter().map(move |record| self.row_values(record))
    }
}

impl FromIterator<Record> for RowSet {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        let mut rows = RowSet::new();
        for record in iter {
            rows.push(record);
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_columns_follow_first_seen_order() {
        let rows: RowSet = vec![
            record(json!({"id": 1, "score": 0.5})),
            record(json!({"label": "b", "id": 2})),
            record(json!({"score": 0.9, "extra": true})),
        ]
        .into_iter()
        .collect();

        assert_eq!(rows.columns(), ["id", "score", "label", "extra"]);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_missing_fields_read_as_null() {
        let mut rows = RowSet::with_columns(["a", "b"]);
        rows.push(record(json!({"b": 2})));

        let laid_out: Vec<Vec<&Value>> = rows.rows().collect();
        assert_eq!(laid_out, vec![vec![&Value::Null, &json!(2)]]);
    }

    #[test]
    fn test_extend_merges_columns() {
        let mut left: RowSet = vec![record(json!({"a": 1}))].into_iter().collect();
        let right: RowSet = vec![record(json!({"b": 2}))].into_iter().collect();
        left.extend(right);

        assert_eq!(left.columns(), ["a", "b"]);
        assert_eq!(left.len(), 2);
    }
}
