use std::fmt;

use crate::record::Record;
use crate::value::{RecordId, Value};

static NULL: Value = Value::Null;

/// One result row: ordered column name to value, plus the id of the record it
/// came from when there is exactly one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    record_id: Option<RecordId>,
    columns: Vec<(String, Value)>,
}

impl Row {
    pub(crate) fn new(record_id: Option<RecordId>) -> Self {
        Self {
            record_id,
            columns: Vec::new(),
        }
    }

    /// Every property of `record`, in field name order.
    pub(crate) fn from_record(record: &Record) -> Self {
        let mut row = Self::new(Some(record.id));
        row.columns = record
            .properties
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        row
    }

    pub(crate) fn push(&mut self, name: String, value: Value) {
        self.columns.push((name, value));
    }

    /// Adds the column unless a column of that name is already present.
    pub(crate) fn push_absent(&mut self, name: &str, value: &Value) {
        if self.get(name).is_none() {
            self.columns.push((name.to_string(), value.clone()));
        }
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Like [`Row::get`] but a missing column reads as null.
    pub fn value(&self, column: &str) -> &Value {
        self.get(column).unwrap_or(&NULL)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        if let Some(id) = self.record_id {
            object.insert("@rid".to_string(), serde_json::Value::String(id.to_string()));
        }
        for (name, value) in &self.columns {
            object.insert(name.clone(), value.to_json());
        }
        serde_json::Value::Object(object)
    }
}

/// Lazily produced query rows.
pub struct ResultSet {
    rows: Box<dyn Iterator<Item = Row> + Send>,
}

impl ResultSet {
    pub(crate) fn new<I>(rows: I) -> Self
    where
        I: Iterator<Item = Row> + Send + 'static,
    {
        Self {
            rows: Box::new(rows),
        }
    }

    pub(crate) fn from_rows(rows: Vec<Row>) -> Self {
        Self::new(rows.into_iter())
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.collect()
    }
}

impl Iterator for ResultSet {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet").finish_non_exhaustive()
    }
}
