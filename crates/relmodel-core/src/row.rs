//! Ordered column/value rows.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{FromValue, Value};

/// An ordered mapping of column name to value.
///
/// Rows come back from the driver in SELECT order and are also used to carry
/// the column values of an entity instance. Setting an existing column
/// replaces its value in place; new columns are appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from parallel column and value vectors.
    ///
    /// Extra values or columns past the shorter of the two are dropped.
    pub fn from_parts(columns: Vec<String>, mut values: Vec<Value>) -> Self {
        let mut columns = columns;
        let len = columns.len().min(values.len());
        columns.truncate(len);
        values.truncate(len);
        Self { columns, values }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Position of a column.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Whether the row carries a column.
    pub fn contains(&self, column: &str) -> bool {
        self.index_of(column).is_some()
    }

    /// Raw value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.index_of(column).map(|i| &self.values[i])
    }

    /// Raw value by position.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed value by column name.
    pub fn get_named<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self
            .get(column)
            .ok_or_else(|| Error::Mapping(format!("column `{}` not found in row", column)))?;
        T::from_value(value)
            .map_err(|e| Error::Mapping(format!("column `{}`: {}", column, mapping_detail(&e))))
    }

    /// Typed value by position.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).ok_or_else(|| {
            Error::Mapping(format!(
                "column index {} out of range ({} columns)",
                index,
                self.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Set a column, replacing an existing value or appending.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.index_of(&column) {
            Some(i) => self.values[i] = value,
            None => {
                self.columns.push(column);
                self.values.push(value);
            }
        }
    }

    /// Remove a column, returning its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let i = self.index_of(column)?;
        self.columns.remove(i);
        Some(self.values.remove(i))
    }

    /// Iterate `(column, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Consume the row into `(column, value)` pairs.
    pub fn into_pairs(self) -> Vec<(String, Value)> {
        self.columns.into_iter().zip(self.values).collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.set(k, v);
        }
        row
    }
}

fn mapping_detail(err: &Error) -> String {
    match err {
        Error::Mapping(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let mut row = Row::new();
        row.set("id", "1");
        row.set("name", "Eko");
        row.set("id", "2");
        assert_eq!(row.columns(), &["id".to_string(), "name".to_string()]);
        assert_eq!(row.get_named::<String>("id").unwrap(), "2");
    }

    #[test]
    fn test_get_named_errors() {
        let row: Row = [("balance", Value::Null)].into_iter().collect();
        let err = row.get_named::<i64>("balance").unwrap_err();
        assert!(err.to_string().contains("balance"));
        assert!(row.get_named::<i64>("missing").is_err());
        assert_eq!(row.get_named::<Option<i64>>("balance").unwrap(), None);
    }

    #[test]
    fn test_from_parts_truncates() {
        let row = Row::from_parts(
            vec!["a".into(), "b".into()],
            vec![Value::BigInt(1)],
        );
        assert_eq!(row.len(), 1);
        assert_eq!(row.get_as::<i64>(0).unwrap(), 1);
    }
}
