//! Records: the dynamic form of an entity instance.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::row::Row;
use crate::value::{FromValue, Value};

/// Column values plus loaded relations.
///
/// Typed entities convert to and from records; the execution engine only ever
/// works with records, so untyped tables and typed entities share one path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Column values.
    pub values: Row,
    /// Loaded relations by relationship name, in load order.
    pub relations: Vec<(String, Vec<Record>)>,
}

impl Record {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record wrapping a row with no relations.
    pub fn from_row(values: Row) -> Self {
        Self {
            values,
            relations: Vec::new(),
        }
    }

    /// Raw column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Column value, NULL when missing.
    pub fn get_or_null(&self, column: &str) -> Value {
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    /// Typed column value.
    pub fn get_named<T: FromValue>(&self, column: &str) -> Result<T> {
        self.values.get_named(column)
    }

    /// Typed column value, or `T::default()` when the column is absent.
    ///
    /// A present column that fails to convert is still an error.
    pub fn get_or_default<T: FromValue + Default>(&self, column: &str) -> Result<T> {
        if self.values.contains(column) {
            self.values.get_named(column)
        } else {
            Ok(T::default())
        }
    }

    /// Set a column value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.set(column, value);
    }

    /// Copy every column of `other` onto this record.
    pub fn merge_values(&mut self, other: Row) {
        for (column, value) in other.into_pairs() {
            self.values.set(column, value);
        }
    }

    /// Loaded relation by name.
    pub fn relation(&self, name: &str) -> Option<&[Record]> {
        self.relations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, records)| records.as_slice())
    }

    /// Mutable loaded relation by name.
    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Vec<Record>> {
        self.relations
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, records)| records)
    }

    /// Replace (or add) a loaded relation.
    pub fn set_relation(&mut self, name: impl Into<String>, records: Vec<Record>) {
        let name = name.into();
        match self.relation_mut(&name) {
            Some(existing) => *existing = records,
            None => self.relations.push((name, records)),
        }
    }

    /// Remove a loaded relation.
    pub fn take_relation(&mut self, name: &str) -> Option<Vec<Record>> {
        let i = self.relations.iter().position(|(n, _)| n == name)?;
        Some(self.relations.remove(i).1)
    }

    /// Render as a JSON object (columns plus nested relations).
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (column, value) in self.values.iter() {
            map.insert(column.to_string(), value_to_json(value));
        }
        for (name, records) in &self.relations {
            let nested = records.iter().map(Record::to_json).collect();
            map.insert(name.clone(), serde_json::Value::Array(nested));
        }
        serde_json::Value::Object(map)
    }
}

impl From<Row> for Record {
    fn from(values: Row) -> Self {
        Self::from_row(values)
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::BigInt(i) => serde_json::Value::from(*i),
        Value::Double(f) => serde_json::Value::from(*f),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::from(b.clone()),
        Value::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
    }
}

/// Shapes that can be built from a record.
///
/// Implemented by every `#[derive(Entity)]` type, by `#[derive(FromRecord)]`
/// result shapes (aggregations, projections) and by `Record` itself.
pub trait FromRecord: Sized {
    /// Build from a record.
    fn from_record(record: &Record) -> Result<Self>;
}

impl FromRecord for Record {
    fn from_record(record: &Record) -> Result<Self> {
        Ok(record.clone())
    }
}

impl FromRecord for Row {
    fn from_record(record: &Record) -> Result<Self> {
        Ok(record.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relations() {
        let mut user = Record::new();
        user.set("id", "1");
        let mut wallet = Record::new();
        wallet.set("balance", 1_000_000_i64);

        assert!(user.relation("wallet").is_none());
        user.set_relation("wallet", vec![wallet.clone()]);
        user.set_relation("wallet", vec![wallet]);
        assert_eq!(user.relations.len(), 1);
        assert_eq!(
            user.relation("wallet").unwrap()[0]
                .get_named::<i64>("balance")
                .unwrap(),
            1_000_000
        );
        assert!(user.take_relation("wallet").is_some());
        assert!(user.relations.is_empty());
    }

    #[test]
    fn test_get_or_default() {
        let mut rec = Record::new();
        rec.set("price", Value::Null);
        assert_eq!(rec.get_or_default::<String>("name").unwrap(), "");
        assert!(rec.get_or_default::<i64>("price").is_err());
    }

    #[test]
    fn test_to_json() {
        let mut rec = Record::new();
        rec.set("id", "P1");
        rec.set("price", 100_i64);
        rec.set_relation("liked_by_users", Vec::new());
        let json = rec.to_json();
        assert_eq!(json["id"], "P1");
        assert_eq!(json["price"], 100);
        assert!(json["liked_by_users"].as_array().unwrap().is_empty());
    }
}
