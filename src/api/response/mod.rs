pub mod device_info;
pub mod fast_poll;
pub mod historic;
pub mod periodic;
pub mod startup;
pub mod switch_group;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A single keyed field of a device payload.
///
/// The device omits fields, sends `null` for unset ones and occasionally sends a shape nobody
/// expects. None of those may fail the surrounding structure, so deserialization of a `Field`
/// itself never fails: a value that does not fit `T` is logged and becomes `Invalid`.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Absent,
    Null,
    Invalid,
    Present(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Field::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Field<T> {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(d)?;

        if value.is_null() {
            return Ok(Field::Null);
        }

        match serde_json::from_value::<T>(value) {
            Ok(v) => Ok(Field::Present(v)),
            Err(e) => {
                log::warn!(
                    "Skipping malformed field (expected {}): {}",
                    std::any::type_name::<T>(),
                    e
                );
                Ok(Field::Invalid)
            }
        }
    }
}

/// Positional table the device sends either as a JSON array or as an object keyed by decimal
/// indices. `null` slots are treated as unset; malformed entries are dropped one by one.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseTable<T>(BTreeMap<usize, T>);

impl<T> Default for SparseTable<T> {
    fn default() -> Self {
        SparseTable(BTreeMap::new())
    }
}

impl<T> SparseTable<T> {
    pub fn get(&self, index: usize) -> Option<&T> {
        self.0.get(&index)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }
}

impl<T> FromIterator<(usize, T)> for SparseTable<T> {
    fn from_iter<I: IntoIterator<Item = (usize, T)>>(iter: I) -> Self {
        SparseTable(iter.into_iter().collect())
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for SparseTable<T> {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let entries: Vec<(String, Value)> = match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            Value::Object(map) => map.into_iter().collect(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected array or object, got {}",
                    other
                )))
            }
        };

        let mut table = BTreeMap::new();
        for (key, value) in entries {
            let index = match key.trim().parse::<usize>() {
                Ok(index) => index,
                Err(_) => {
                    log::debug!("Ignoring non-positional table key {:?}", key);
                    continue;
                }
            };
            if value.is_null() {
                continue;
            }
            match serde_json::from_value::<T>(value) {
                Ok(entry) => {
                    table.insert(index, entry);
                }
                Err(e) => log::warn!("Skipping malformed table entry {}: {}", index, e),
            }
        }

        Ok(SparseTable(table))
    }
}

/// Lenient integer coercion: numbers (fractions truncated), numeric strings and booleans.
pub fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Absent, `null` and non-numeric values all publish as 0.
pub fn int_or_zero(value: Option<&Value>) -> i64 {
    value.and_then(to_i64).unwrap_or(0)
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Positional lookup in a table that may arrive as an array or as an index-keyed object.
pub fn at(value: &Value, index: usize) -> Option<&Value> {
    match value {
        Value::Array(items) => items.get(index),
        Value::Object(map) => map.get(&index.to_string()),
        _ => None,
    }
}

/// Value rendered without JSON quoting, `null` as the empty string.
pub fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
