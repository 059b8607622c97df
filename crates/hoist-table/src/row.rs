//! The flat row model: a key pair plus named, typed properties.

use std::collections::BTreeMap;

/// A single typed property value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Property {
    String(String),
    Int64(i64),
    Bool(bool),
}

impl Property {
    /// Approximate encoded size, used for backend size limits.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::String(s) => s.len(),
            Self::Int64(_) => 8,
            Self::Bool(_) => 1,
        }
    }
}

impl From<String> for Property {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Property {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for Property {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<bool> for Property {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One row of a table.
///
/// `etag` is an opaque concurrency token assigned by the backend on every
/// write. Callers never construct one; it is `None` on rows about to be
/// written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub partition_key: String,
    pub row_key: String,
    pub etag: Option<String>,
    pub properties: BTreeMap<String, Property>,
}

impl Row {
    /// An empty row at the given address.
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            etag: None,
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: &str, value: impl Into<Property>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Property>) {
        self.properties.insert(name.to_string(), value.into());
    }

    /// Set the property when `value` is `Some`, leave it absent otherwise.
    pub fn set_opt<V: Into<Property>>(&mut self, name: &str, value: Option<V>) {
        if let Some(value) = value {
            self.set(name, value);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Property> {
        self.properties.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// String property, `None` if absent or of another type.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.properties.get(name) {
            Some(Property::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.properties.get(name) {
            Some(Property::Int64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.properties.get(name) {
            Some(Property::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Approximate encoded size of keys and properties.
    pub fn encoded_len(&self) -> usize {
        self.partition_key.len()
            + self.row_key.len()
            + self
                .properties
                .iter()
                .map(|(name, value)| name.len() + value.encoded_len())
                .sum::<usize>()
    }
}
