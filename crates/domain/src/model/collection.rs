use std::{fmt, slice};

use strum_macros::Display;

use crate::error::{DriverError, DriverResult};
use crate::model::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CollectionKind {
    List,
    Set,
    Map,
}

/// Append-only list, set or map value. Maps take keys and values as
/// alternating appends.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    kind: CollectionKind,
    items: Vec<Value>,
}

pub type CollectionIter<'a> = slice::Iter<'a, Value>;

impl Collection {
    /// Creates an empty collection sized for `item_count` elements (entries
    /// for maps). The size is a hint; appending past it grows the collection.
    pub fn new(kind: CollectionKind, item_count: usize) -> Self {
        let capacity = match kind {
            CollectionKind::Map => item_count.saturating_mul(2),
            _ => item_count,
        };
        Self {
            kind,
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn list(item_count: usize) -> Self {
        Self::new(CollectionKind::List, item_count)
    }

    pub fn set(item_count: usize) -> Self {
        Self::new(CollectionKind::Set, item_count)
    }

    pub fn map(item_count: usize) -> Self {
        Self::new(CollectionKind::Map, item_count)
    }

    /// Builds a collection from already validated items.
    pub fn from_items(kind: CollectionKind, items: Vec<Value>) -> Self {
        Self { kind, items }
    }

    pub fn append(&mut self, value: impl Into<Value>) -> DriverResult<()> {
        let value = value.into();
        if value.is_null() {
            return Err(DriverError::bad_params(
                "collections cannot contain null elements",
            ));
        }
        self.items.push(value);
        Ok(())
    }

    pub fn append_text(&mut self, value: &str) -> DriverResult<()> {
        self.append(value)
    }

    pub fn append_int(&mut self, value: i32) -> DriverResult<()> {
        self.append(value)
    }

    pub fn append_bigint(&mut self, value: i64) -> DriverResult<()> {
        self.append(value)
    }

    pub fn append_bool(&mut self, value: bool) -> DriverResult<()> {
        self.append(value)
    }

    pub fn append_double(&mut self, value: f64) -> DriverResult<()> {
        self.append(value)
    }

    pub fn append_blob(&mut self, value: &[u8]) -> DriverResult<()> {
        self.append(value.to_vec())
    }

    /// Checks the collection is well formed before it is bound.
    pub fn validate(&self) -> DriverResult<()> {
        if self.kind == CollectionKind::Map && self.items.len() % 2 != 0 {
            return Err(DriverError::bad_params(format!(
                "map collection has a key without a value ({} items appended)",
                self.items.len()
            )));
        }
        self.items.iter().try_for_each(|item| match item {
            Value::Collection(nested) => nested.validate(),
            _ => Ok(()),
        })
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Number of appended items (keys and values both count for maps).
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> CollectionIter<'_> {
        self.items.iter()
    }

    /// Key/value pairs of a map collection.
    pub fn entries(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.items
            .chunks_exact(2)
            .map(|pair| (&pair[0], &pair[1]))
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Value;
    type IntoIter = CollectionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, close) = match self.kind {
            CollectionKind::List => ('[', ']'),
            CollectionKind::Set | CollectionKind::Map => ('{', '}'),
        };
        write!(f, "{open}")?;
        if self.kind == CollectionKind::Map {
            for (index, (key, value)) in self.entries().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{key}: {value}")?;
            }
        } else {
            for (index, value) in self.items.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{value}")?;
            }
        }
        write!(f, "{close}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn grows_past_declared_size() {
        let mut set = Collection::set(2);
        for item in ["apple", "orange", "banana", "mango"] {
            set.append_text(item).unwrap();
        }
        assert_eq!(set.len(), 4);
        let items: Vec<_> = set.iter().map(|v| v.as_text().unwrap()).collect();
        assert_eq!(items, ["apple", "orange", "banana", "mango"]);
    }

    #[test]
    fn rejects_null_elements() {
        let mut list = Collection::list(1);
        let err = list.append(Value::Null).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LibBadParams);
        assert!(list.is_empty());
    }

    #[test]
    fn map_requires_complete_entries() {
        let mut map = Collection::map(1);
        map.append_text("k").unwrap();
        assert!(map.validate().is_err());
        map.append_int(7).unwrap();
        assert!(map.validate().is_ok());
        assert_eq!(map.to_string(), "{k: 7}");
    }

    #[test]
    fn nested_maps_are_validated() {
        let mut inner = Collection::map(1);
        inner.append_text("k").unwrap();
        let mut outer = Collection::list(1);
        outer.append(inner).unwrap();
        assert_eq!(outer.validate().unwrap_err().code(), ErrorCode::LibBadParams);
    }
}
