use std::{cmp::Ordering, fmt};

use crate::error::{DriverError, DriverResult};
use crate::model::collection::{Collection, CollectionIter, CollectionKind};

/// Column types understood by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CqlType {
    Text,
    Int,
    BigInt,
    Boolean,
    Double,
    Blob,
    List(Box<CqlType>),
    Set(Box<CqlType>),
    Map(Box<CqlType>, Box<CqlType>),
}

impl CqlType {
    pub fn is_collection(&self) -> bool {
        matches!(self, CqlType::List(_) | CqlType::Set(_) | CqlType::Map(_, _))
    }

    /// Maps a native type name (as written in CQL) to its type.
    pub fn from_native_name(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "text" | "varchar" | "ascii" => CqlType::Text,
            "int" => CqlType::Int,
            "bigint" | "counter" => CqlType::BigInt,
            "boolean" => CqlType::Boolean,
            "double" => CqlType::Double,
            "blob" => CqlType::Blob,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for CqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlType::Text => f.write_str("text"),
            CqlType::Int => f.write_str("int"),
            CqlType::BigInt => f.write_str("bigint"),
            CqlType::Boolean => f.write_str("boolean"),
            CqlType::Double => f.write_str("double"),
            CqlType::Blob => f.write_str("blob"),
            CqlType::List(item) => write!(f, "list<{item}>"),
            CqlType::Set(item) => write!(f, "set<{item}>"),
            CqlType::Map(key, value) => write!(f, "map<{key}, {value}>"),
        }
    }
}

/// A single CQL value, either bound to a statement or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i32),
    BigInt(i64),
    Boolean(bool),
    Double(f64),
    Blob(Vec<u8>),
    Collection(Collection),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Int(_) => "int",
            Value::BigInt(_) => "bigint",
            Value::Boolean(_) => "boolean",
            Value::Double(_) => "double",
            Value::Blob(_) => "blob",
            Value::Collection(collection) => match collection.kind() {
                CollectionKind::List => "list",
                CollectionKind::Set => "set",
                CollectionKind::Map => "map",
            },
        }
    }

    pub fn as_text(&self) -> DriverResult<&str> {
        match self {
            Value::Text(value) => Ok(value),
            other => Err(DriverError::invalid_value_type("text", other.type_name())),
        }
    }

    pub fn as_int(&self) -> DriverResult<i32> {
        match self {
            Value::Int(value) => Ok(*value),
            other => Err(DriverError::invalid_value_type("int", other.type_name())),
        }
    }

    pub fn as_bigint(&self) -> DriverResult<i64> {
        match self {
            Value::BigInt(value) => Ok(*value),
            other => Err(DriverError::invalid_value_type("bigint", other.type_name())),
        }
    }

    pub fn as_bool(&self) -> DriverResult<bool> {
        match self {
            Value::Boolean(value) => Ok(*value),
            other => Err(DriverError::invalid_value_type("boolean", other.type_name())),
        }
    }

    pub fn as_double(&self) -> DriverResult<f64> {
        match self {
            Value::Double(value) => Ok(*value),
            other => Err(DriverError::invalid_value_type("double", other.type_name())),
        }
    }

    pub fn as_blob(&self) -> DriverResult<&[u8]> {
        match self {
            Value::Blob(value) => Ok(value),
            other => Err(DriverError::invalid_value_type("blob", other.type_name())),
        }
    }

    pub fn as_collection(&self) -> DriverResult<&Collection> {
        match self {
            Value::Collection(collection) => Ok(collection),
            other => Err(DriverError::invalid_value_type(
                "collection",
                other.type_name(),
            )),
        }
    }

    /// Iterates the elements of a collection-valued column. Map values yield
    /// keys and values alternately.
    pub fn items(&self) -> DriverResult<CollectionIter<'_>> {
        self.as_collection().map(Collection::iter)
    }

    /// Returns `true` when the value can be stored in a column of `ty`.
    /// Null fits every type.
    pub fn fits(&self, ty: &CqlType) -> bool {
        match (self, ty) {
            (Value::Null, _) => true,
            (Value::Text(_), CqlType::Text)
            | (Value::Int(_), CqlType::Int)
            | (Value::BigInt(_), CqlType::BigInt)
            | (Value::Boolean(_), CqlType::Boolean)
            | (Value::Double(_), CqlType::Double)
            | (Value::Blob(_), CqlType::Blob) => true,
            (Value::Collection(collection), CqlType::List(item))
                if collection.kind() == CollectionKind::List =>
            {
                collection.iter().all(|value| value.fits(item))
            }
            (Value::Collection(collection), CqlType::Set(item))
                if collection.kind() == CollectionKind::Set =>
            {
                collection.iter().all(|value| value.fits(item))
            }
            (Value::Collection(collection), CqlType::Map(key, value))
                if collection.kind() == CollectionKind::Map =>
            {
                collection.len() % 2 == 0
                    && collection
                        .entries()
                        .all(|(k, v)| k.fits(key) && v.fits(value))
            }
            _ => false,
        }
    }

    /// Total order used for clustering partitions and sorting set/map
    /// elements. Values of different types order by type first.
    pub fn cql_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::BigInt(a), Value::BigInt(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::Collection(a), Value::Collection(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    let ordering = left.cql_cmp(right);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int(_) => 2,
            Value::BigInt(_) => 3,
            Value::Double(_) => 4,
            Value::Text(_) => 5,
            Value::Blob(_) => 6,
            Value::Collection(_) => 7,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Text(value) => f.write_str(value),
            Value::Int(value) => write!(f, "{value}"),
            Value::BigInt(value) => write!(f, "{value}"),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::Blob(value) => write!(f, "0x{}", hex::encode(value)),
            Value::Collection(collection) => write!(f, "{collection}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::BigInt(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<Collection> for Value {
    fn from(value: Collection) -> Self {
        Value::Collection(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
