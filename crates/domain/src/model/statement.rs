use std::fmt;

use hex::encode as hex_encode;
use sha3::{Digest, Sha3_256};

use crate::error::{DriverError, DriverResult, ErrorCode};
use crate::model::{
    collection::Collection, consistency::Consistency, payload::CustomPayload, result::ResultSet,
    value::Value,
};

/// A query plus its bound values and per-request options.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    query: String,
    values: Vec<Option<Value>>,
    names: Option<Vec<String>>,
    consistency: Option<Consistency>,
    custom_payload: Option<CustomPayload>,
    timestamp: Option<i64>,
    page_size: Option<usize>,
    paging_state: Option<Vec<u8>>,
    keyspace: Option<String>,
}

impl Statement {
    /// Creates a statement expecting exactly `parameter_count` bound values.
    pub fn new(query: impl Into<String>, parameter_count: usize) -> Self {
        Self {
            query: query.into(),
            values: vec![None; parameter_count],
            names: None,
            consistency: None,
            custom_payload: None,
            timestamp: None,
            page_size: None,
            paging_state: None,
            keyspace: None,
        }
    }

    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    pub fn set_consistency(&mut self, consistency: Consistency) {
        self.consistency = Some(consistency);
    }

    /// Binds `value` at `index`. Collections are validated first, so a map
    /// with a dangling key is rejected here rather than at execution.
    pub fn bind(&mut self, index: usize, value: impl Into<Value>) -> DriverResult<()> {
        let value = value.into();
        if let Value::Collection(collection) = &value {
            collection.validate()?;
        }
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or_else(|| DriverError::index_out_of_bounds(index, len))?;
        *slot = Some(value);
        Ok(())
    }

    pub fn bind_null(&mut self, index: usize) -> DriverResult<()> {
        self.bind(index, Value::Null)
    }

    pub fn bind_text(&mut self, index: usize, value: &str) -> DriverResult<()> {
        self.bind(index, value)
    }

    pub fn bind_int(&mut self, index: usize, value: i32) -> DriverResult<()> {
        self.bind(index, value)
    }

    pub fn bind_bigint(&mut self, index: usize, value: i64) -> DriverResult<()> {
        self.bind(index, value)
    }

    pub fn bind_bool(&mut self, index: usize, value: bool) -> DriverResult<()> {
        self.bind(index, value)
    }

    pub fn bind_double(&mut self, index: usize, value: f64) -> DriverResult<()> {
        self.bind(index, value)
    }

    pub fn bind_blob(&mut self, index: usize, value: &[u8]) -> DriverResult<()> {
        self.bind(index, value.to_vec())
    }

    /// Binds a collection value, taking ownership of it.
    pub fn bind_collection(&mut self, index: usize, collection: Collection) -> DriverResult<()> {
        self.bind(index, collection)
    }

    /// Binds every marker carrying `name`. Only statements built from a
    /// prepared statement know their marker names.
    pub fn bind_by_name(&mut self, name: &str, value: impl Into<Value>) -> DriverResult<()> {
        let indices: Vec<usize> = self
            .names
            .iter()
            .flatten()
            .enumerate()
            .filter(|(_, marker)| marker.eq_ignore_ascii_case(name))
            .map(|(index, _)| index)
            .collect();
        if indices.is_empty() {
            return Err(DriverError::name_does_not_exist(name));
        }
        let value = value.into();
        if let Value::Collection(collection) = &value {
            collection.validate()?;
        }
        for index in indices {
            self.bind(index, value.clone())?;
        }
        Ok(())
    }

    pub fn set_custom_payload(&mut self, payload: CustomPayload) {
        self.custom_payload = Some(payload);
    }

    /// Client-side write timestamp in microseconds since the epoch.
    pub fn set_timestamp(&mut self, micros: i64) {
        self.timestamp = Some(micros);
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = Some(page_size.max(1));
    }

    /// Continues paging from where `result` stopped.
    pub fn set_paging_state(&mut self, result: &ResultSet) {
        self.paging_state = result.paging_state().map(<[u8]>::to_vec);
    }

    pub fn set_keyspace(&mut self, keyspace: impl Into<String>) {
        self.keyspace = Some(keyspace.into());
    }

    /// Fails with `LIB_PARAMETER_UNSET` if any declared parameter is unbound.
    pub fn ensure_all_bound(&self) -> DriverResult<()> {
        match self.values.iter().position(Option::is_none) {
            Some(index) => Err(DriverError::new(
                ErrorCode::LibParameterUnset,
                format!("parameter at index {index} was not set"),
            )),
            None => Ok(()),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn parameter_count(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn consistency(&self) -> Option<Consistency> {
        self.consistency
    }

    pub fn custom_payload(&self) -> Option<&CustomPayload> {
        self.custom_payload.as_ref()
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn page_size(&self) -> Option<usize> {
        self.page_size
    }

    pub fn paging_state(&self) -> Option<&[u8]> {
        self.paging_state.as_deref()
    }

    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }
}

/// Server-side identifier of a prepared query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreparedId([u8; 16]);

impl PreparedId {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for PreparedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex_encode(self.0))
    }
}

/// Derives the prepared id from the keyspace and query text so that the same
/// query prepared twice maps to the same id.
pub fn derive_prepared_id(keyspace: Option<&str>, query: &str) -> PreparedId {
    let mut hasher = Sha3_256::new();
    if let Some(keyspace) = keyspace {
        hasher.update(keyspace.as_bytes());
    }
    hasher.update(query.as_bytes());
    let digest = hasher.finalize();
    let mut id = [0u8; 16];
    id.copy_from_slice(&digest[..16]);
    PreparedId(id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    id: PreparedId,
    query: String,
    keyspace: Option<String>,
    parameter_names: Vec<String>,
    result_columns: Vec<String>,
}

impl PreparedStatement {
    pub fn new(
        query: impl Into<String>,
        keyspace: Option<String>,
        parameter_names: Vec<String>,
        result_columns: Vec<String>,
    ) -> Self {
        let query = query.into();
        Self {
            id: derive_prepared_id(keyspace.as_deref(), &query),
            query,
            keyspace,
            parameter_names,
            result_columns,
        }
    }

    /// Creates a fresh statement with one unbound slot per marker.
    pub fn bind(&self) -> Statement {
        let mut statement = Statement::new(self.query.clone(), self.parameter_names.len());
        statement.names = Some(self.parameter_names.clone());
        statement.keyspace = self.keyspace.clone();
        statement
    }

    pub fn id(&self) -> PreparedId {
        self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_names.len()
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn result_columns(&self) -> &[String] {
        &self.result_columns
    }
}
