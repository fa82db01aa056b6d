use std::sync::Arc;

use crate::error::{DriverError, DriverResult};
use crate::model::{payload::CustomPayload, value::CqlType, value::Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub data_type: CqlType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[ColumnSpec]>,
    values: Vec<Value>,
}

impl Row {
    pub fn get(&self, index: usize) -> DriverResult<&Value> {
        self.values
            .get(index)
            .ok_or_else(|| DriverError::index_out_of_bounds(index, self.values.len()))
    }

    pub fn get_by_name(&self, name: &str) -> DriverResult<&Value> {
        let index = self
            .columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| DriverError::name_does_not_exist(name))?;
        self.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Rows returned by a query along with their column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    columns: Arc<[ColumnSpec]>,
    rows: Vec<Row>,
    paging_state: Option<Vec<u8>>,
}

impl ResultSet {
    pub fn new(
        columns: Vec<ColumnSpec>,
        rows: Vec<Vec<Value>>,
        paging_state: Option<Vec<u8>>,
    ) -> Self {
        let columns: Arc<[ColumnSpec]> = columns.into();
        let rows = rows
            .into_iter()
            .map(|values| Row {
                columns: Arc::clone(&columns),
                values,
            })
            .collect();
        Self {
            columns,
            rows,
            paging_state,
        }
    }

    /// Result of a statement that returns no rows (writes, DDL).
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), None)
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn first_row(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn rows(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn has_more_pages(&self) -> bool {
        self.paging_state.is_some()
    }

    pub fn paging_state(&self) -> Option<&[u8]> {
        self.paging_state.as_deref()
    }
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// A completed request: the rows it produced plus whatever the node sent
/// back out of band.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    result: ResultSet,
    custom_payload: CustomPayload,
    warnings: Vec<String>,
}

impl Response {
    pub fn new(result: ResultSet, custom_payload: CustomPayload, warnings: Vec<String>) -> Self {
        Self {
            result,
            custom_payload,
            warnings,
        }
    }

    pub fn result(&self) -> &ResultSet {
        &self.result
    }

    pub fn into_result(self) -> ResultSet {
        self.result
    }

    pub fn custom_payload(&self) -> &CustomPayload {
        &self.custom_payload
    }

    pub fn custom_payload_item_count(&self) -> usize {
        self.custom_payload.len()
    }

    pub fn custom_payload_item(&self, index: usize) -> DriverResult<(&str, &[u8])> {
        self.custom_payload.item(index)
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}
