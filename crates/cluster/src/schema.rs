//! Keyspace/table catalog and the rows each table holds.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};

use cqlkit_domain::{CqlType, DriverError, DriverResult, ErrorCode, Value};

use crate::cql::ColumnDefinition;

pub const SYSTEM_KEYSPACE: &str = "system";
pub const LOCAL_TABLE: &str = "local";

#[derive(Debug, Default)]
pub struct Catalog {
    keyspaces: BTreeMap<String, Keyspace>,
}

#[derive(Debug)]
pub struct Keyspace {
    replication_factor: usize,
    tables: BTreeMap<String, Table>,
}

impl Keyspace {
    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }
}

impl Catalog {
    pub fn keyspace(&self, name: &str) -> DriverResult<&Keyspace> {
        self.keyspaces
            .get(name)
            .ok_or_else(|| DriverError::invalid_query(format!("Keyspace '{name}' does not exist")))
    }

    pub fn create_keyspace(
        &mut self,
        name: &str,
        replication_factor: usize,
        if_not_exists: bool,
    ) -> DriverResult<bool> {
        if self.keyspaces.contains_key(name) {
            if if_not_exists {
                return Ok(false);
            }
            return Err(DriverError::new(
                ErrorCode::ServerAlreadyExists,
                format!("Cannot add existing keyspace \"{name}\""),
            ));
        }
        self.keyspaces.insert(
            name.to_string(),
            Keyspace {
                replication_factor,
                tables: BTreeMap::new(),
            },
        );
        Ok(true)
    }

    pub fn drop_keyspace(&mut self, name: &str, if_exists: bool) -> DriverResult<bool> {
        if name == SYSTEM_KEYSPACE {
            return Err(DriverError::invalid_query(
                "system keyspace is not user-modifiable",
            ));
        }
        match self.keyspaces.remove(name) {
            Some(_) => Ok(true),
            None if if_exists => Ok(false),
            None => Err(DriverError::invalid_query(format!(
                "Cannot drop non existing keyspace '{name}'"
            ))),
        }
    }

    pub fn create_table(
        &mut self,
        keyspace: &str,
        name: &str,
        columns: Vec<ColumnDefinition>,
        partition_key: &str,
        if_not_exists: bool,
    ) -> DriverResult<bool> {
        let ks = self.keyspace_mut(keyspace)?;
        if ks.tables.contains_key(name) {
            if if_not_exists {
                return Ok(false);
            }
            return Err(DriverError::new(
                ErrorCode::ServerAlreadyExists,
                format!("Cannot add already existing table \"{name}\" to keyspace \"{keyspace}\""),
            ));
        }

        for (index, column) in columns.iter().enumerate() {
            if columns[..index].iter().any(|other| other.name == column.name) {
                return Err(DriverError::invalid_query(format!(
                    "Multiple definition of identifier {}",
                    column.name
                )));
            }
        }
        let key = columns
            .iter()
            .find(|column| column.name == partition_key)
            .ok_or_else(|| {
                DriverError::invalid_query(format!(
                    "Unknown definition {partition_key} referenced in PRIMARY KEY"
                ))
            })?;
        if key.data_type.is_collection() {
            return Err(DriverError::invalid_query(format!(
                "Invalid collection type for PRIMARY KEY component {partition_key}"
            )));
        }

        ks.tables.insert(
            name.to_string(),
            Table {
                keyspace: keyspace.to_string(),
                name: name.to_string(),
                columns,
                partition_key: partition_key.to_string(),
                partitions: BTreeMap::new(),
            },
        );
        Ok(true)
    }

    pub fn drop_table(&mut self, keyspace: &str, name: &str, if_exists: bool) -> DriverResult<bool> {
        if keyspace == SYSTEM_KEYSPACE {
            return Err(DriverError::invalid_query(
                "system keyspace is not user-modifiable",
            ));
        }
        let ks = self.keyspace_mut(keyspace)?;
        match ks.tables.remove(name) {
            Some(_) => Ok(true),
            None if if_exists => Ok(false),
            None => Err(DriverError::invalid_query(format!(
                "Cannot drop non existing table '{name}' in keyspace '{keyspace}'"
            ))),
        }
    }

    pub fn table(&self, keyspace: &str, name: &str) -> DriverResult<&Table> {
        self.keyspace(keyspace)?
            .tables
            .get(name)
            .ok_or_else(|| unconfigured_table(keyspace, name))
    }

    pub fn table_mut(&mut self, keyspace: &str, name: &str) -> DriverResult<&mut Table> {
        self.keyspace_mut(keyspace)?
            .tables
            .get_mut(name)
            .ok_or_else(|| unconfigured_table(keyspace, name))
    }

    fn keyspace_mut(&mut self, name: &str) -> DriverResult<&mut Keyspace> {
        self.keyspaces
            .get_mut(name)
            .ok_or_else(|| DriverError::invalid_query(format!("Keyspace '{name}' does not exist")))
    }
}

fn unconfigured_table(keyspace: &str, name: &str) -> DriverError {
    DriverError::invalid_query(format!("unconfigured table {keyspace}.{name}"))
}

/// Partition key wrapper ordering values the way partitions are scanned.
#[derive(Debug, Clone)]
pub struct PartitionKey(Value);

impl PartialEq for PartitionKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PartitionKey {}

impl PartialOrd for PartitionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PartitionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cql_cmp(&other.0)
    }
}

#[derive(Debug, Clone)]
struct Cell {
    value: Value,
    timestamp: i64,
}

#[derive(Debug, Default)]
pub struct StoredRow {
    cells: HashMap<String, Cell>,
}

impl StoredRow {
    /// Current value of `column`; unwritten cells and tombstones read as null.
    pub fn value(&self, column: &str) -> Value {
        self.cells
            .get(column)
            .map(|cell| cell.value.clone())
            .unwrap_or(Value::Null)
    }
}

#[derive(Debug)]
pub struct Table {
    keyspace: String,
    name: String,
    columns: Vec<ColumnDefinition>,
    partition_key: String,
    partitions: BTreeMap<PartitionKey, StoredRow>,
}

impl Table {
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn column_type(&self, name: &str) -> DriverResult<&CqlType> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| &column.data_type)
            .ok_or_else(|| DriverError::invalid_query(format!("Undefined column name {name}")))
    }

    /// Writes cells for the partition `key`. A cell is replaced only when the
    /// incoming timestamp is not older than the stored one.
    pub fn upsert(&mut self, key: Value, cells: Vec<(String, Value)>, timestamp: i64) {
        let row = self.partitions.entry(PartitionKey(key.clone())).or_default();
        row.cells.insert(
            self.partition_key.clone(),
            Cell {
                value: key,
                timestamp,
            },
        );
        for (column, value) in cells {
            match row.cells.get_mut(&column) {
                Some(cell) if cell.timestamp > timestamp => {}
                Some(cell) => {
                    cell.value = value;
                    cell.timestamp = timestamp;
                }
                None => {
                    row.cells.insert(column, Cell { value, timestamp });
                }
            }
        }
    }

    pub fn row(&self, key: &Value) -> Option<&StoredRow> {
        self.partitions.get(&PartitionKey(key.clone()))
    }

    pub fn rows(&self) -> impl Iterator<Item = &StoredRow> {
        self.partitions.values()
    }
}
