//! Executes parsed statements against the schema catalog.

use std::cmp::Ordering;

use cqlkit_domain::{
    Collection, CollectionKind, ColumnSpec, Consistency, CqlType, DriverError, DriverResult,
    ErrorCode, ResultSet, Statement, Value,
};
use tracing::{debug, info};

use crate::{
    cql::{ColumnDefinition, CqlStatement, Literal, ParsedQuery, Restriction, Selection, TableRef, Term},
    schema::{Catalog, StoredRow, Table, SYSTEM_KEYSPACE},
};

/// Per-request inputs the executor needs besides the statement itself.
#[derive(Debug, Clone)]
pub struct ExecutionContext<'a> {
    pub values: &'a [Value],
    pub keyspace: Option<&'a str>,
    pub consistency: Consistency,
    pub live_nodes: usize,
    pub timestamp: i64,
    pub page_size: Option<usize>,
    pub paging_state: Option<&'a [u8]>,
}

#[derive(Debug)]
pub enum Outcome {
    Rows(ResultSet),
    Void,
    KeyspaceChanged(String),
    SchemaChanged,
}

impl Outcome {
    pub fn into_result_set(self) -> ResultSet {
        match self {
            Outcome::Rows(rows) => rows,
            _ => ResultSet::empty(),
        }
    }
}

/// Checks a statement's bound values against the query's bind markers and
/// returns them in marker order.
pub fn bind_values(parsed: &ParsedQuery, statement: &Statement) -> DriverResult<Vec<Value>> {
    statement.ensure_all_bound()?;
    if parsed.markers.len() != statement.parameter_count() {
        return Err(DriverError::invalid_query(format!(
            "Invalid amount of bind variables: expected {}, got {}",
            parsed.markers.len(),
            statement.parameter_count()
        )));
    }
    Ok(statement.values().iter().flatten().cloned().collect())
}

/// Statements that only need shared access to the catalog.
pub fn is_read_only(statement: &CqlStatement) -> bool {
    matches!(statement, CqlStatement::Select { .. } | CqlStatement::Use { .. })
}

pub fn execute_read(
    catalog: &Catalog,
    statement: &CqlStatement,
    ctx: &ExecutionContext<'_>,
) -> DriverResult<Outcome> {
    match statement {
        CqlStatement::Select {
            table,
            selection,
            restrictions,
            limit,
        } => select(catalog, table, selection, restrictions, limit.as_ref(), ctx).map(Outcome::Rows),
        CqlStatement::Use { keyspace } => {
            catalog.keyspace(keyspace)?;
            Ok(Outcome::KeyspaceChanged(keyspace.clone()))
        }
        _ => Err(DriverError::invalid_query(format!(
            "{} statements modify the schema or data",
            statement.kind()
        ))),
    }
}

pub fn execute_write(
    catalog: &mut Catalog,
    statement: &CqlStatement,
    ctx: &ExecutionContext<'_>,
) -> DriverResult<Outcome> {
    match statement {
        CqlStatement::CreateKeyspace {
            name,
            if_not_exists,
            replication_factor,
        } => {
            if catalog.create_keyspace(name, *replication_factor, *if_not_exists)? {
                info!(keyspace = %name, replication_factor, "keyspace created");
            }
            Ok(Outcome::SchemaChanged)
        }
        CqlStatement::CreateTable {
            table,
            if_not_exists,
            columns,
            partition_key,
        } => {
            let (keyspace, name) = resolve_table(table, ctx.keyspace)?;
            ensure_user_keyspace(keyspace)?;
            if catalog.create_table(keyspace, name, columns.clone(), partition_key, *if_not_exists)? {
                info!(%keyspace, table = %name, "table created");
            }
            Ok(Outcome::SchemaChanged)
        }
        CqlStatement::DropKeyspace { name, if_exists } => {
            if catalog.drop_keyspace(name, *if_exists)? {
                info!(keyspace = %name, "keyspace dropped");
            }
            Ok(Outcome::SchemaChanged)
        }
        CqlStatement::DropTable { table, if_exists } => {
            let (keyspace, name) = resolve_table(table, ctx.keyspace)?;
            if catalog.drop_table(keyspace, name, *if_exists)? {
                info!(%keyspace, table = %name, "table dropped");
            }
            Ok(Outcome::SchemaChanged)
        }
        CqlStatement::Insert {
            table,
            columns,
            values,
            timestamp,
        } => {
            insert(catalog, table, columns, values, timestamp.as_ref(), ctx)?;
            Ok(Outcome::Void)
        }
        CqlStatement::Select { .. } | CqlStatement::Use { .. } => {
            execute_read(catalog, statement, ctx)
        }
    }
}

/// Validates a statement being prepared and returns the names of the columns
/// its result rows carry.
pub fn result_columns(
    catalog: &Catalog,
    statement: &CqlStatement,
    keyspace: Option<&str>,
) -> DriverResult<Vec<String>> {
    match statement {
        CqlStatement::Select {
            table, selection, ..
        } => {
            let (keyspace, name) = resolve_table(table, keyspace)?;
            let table = catalog.table(keyspace, name)?;
            let columns = selected_columns(table, selection)?;
            Ok(columns.into_iter().map(|column| column.name).collect())
        }
        CqlStatement::Insert { table, columns, .. } => {
            let (keyspace, name) = resolve_table(table, keyspace)?;
            let table = catalog.table(keyspace, name)?;
            for column in columns {
                table.column_type(column)?;
            }
            Ok(Vec::new())
        }
        _ => Ok(Vec::new()),
    }
}

fn resolve_table<'a>(table: &'a TableRef, current: Option<&'a str>) -> DriverResult<(&'a str, &'a str)> {
    let keyspace = table.keyspace.as_deref().or(current).ok_or_else(|| {
        DriverError::invalid_query(
            "No keyspace has been specified. USE a keyspace, or explicitly specify keyspace.tablename",
        )
    })?;
    Ok((keyspace, table.name.as_str()))
}

fn ensure_user_keyspace(keyspace: &str) -> DriverResult<()> {
    if keyspace == SYSTEM_KEYSPACE {
        return Err(DriverError::invalid_query(
            "system keyspace is not user-modifiable",
        ));
    }
    Ok(())
}

/// Fails with `SERVER_UNAVAILABLE` when fewer replicas are alive than the
/// consistency level needs.
pub fn check_consistency(
    consistency: Consistency,
    replication_factor: usize,
    live_nodes: usize,
    is_write: bool,
) -> DriverResult<()> {
    if !is_write && consistency == Consistency::Any {
        return Err(DriverError::invalid_query(
            "ANY ConsistencyLevel is only supported for writes",
        ));
    }
    let alive = live_nodes.min(replication_factor);
    let required = consistency.required_replicas(replication_factor);
    if required > alive {
        return Err(DriverError::new(
            ErrorCode::ServerUnavailable,
            format!(
                "Cannot achieve consistency level {consistency} (required {required}, alive {alive})"
            ),
        ));
    }
    Ok(())
}

fn insert(
    catalog: &mut Catalog,
    table: &TableRef,
    columns: &[String],
    terms: &[Term],
    timestamp: Option<&Term>,
    ctx: &ExecutionContext<'_>,
) -> DriverResult<()> {
    let (keyspace, name) = resolve_table(table, ctx.keyspace)?;
    ensure_user_keyspace(keyspace)?;
    let replication_factor = catalog.keyspace(keyspace)?.replication_factor();
    check_consistency(ctx.consistency, replication_factor, ctx.live_nodes, true)?;

    let table = catalog.table_mut(keyspace, name)?;
    let mut key = None;
    let mut cells = Vec::with_capacity(columns.len());
    for (index, (column, term)) in columns.iter().zip(terms).enumerate() {
        if columns[..index].contains(column) {
            return Err(DriverError::invalid_query(format!(
                "Multiple definitions found for column {column}"
            )));
        }
        let data_type = table.column_type(column)?;
        let value = normalize(resolve_term(term, data_type, column, ctx.values)?);
        if column == table.partition_key() {
            if value.is_null() {
                return Err(DriverError::invalid_query(format!(
                    "Invalid null value in condition for column {column}"
                )));
            }
            key = Some(value);
        } else {
            cells.push((column.clone(), value));
        }
    }
    let key = key.ok_or_else(|| {
        DriverError::invalid_query(format!(
            "Some partition key parts are missing: {}",
            table.partition_key()
        ))
    })?;

    let write_time = match timestamp {
        Some(term) => match resolve_term(term, &CqlType::BigInt, "[timestamp]", ctx.values)? {
            Value::BigInt(micros) => micros,
            _ => return Err(DriverError::invalid_query("Invalid null value of timestamp")),
        },
        None => ctx.timestamp,
    };

    debug!(keyspace = %table.keyspace(), table = %table.name(), key = %key, write_time, "upsert");
    table.upsert(key, cells, write_time);
    Ok(())
}

fn select(
    catalog: &Catalog,
    table: &TableRef,
    selection: &Selection,
    restrictions: &[Restriction],
    limit: Option<&Term>,
    ctx: &ExecutionContext<'_>,
) -> DriverResult<ResultSet> {
    let (keyspace, name) = resolve_table(table, ctx.keyspace)?;
    if keyspace != SYSTEM_KEYSPACE {
        let replication_factor = catalog.keyspace(keyspace)?.replication_factor();
        check_consistency(ctx.consistency, replication_factor, ctx.live_nodes, false)?;
    }
    let table = catalog.table(keyspace, name)?;

    let columns = selected_columns(table, selection)?;
    let key = partition_restriction(table, restrictions, ctx.values)?;
    let limit = match limit {
        Some(term) => Some(resolve_limit(term, ctx.values)?),
        None => None,
    };

    let mut rows: Vec<&StoredRow> = match &key {
        Some(key) => table.row(key).into_iter().collect(),
        None => table.rows().collect(),
    };
    if let Some(limit) = limit {
        rows.truncate(limit);
    }

    let offset = match ctx.paging_state {
        Some(state) => decode_paging_state(state)?,
        None => 0,
    };
    let end = match ctx.page_size {
        Some(page_size) => offset.saturating_add(page_size).min(rows.len()),
        None => rows.len(),
    };
    let paging_state = (end < rows.len()).then(|| encode_paging_state(end));
    let page = rows.get(offset..end).unwrap_or_default();

    let values = page
        .iter()
        .map(|row| columns.iter().map(|column| row.value(&column.name)).collect())
        .collect();
    let specs = columns
        .iter()
        .map(|column| ColumnSpec {
            keyspace: table.keyspace().to_string(),
            table: table.name().to_string(),
            name: column.name.clone(),
            data_type: column.data_type.clone(),
        })
        .collect();
    Ok(ResultSet::new(specs, values, paging_state))
}

fn selected_columns(table: &Table, selection: &Selection) -> DriverResult<Vec<ColumnDefinition>> {
    match selection {
        Selection::All => Ok(table.columns().to_vec()),
        Selection::Columns(names) => names
            .iter()
            .map(|name| {
                table.column_type(name).map(|data_type| ColumnDefinition {
                    name: name.clone(),
                    data_type: data_type.clone(),
                })
            })
            .collect(),
    }
}

fn partition_restriction(
    table: &Table,
    restrictions: &[Restriction],
    values: &[Value],
) -> DriverResult<Option<Value>> {
    let restriction = match restrictions {
        [] => return Ok(None),
        [restriction] => restriction,
        _ => {
            return Err(DriverError::invalid_query(
                "only a single equality restriction on the partition key is supported",
            ))
        }
    };
    let data_type = table.column_type(&restriction.column)?;
    if restriction.column != table.partition_key() {
        return Err(DriverError::invalid_query(
            "Cannot execute this query as it might involve data filtering and thus may have unpredictable performance",
        ));
    }
    let key = resolve_term(&restriction.term, data_type, &restriction.column, values)?;
    if key.is_null() {
        return Err(DriverError::invalid_query(format!(
            "Invalid null value in condition for column {}",
            restriction.column
        )));
    }
    Ok(Some(key))
}

fn resolve_limit(term: &Term, values: &[Value]) -> DriverResult<usize> {
    match resolve_term(term, &CqlType::Int, "[limit]", values)? {
        Value::Int(limit) if limit > 0 => Ok(limit as usize),
        _ => Err(DriverError::invalid_query("LIMIT must be strictly positive")),
    }
}

/// Paging state is the big-endian row offset of the next page.
fn encode_paging_state(offset: usize) -> Vec<u8> {
    (offset as u64).to_be_bytes().to_vec()
}

fn decode_paging_state(state: &[u8]) -> DriverResult<usize> {
    let bytes: [u8; 8] = state
        .try_into()
        .map_err(|_| DriverError::bad_params("invalid paging state"))?;
    usize::try_from(u64::from_be_bytes(bytes))
        .map_err(|_| DriverError::bad_params("invalid paging state"))
}

fn resolve_term(term: &Term, data_type: &CqlType, column: &str, values: &[Value]) -> DriverResult<Value> {
    match term {
        Term::Marker(index) => {
            let value = values.get(*index).ok_or_else(|| {
                DriverError::invalid_query(format!(
                    "Invalid amount of bind variables: no value for marker {index}"
                ))
            })?;
            if !value.fits(data_type) {
                return Err(DriverError::invalid_query(format!(
                    "Invalid value for column {column} of type {data_type}: got {}",
                    value.type_name()
                )));
            }
            Ok(value.clone())
        }
        Term::Literal(literal) => literal_value(literal, data_type, column),
    }
}

fn literal_value(literal: &Literal, data_type: &CqlType, column: &str) -> DriverResult<Value> {
    let value = match (literal, data_type) {
        (Literal::Null, _) => Value::Null,
        (Literal::Text(text), CqlType::Text) => Value::Text(text.clone()),
        (Literal::Integer(number), CqlType::Int) => match i32::try_from(*number) {
            Ok(number) => Value::Int(number),
            Err(_) => return Err(invalid_literal(literal, data_type, column)),
        },
        (Literal::Integer(number), CqlType::BigInt) => Value::BigInt(*number),
        (Literal::Integer(number), CqlType::Double) => Value::Double(*number as f64),
        (Literal::Float(number), CqlType::Double) => Value::Double(*number),
        (Literal::Boolean(flag), CqlType::Boolean) => Value::Boolean(*flag),
        (Literal::Blob(bytes), CqlType::Blob) => Value::Blob(bytes.clone()),
        (Literal::List(items), CqlType::List(item)) => {
            collection_literal(CollectionKind::List, items.iter(), item, column)?
        }
        (Literal::Set(items), CqlType::Set(item)) => {
            collection_literal(CollectionKind::Set, items.iter(), item, column)?
        }
        // `{}` parses as a map but is also the empty set.
        (Literal::Map(entries), CqlType::Set(_)) if entries.is_empty() => {
            Value::Collection(Collection::set(0))
        }
        (Literal::Map(entries), CqlType::Map(key, value)) => {
            let mut items = Vec::with_capacity(entries.len() * 2);
            for (k, v) in entries {
                items.push(collection_element(k, key, column)?);
                items.push(collection_element(v, value, column)?);
            }
            Value::Collection(Collection::from_items(CollectionKind::Map, items))
        }
        _ => return Err(invalid_literal(literal, data_type, column)),
    };
    Ok(value)
}

fn collection_literal<'a>(
    kind: CollectionKind,
    items: impl Iterator<Item = &'a Literal>,
    item_type: &CqlType,
    column: &str,
) -> DriverResult<Value> {
    let items = items
        .map(|item| collection_element(item, item_type, column))
        .collect::<DriverResult<Vec<_>>>()?;
    Ok(Value::Collection(Collection::from_items(kind, items)))
}

fn collection_element(literal: &Literal, data_type: &CqlType, column: &str) -> DriverResult<Value> {
    let value = literal_value(literal, data_type, column)?;
    if value.is_null() {
        return Err(DriverError::invalid_query("null is not supported inside collections"));
    }
    Ok(value)
}

fn invalid_literal(literal: &Literal, data_type: &CqlType, column: &str) -> DriverError {
    let kind = match literal {
        Literal::Null => "NULL",
        Literal::Text(_) => "STRING",
        Literal::Integer(_) => "INTEGER",
        Literal::Float(_) => "FLOAT",
        Literal::Boolean(_) => "BOOLEAN",
        Literal::Blob(_) => "HEX",
        Literal::List(_) => "LIST",
        Literal::Set(_) => "SET",
        Literal::Map(_) => "MAP",
    };
    DriverError::invalid_query(format!(
        "Invalid {kind} constant for \"{column}\" of type {data_type}"
    ))
}

/// Puts collection values in stored form: sets sorted and de-duplicated,
/// maps sorted by key with the last duplicate winning, at every nesting
/// level. Empty top-level collections are stored as null.
fn normalize(value: Value) -> Value {
    match value {
        Value::Collection(collection) if collection.is_empty() => Value::Null,
        Value::Collection(collection) => Value::Collection(normalize_collection(collection)),
        other => other,
    }
}

fn normalize_item(value: Value) -> Value {
    match value {
        Value::Collection(collection) => Value::Collection(normalize_collection(collection)),
        other => other,
    }
}

fn normalize_collection(collection: Collection) -> Collection {
    let kind = collection.kind();
    let items = collection.into_items().into_iter().map(normalize_item);
    let items = match kind {
        CollectionKind::List => items.collect(),
        CollectionKind::Set => {
            let mut items: Vec<Value> = items.collect();
            items.sort_by(Value::cql_cmp);
            items.dedup_by(|a, b| a.cql_cmp(b) == Ordering::Equal);
            items
        }
        CollectionKind::Map => {
            let mut items = items;
            let mut entries: Vec<(Value, Value)> = Vec::new();
            while let (Some(key), Some(value)) = (items.next(), items.next()) {
                entries.push((key, value));
            }
            entries.sort_by(|a, b| a.0.cql_cmp(&b.0));
            let mut merged: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                match merged.last_mut() {
                    Some(last) if last.0.cql_cmp(&key) == Ordering::Equal => last.1 = value,
                    _ => merged.push((key, value)),
                }
            }
            merged.into_iter().flat_map(|(k, v)| [k, v]).collect()
        }
    };
    Collection::from_items(kind, items)
}
