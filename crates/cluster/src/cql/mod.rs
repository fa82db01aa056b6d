//! The CQL subset understood by the embedded cluster: keyspace and table
//! DDL, `USE`, single-partition `INSERT` and `SELECT`.

mod lexer;
mod parser;

use cqlkit_domain::CqlType;

pub use parser::parse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub keyspace: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Blob(Vec<u8>),
    List(Vec<Literal>),
    Set(Vec<Literal>),
    Map(Vec<(Literal, Literal)>),
}

/// A value position in a statement: either a bind marker (by position in
/// the query) or an inline literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Marker(usize),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Restriction {
    pub column: String,
    pub term: Term,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: CqlType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CqlStatement {
    CreateKeyspace {
        name: String,
        if_not_exists: bool,
        replication_factor: usize,
    },
    CreateTable {
        table: TableRef,
        if_not_exists: bool,
        columns: Vec<ColumnDefinition>,
        partition_key: String,
    },
    DropKeyspace {
        name: String,
        if_exists: bool,
    },
    DropTable {
        table: TableRef,
        if_exists: bool,
    },
    Use {
        keyspace: String,
    },
    Insert {
        table: TableRef,
        columns: Vec<String>,
        values: Vec<Term>,
        timestamp: Option<Term>,
    },
    Select {
        table: TableRef,
        selection: Selection,
        restrictions: Vec<Restriction>,
        limit: Option<Term>,
    },
}

impl CqlStatement {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CqlStatement::CreateKeyspace { .. }
            | CqlStatement::CreateTable { .. }
            | CqlStatement::DropKeyspace { .. }
            | CqlStatement::DropTable { .. } => "schema",
            CqlStatement::Use { .. } => "use",
            CqlStatement::Insert { .. } => "insert",
            CqlStatement::Select { .. } => "select",
        }
    }
}

/// Name given to a bind marker: the explicit `:name`, the column it binds
/// to, or a bracketed role such as `[limit]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMarker {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub statement: CqlStatement,
    pub markers: Vec<BindMarker>,
}

impl ParsedQuery {
    pub fn marker_names(&self) -> Vec<String> {
        self.markers.iter().map(|marker| marker.name.clone()).collect()
    }
}
