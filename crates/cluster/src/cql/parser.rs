use cqlkit_domain::{CqlType, DriverError, DriverResult};

use super::lexer::{tokenize, Token};
use super::{
    BindMarker, ColumnDefinition, CqlStatement, Literal, ParsedQuery, Restriction, Selection,
    TableRef, Term,
};

pub fn parse(query: &str) -> DriverResult<ParsedQuery> {
    let tokens = tokenize(query)?;
    let mut parser = Parser {
        tokens,
        position: 0,
        markers: Vec::new(),
    };
    let statement = parser.statement()?;
    parser.accept_symbol(';');
    if let Some(token) = parser.peek() {
        return Err(DriverError::syntax(format!(
            "line 1: extraneous input '{}'",
            token.describe()
        )));
    }
    Ok(ParsedQuery {
        statement,
        markers: parser.markers,
    })
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    markers: Vec<BindMarker>,
}

impl Parser {
    fn statement(&mut self) -> DriverResult<CqlStatement> {
        if self.accept_keyword("CREATE") {
            if self.accept_keyword("KEYSPACE") {
                self.create_keyspace()
            } else if self.accept_keyword("TABLE") || self.accept_keyword("COLUMNFAMILY") {
                self.create_table()
            } else {
                Err(self.unexpected("KEYSPACE or TABLE"))
            }
        } else if self.accept_keyword("DROP") {
            if self.accept_keyword("KEYSPACE") {
                let if_exists = self.if_exists()?;
                let name = self.identifier()?;
                Ok(CqlStatement::DropKeyspace { name, if_exists })
            } else if self.accept_keyword("TABLE") {
                let if_exists = self.if_exists()?;
                let table = self.table_ref()?;
                Ok(CqlStatement::DropTable { table, if_exists })
            } else {
                Err(self.unexpected("KEYSPACE or TABLE"))
            }
        } else if self.accept_keyword("USE") {
            let keyspace = self.identifier()?;
            Ok(CqlStatement::Use { keyspace })
        } else if self.accept_keyword("INSERT") {
            self.insert()
        } else if self.accept_keyword("SELECT") {
            self.select()
        } else {
            Err(self.unexpected("a statement"))
        }
    }

    fn create_keyspace(&mut self) -> DriverResult<CqlStatement> {
        let if_not_exists = self.if_not_exists()?;
        let name = self.identifier()?;
        self.expect_keyword("WITH")?;

        let mut replication = None;
        loop {
            let option = self.identifier()?;
            self.expect_symbol('=')?;
            let value = self.literal()?;
            if option == "replication" {
                replication = Some(value);
            }
            if !self.accept_keyword("AND") {
                break;
            }
        }

        let replication = replication.ok_or_else(|| {
            DriverError::syntax("missing mandatory replication strategy class")
        })?;
        let replication_factor = replication_factor(&replication)?;
        Ok(CqlStatement::CreateKeyspace {
            name,
            if_not_exists,
            replication_factor,
        })
    }

    fn create_table(&mut self) -> DriverResult<CqlStatement> {
        let if_not_exists = self.if_not_exists()?;
        let table = self.table_ref()?;
        self.expect_symbol('(')?;

        let mut columns = Vec::new();
        let mut key_columns: Vec<String> = Vec::new();
        loop {
            if self.accept_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                if !key_columns.is_empty() {
                    return Err(DriverError::invalid_query("multiple PRIMARY KEYs specified"));
                }
                key_columns = self.primary_key()?;
            } else {
                let name = self.identifier()?;
                let data_type = self.data_type()?;
                if self.accept_keyword("PRIMARY") {
                    self.expect_keyword("KEY")?;
                    if !key_columns.is_empty() {
                        return Err(DriverError::invalid_query(
                            "multiple PRIMARY KEYs specified",
                        ));
                    }
                    key_columns.push(name.clone());
                }
                columns.push(ColumnDefinition { name, data_type });
            }
            if !self.accept_symbol(',') {
                break;
            }
        }
        self.expect_symbol(')')?;
        if self.accept_keyword("WITH") {
            // Table options do not change how the embedded cluster stores rows.
            while self.peek().is_some_and(|token| *token != Token::Symbol(';')) {
                self.position += 1;
            }
        }

        let partition_key = match key_columns.as_slice() {
            [] => {
                return Err(DriverError::invalid_query(
                    "no PRIMARY KEY specified (exactly one required)",
                ))
            }
            [single] => single.clone(),
            _ => {
                return Err(DriverError::invalid_query(
                    "clustering columns and composite partition keys are not supported",
                ))
            }
        };

        Ok(CqlStatement::CreateTable {
            table,
            if_not_exists,
            columns,
            partition_key,
        })
    }

    fn primary_key(&mut self) -> DriverResult<Vec<String>> {
        self.expect_symbol('(')?;
        let mut names = Vec::new();
        loop {
            if self.accept_symbol('(') {
                names.extend(self.identifier_list()?);
                self.expect_symbol(')')?;
            } else {
                names.push(self.identifier()?);
            }
            if !self.accept_symbol(',') {
                break;
            }
        }
        self.expect_symbol(')')?;
        Ok(names)
    }

    fn insert(&mut self) -> DriverResult<CqlStatement> {
        self.expect_keyword("INTO")?;
        let table = self.table_ref()?;
        self.expect_symbol('(')?;
        let columns = self.identifier_list()?;
        self.expect_symbol(')')?;
        self.expect_keyword("VALUES")?;
        self.expect_symbol('(')?;

        let mut values = Vec::with_capacity(columns.len());
        loop {
            let column = columns.get(values.len()).cloned().unwrap_or_default();
            values.push(self.term(&column)?);
            if !self.accept_symbol(',') {
                break;
            }
        }
        self.expect_symbol(')')?;

        if columns.len() != values.len() {
            return Err(DriverError::invalid_query(format!(
                "unmatched column names/values: {} columns, {} values",
                columns.len(),
                values.len()
            )));
        }

        let mut timestamp = None;
        if self.accept_keyword("USING") {
            self.expect_keyword("TIMESTAMP")?;
            timestamp = Some(self.term("[timestamp]")?);
        }

        Ok(CqlStatement::Insert {
            table,
            columns,
            values,
            timestamp,
        })
    }

    fn select(&mut self) -> DriverResult<CqlStatement> {
        let selection = if self.accept_symbol('*') {
            Selection::All
        } else {
            Selection::Columns(self.identifier_list()?)
        };
        self.expect_keyword("FROM")?;
        let table = self.table_ref()?;

        let mut restrictions = Vec::new();
        if self.accept_keyword("WHERE") {
            loop {
                let column = self.identifier()?;
                self.expect_symbol('=')?;
                let term = self.term(&column)?;
                restrictions.push(Restriction { column, term });
                if !self.accept_keyword("AND") {
                    break;
                }
            }
        }

        let limit = if self.accept_keyword("LIMIT") {
            Some(self.term("[limit]")?)
        } else {
            None
        };
        if self.accept_keyword("ALLOW") {
            self.expect_keyword("FILTERING")?;
        }

        Ok(CqlStatement::Select {
            table,
            selection,
            restrictions,
            limit,
        })
    }

    fn if_not_exists(&mut self) -> DriverResult<bool> {
        if self.accept_keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
            return Ok(true);
        }
        Ok(false)
    }

    fn if_exists(&mut self) -> DriverResult<bool> {
        if self.accept_keyword("IF") {
            self.expect_keyword("EXISTS")?;
            return Ok(true);
        }
        Ok(false)
    }

    fn table_ref(&mut self) -> DriverResult<TableRef> {
        let first = self.identifier()?;
        if self.accept_symbol('.') {
            let name = self.identifier()?;
            return Ok(TableRef {
                keyspace: Some(first),
                name,
            });
        }
        Ok(TableRef {
            keyspace: None,
            name: first,
        })
    }

    fn identifier_list(&mut self) -> DriverResult<Vec<String>> {
        let mut names = vec![self.identifier()?];
        while self.accept_symbol(',') {
            names.push(self.identifier()?);
        }
        Ok(names)
    }

    /// Unquoted identifiers fold to lower case; quoted ones keep their case.
    fn identifier(&mut self) -> DriverResult<String> {
        match self.peek().cloned() {
            Some(Token::Ident(ident)) => {
                self.position += 1;
                Ok(ident.to_ascii_lowercase())
            }
            Some(Token::QuotedIdent(ident)) => {
                self.position += 1;
                Ok(ident)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn data_type(&mut self) -> DriverResult<CqlType> {
        let name = self.identifier()?;
        match name.as_str() {
            "frozen" => {
                self.expect_symbol('<')?;
                let inner = self.data_type()?;
                self.expect_symbol('>')?;
                Ok(inner)
            }
            "list" | "set" => {
                self.expect_symbol('<')?;
                let item = Box::new(self.data_type()?);
                self.expect_symbol('>')?;
                Ok(if name == "list" {
                    CqlType::List(item)
                } else {
                    CqlType::Set(item)
                })
            }
            "map" => {
                self.expect_symbol('<')?;
                let key = Box::new(self.data_type()?);
                self.expect_symbol(',')?;
                let value = Box::new(self.data_type()?);
                self.expect_symbol('>')?;
                Ok(CqlType::Map(key, value))
            }
            other => CqlType::from_native_name(other)
                .ok_or_else(|| DriverError::syntax(format!("unknown type {other}"))),
        }
    }

    /// Parses a value position, registering bind markers under
    /// `marker_name` unless the marker carries its own name.
    fn term(&mut self, marker_name: &str) -> DriverResult<Term> {
        if self.accept_symbol('?') {
            return Ok(Term::Marker(self.register_marker(marker_name.to_string())));
        }
        if self.accept_symbol(':') {
            let name = self.identifier()?;
            return Ok(Term::Marker(self.register_marker(name)));
        }
        self.literal().map(Term::Literal)
    }

    fn register_marker(&mut self, name: String) -> usize {
        self.markers.push(BindMarker { name });
        self.markers.len() - 1
    }

    fn literal(&mut self) -> DriverResult<Literal> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected("a literal"));
        };
        self.position += 1;
        match token {
            Token::Str(value) => Ok(Literal::Text(value)),
            Token::Integer(value) => Ok(Literal::Integer(value)),
            Token::Float(value) => Ok(Literal::Float(value)),
            Token::Blob(value) => Ok(Literal::Blob(value)),
            Token::Ident(ident) if ident.eq_ignore_ascii_case("null") => Ok(Literal::Null),
            Token::Ident(ident) if ident.eq_ignore_ascii_case("true") => Ok(Literal::Boolean(true)),
            Token::Ident(ident) if ident.eq_ignore_ascii_case("false") => {
                Ok(Literal::Boolean(false))
            }
            Token::Symbol('[') => {
                let items = self.literal_items(']')?;
                Ok(Literal::List(items))
            }
            Token::Symbol('{') => self.brace_literal(),
            other => {
                self.position -= 1;
                Err(DriverError::syntax(format!(
                    "line 1: no viable alternative at input '{}'",
                    other.describe()
                )))
            }
        }
    }

    fn literal_items(&mut self, close: char) -> DriverResult<Vec<Literal>> {
        let mut items = Vec::new();
        if self.accept_symbol(close) {
            return Ok(items);
        }
        loop {
            items.push(self.literal()?);
            if !self.accept_symbol(',') {
                break;
            }
        }
        self.expect_symbol(close)?;
        Ok(items)
    }

    /// `{}` literals are sets or maps depending on whether the first element
    /// is followed by `:`. An empty pair of braces reads as an empty map.
    fn brace_literal(&mut self) -> DriverResult<Literal> {
        if self.accept_symbol('}') {
            return Ok(Literal::Map(Vec::new()));
        }
        let first = self.literal()?;
        if self.accept_symbol(':') {
            let mut entries = vec![(first, self.literal()?)];
            while self.accept_symbol(',') {
                let key = self.literal()?;
                self.expect_symbol(':')?;
                entries.push((key, self.literal()?));
            }
            self.expect_symbol('}')?;
            return Ok(Literal::Map(entries));
        }
        let mut items = vec![first];
        while self.accept_symbol(',') {
            items.push(self.literal()?);
        }
        self.expect_symbol('}')?;
        Ok(Literal::Set(items))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|token| token.is_keyword(keyword)) {
            self.position += 1;
            return true;
        }
        false
    }

    fn expect_keyword(&mut self, keyword: &str) -> DriverResult<()> {
        if self.accept_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn accept_symbol(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.position += 1;
            return true;
        }
        false
    }

    fn expect_symbol(&mut self, symbol: char) -> DriverResult<()> {
        if self.accept_symbol(symbol) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{symbol}'")))
        }
    }

    fn unexpected(&self, expected: &str) -> DriverError {
        match self.peek() {
            Some(token) => DriverError::syntax(format!(
                "line 1: expected {expected} but found '{}'",
                token.describe()
            )),
            None => DriverError::syntax(format!(
                "line 1: expected {expected} but reached end of input"
            )),
        }
    }
}

/// Replication factor from a replication map: `replication_factor` for
/// SimpleStrategy, the sum of per-datacenter factors otherwise.
fn replication_factor(replication: &Literal) -> DriverResult<usize> {
    let Literal::Map(entries) = replication else {
        return Err(DriverError::syntax("replication must be a map literal"));
    };

    let mut simple = None;
    let mut per_dc = 0usize;
    for (key, value) in entries {
        let Literal::Text(key) = key else {
            return Err(DriverError::syntax("replication option names must be strings"));
        };
        if key == "class" {
            continue;
        }
        let factor = match value {
            Literal::Integer(value) => usize::try_from(*value).ok(),
            Literal::Text(value) => value.trim().parse::<usize>().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            DriverError::invalid_query(format!("invalid replication factor for option `{key}`"))
        })?;
        if key == "replication_factor" {
            simple = Some(factor);
        } else {
            per_dc += factor;
        }
    }

    match simple.unwrap_or(per_dc) {
        0 => Err(DriverError::invalid_query(
            "replication factor must be at least 1",
        )),
        factor => Ok(factor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlkit_domain::ErrorCode;

    #[test]
    fn parses_keyspace_ddl() {
        let parsed = parse(
            "CREATE KEYSPACE examples WITH replication = { \
             'class': 'SimpleStrategy', 'replication_factor': '1' };",
        )
        .unwrap();
        assert_eq!(
            parsed.statement,
            CqlStatement::CreateKeyspace {
                name: "examples".into(),
                if_not_exists: false,
                replication_factor: 1,
            }
        );
    }

    #[test]
    fn network_topology_sums_datacenters() {
        let parsed = parse(
            "CREATE KEYSPACE IF NOT EXISTS ks WITH replication = \
             {'class': 'NetworkTopologyStrategy', 'dc1': 2, 'dc2': '1'} AND durable_writes = true",
        )
        .unwrap();
        assert!(matches!(
            parsed.statement,
            CqlStatement::CreateKeyspace {
                replication_factor: 3,
                if_not_exists: true,
                ..
            }
        ));
    }

    #[test]
    fn parses_table_with_set_column() {
        let parsed = parse(
            "CREATE TABLE examples.collections (key text, \
             items set<text>, PRIMARY KEY (key))",
        )
        .unwrap();
        let CqlStatement::CreateTable {
            table,
            columns,
            partition_key,
            ..
        } = parsed.statement
        else {
            panic!("expected create table");
        };
        assert_eq!(table.keyspace.as_deref(), Some("examples"));
        assert_eq!(partition_key, "key");
        assert_eq!(columns[1].data_type, CqlType::Set(Box::new(CqlType::Text)));
    }

    #[test]
    fn inline_primary_key_and_nested_types() {
        let parsed =
            parse("CREATE TABLE t (id int PRIMARY KEY, tags map<text, frozen<list<int>>>)")
                .unwrap();
        let CqlStatement::CreateTable { columns, .. } = parsed.statement else {
            panic!("expected create table");
        };
        assert_eq!(
            columns[1].data_type,
            CqlType::Map(
                Box::new(CqlType::Text),
                Box::new(CqlType::List(Box::new(CqlType::Int)))
            )
        );
    }

    #[test]
    fn clustering_columns_are_rejected() {
        let err = parse("CREATE TABLE t (a int, b int, PRIMARY KEY (a, b))").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerInvalidQuery);
    }

    #[test]
    fn markers_take_their_column_names() {
        let parsed =
            parse("INSERT INTO examples.collections (key, items) VALUES (?, ?);").unwrap();
        assert_eq!(parsed.marker_names(), ["key", "items"]);

        let parsed = parse("SELECT items FROM examples.collections WHERE key = :k LIMIT ?")
            .unwrap();
        assert_eq!(parsed.marker_names(), ["k", "[limit]"]);
    }

    #[test]
    fn parses_collection_literals() {
        let parsed =
            parse("INSERT INTO t (k, s, l, m) VALUES (1, {'a', 'b'}, [1, 2], {'x': 0x01})")
                .unwrap();
        let CqlStatement::Insert { values, .. } = parsed.statement else {
            panic!("expected insert");
        };
        assert_eq!(
            values[1],
            Term::Literal(Literal::Set(vec![
                Literal::Text("a".into()),
                Literal::Text("b".into())
            ]))
        );
        assert_eq!(
            values[3],
            Term::Literal(Literal::Map(vec![(
                Literal::Text("x".into()),
                Literal::Blob(vec![1])
            )]))
        );
    }

    #[test]
    fn select_star_from_system_local() {
        let parsed = parse("SELECT * FROM system.local").unwrap();
        assert!(matches!(
            parsed.statement,
            CqlStatement::Select {
                selection: Selection::All,
                ..
            }
        ));
        assert!(parsed.markers.is_empty());
    }

    #[test]
    fn reports_syntax_errors() {
        let err = parse("SELEC * FROM t").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerSyntaxError);
        let err = parse("SELECT * FROM t WHERE").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerSyntaxError);
        let err = parse("USE ks extra").unwrap_err();
        assert!(err.message().contains("extraneous input"));
    }

    #[test]
    fn mismatched_insert_is_invalid() {
        let err = parse("INSERT INTO t (a, b) VALUES (?)").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerInvalidQuery);
    }
}
