//! Binds a `set<text>` column, writes it and reads it back item by item.

use std::io::{self, Write};

use cqlkit_cluster::{ClusterSession, EmbeddedCluster, SessionBuilder};
use cqlkit_domain::{Collection, Consistency, DriverResult, Session, Statement};
use tracing::{error, info, warn};

pub const DEFAULT_KEY: &str = "test";
pub const DEFAULT_ITEMS: [&str; 4] = ["apple", "orange", "banana", "mango"];

const CREATE_KEYSPACE: &str = "CREATE KEYSPACE examples WITH replication = { \
     'class': 'SimpleStrategy', 'replication_factor': '1' };";
const CREATE_TABLE: &str =
    "CREATE TABLE examples.collections (key text, items set<text>, PRIMARY KEY (key));";
const INSERT: &str = "INSERT INTO examples.collections (key, items) VALUES (?, ?);";
const SELECT: &str = "SELECT items FROM examples.collections WHERE key = ?";

fn log_error<T>(result: DriverResult<T>) -> DriverResult<T> {
    if let Err(err) = &result {
        error!(code = %err.code(), "Error: {}", err.message());
    }
    result
}

/// Connects with the contact points and options carried by `builder`.
pub async fn connect_session(
    cluster: &EmbeddedCluster,
    builder: SessionBuilder,
) -> DriverResult<ClusterSession> {
    log_error(builder.connect(cluster).await)
}

/// Runs `query` without parameters at consistency ONE.
pub async fn execute_query<S: Session>(session: &S, query: &str) -> DriverResult<()> {
    let statement = Statement::new(query, 0).with_consistency(Consistency::One);
    log_error(session.execute(&statement).await).map(|_| ())
}

pub async fn insert_into_collections<S: Session>(
    session: &S,
    key: &str,
    items: &[&str],
) -> DriverResult<()> {
    let mut statement = Statement::new(INSERT, 2).with_consistency(Consistency::One);
    log_error(statement.bind_text(0, key))?;

    let mut collection = Collection::set(2);
    for item in items {
        log_error(collection.append_text(item))?;
    }
    log_error(statement.bind_collection(1, collection))?;

    log_error(session.execute(&statement).await).map(|_| ())
}

/// Prints every stored item as `item: <value>` and returns them in stored
/// order.
pub async fn select_from_collections<S: Session>(session: &S, key: &str) -> DriverResult<Vec<String>> {
    let mut statement = Statement::new(SELECT, 1).with_consistency(Consistency::One);
    log_error(statement.bind_text(0, key))?;

    let response = log_error(session.execute(&statement).await)?;
    let mut items = Vec::new();
    if let Some(row) = response.result().first_row() {
        let column = log_error(row.get(0))?;
        if !column.is_null() {
            for item in log_error(column.items())? {
                items.push(log_error(item.as_text())?.to_string());
            }
        }
    }

    if let Err(err) = print_items(&items, &mut io::stdout().lock()) {
        warn!(%err, "failed to print collection items");
    }
    Ok(items)
}

fn print_items(items: &[String], out: &mut impl Write) -> io::Result<()> {
    for item in items {
        writeln!(out, "item: {item}")?;
    }
    out.flush()
}

/// Creates the schema, writes `items` under `key` and reads them back.
/// Schema failures such as an existing keyspace are logged and skipped.
pub async fn run<S: Session>(session: &S, key: &str, items: &[&str]) -> DriverResult<Vec<String>> {
    for ddl in [CREATE_KEYSPACE, CREATE_TABLE] {
        if let Err(err) = execute_query(session, ddl).await {
            warn!(code = %err.code(), "schema statement failed, continuing");
        }
    }

    insert_into_collections(session, key, items).await?;
    let stored = select_from_collections(session, key).await?;
    info!(key, count = stored.len(), "collection read back");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Collects formatted log lines for assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn items_print_one_per_line() {
        let mut out = Vec::new();
        print_items(&["apple".to_string(), "mango".to_string()], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "item: apple\nitem: mango\n");
    }

    #[tokio::test]
    async fn failed_steps_log_their_message() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let cluster = EmbeddedCluster::builder().start().unwrap();
        let session = SessionBuilder::new()
            .contact_points("127.0.0.1")
            .connect(&cluster)
            .await
            .unwrap();
        let err = insert_into_collections(&session, "k", &["x"]).await.unwrap_err();

        let logs = logs.contents();
        assert!(logs.contains("ERROR"), "{logs}");
        assert!(logs.contains(&format!("Error: {}", err.message())), "{logs}");
    }
}
