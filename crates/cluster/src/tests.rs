use std::time::Duration;

use cqlkit_domain::{
    Collection, Consistency, CustomPayload, ErrorCode, Session, Statement, Value,
};

use crate::{ClusterSession, EmbeddedCluster, QueryHandler, SessionBuilder};

const KEYSPACE_DDL: &str = "CREATE KEYSPACE IF NOT EXISTS examples WITH replication = { \
     'class': 'SimpleStrategy', 'replication_factor': '3' }";
const TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS examples.collections (key text, items set<text>, \
     PRIMARY KEY (key))";

fn cluster(nodes: u8) -> EmbeddedCluster {
    EmbeddedCluster::builder()
        .nodes(nodes)
        .start()
        .expect("cluster starts")
}

fn mirroring_cluster(release: &str) -> EmbeddedCluster {
    EmbeddedCluster::builder()
        .node("127.0.0.1")
        .release_version(release)
        .query_handler(QueryHandler::MirrorCustomPayload)
        .start()
        .expect("cluster starts")
}

async fn connect(cluster: &EmbeddedCluster) -> ClusterSession {
    SessionBuilder::new()
        .contact_points("127.0.0.1")
        .connect(cluster)
        .await
        .expect("session connects")
}

async fn run(session: &ClusterSession, query: &str) {
    session
        .execute(&Statement::new(query, 0))
        .await
        .unwrap_or_else(|err| panic!("`{query}` failed: {err}"));
}

async fn with_schema(cluster: &EmbeddedCluster) -> ClusterSession {
    let session = connect(cluster).await;
    run(&session, KEYSPACE_DDL).await;
    run(&session, TABLE_DDL).await;
    session
}

fn payload() -> CustomPayload {
    [("key1", "value1"), ("key2", "value2"), ("key3", "value3")]
        .into_iter()
        .collect()
}

#[tokio::test]
async fn mirrors_custom_payload() {
    let cluster = mirroring_cluster("3.11.4");
    let session = connect(&cluster).await;

    let mut statement = Statement::new("SELECT * FROM system.local", 0);
    let sent = payload();
    statement.set_custom_payload(sent.clone());
    let response = session.execute(&statement).await.unwrap();

    assert_eq!(response.custom_payload_item_count(), sent.len());
    for index in 0..response.custom_payload_item_count() {
        let (name, value) = response.custom_payload_item(index).unwrap();
        assert_eq!(sent.get(name), Some(value));
    }
    assert_eq!(response.result().row_count(), 1);
}

#[tokio::test]
async fn default_handler_returns_no_payload() {
    let cluster = cluster(1);
    let session = connect(&cluster).await;
    let mut statement = Statement::new("SELECT * FROM system.local", 0);
    statement.set_custom_payload(payload());

    let response = session.execute(&statement).await.unwrap();
    assert_eq!(response.custom_payload_item_count(), 0);
    let err = response.custom_payload_item(0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibIndexOutOfBounds);
}

#[tokio::test]
async fn custom_payload_needs_protocol_v4() {
    let cluster = mirroring_cluster("2.1.21");
    let session = connect(&cluster).await;
    assert_eq!(session.protocol_version(), 3);

    let mut statement = Statement::new("SELECT * FROM system.local", 0);
    statement.set_custom_payload(payload());
    let err = session.execute(&statement).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibMessageEncode);

    let plain = Statement::new("SELECT * FROM system.local", 0);
    assert!(session.execute(&plain).await.is_ok());
}

#[tokio::test]
async fn system_local_describes_the_node() {
    let cluster = EmbeddedCluster::builder()
        .cluster_name("payloads")
        .start()
        .unwrap();
    let session = connect(&cluster).await;
    let statement = Statement::new(
        "SELECT cluster_name, release_version, native_protocol_version FROM system.local WHERE key = 'local'",
        0,
    );
    let response = session.execute(&statement).await.unwrap();
    let row = response.result().first_row().unwrap();
    assert_eq!(row.get_by_name("cluster_name").unwrap().as_text().unwrap(), "payloads");
    assert_eq!(row.get(1).unwrap().as_text().unwrap(), "3.11.4");
    assert_eq!(row.get(2).unwrap().as_text().unwrap(), "4");
}

#[tokio::test]
async fn set_collection_round_trips_sorted() {
    let cluster = cluster(3);
    let session = with_schema(&cluster).await;

    let mut insert = Statement::new(
        "INSERT INTO examples.collections (key, items) VALUES (?, ?);",
        2,
    )
    .with_consistency(Consistency::One);
    insert.bind_text(0, "test").unwrap();
    let mut items = Collection::set(2);
    for item in ["apple", "orange", "banana", "mango", "apple"] {
        items.append_text(item).unwrap();
    }
    insert.bind_collection(1, items).unwrap();
    session.execute(&insert).await.unwrap();

    let mut select = Statement::new("SELECT items FROM examples.collections WHERE key = ?", 1);
    select.bind_text(0, "test").unwrap();
    let response = session.execute(&select).await.unwrap();
    let row = response.result().first_row().unwrap();
    let stored: Vec<&str> = row
        .get(0)
        .unwrap()
        .items()
        .unwrap()
        .map(|value| value.as_text().unwrap())
        .collect();
    assert_eq!(stored, vec!["apple", "banana", "mango", "orange"]);
}

#[tokio::test]
async fn unset_parameters_are_rejected() {
    let cluster = cluster(1);
    let session = with_schema(&cluster).await;
    let mut statement = Statement::new(
        "INSERT INTO examples.collections (key, items) VALUES (?, ?)",
        2,
    );
    statement.bind_text(0, "test").unwrap();
    let err = session.execute(&statement).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibParameterUnset);

    let err = statement.bind_text(2, "past the end").unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibIndexOutOfBounds);
}

#[tokio::test]
async fn duplicate_keyspace_without_guard_already_exists() {
    let cluster = cluster(1);
    let session = with_schema(&cluster).await;
    let statement = Statement::new(
        "CREATE KEYSPACE examples WITH replication = {'class': 'SimpleStrategy', 'replication_factor': 1}",
        0,
    );
    let err = session.execute(&statement).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ServerAlreadyExists);
    assert!(err.code().is_server_error());
}

#[tokio::test]
async fn connect_without_reachable_hosts_fails() {
    let cluster = cluster(1);

    let err = SessionBuilder::new().connect(&cluster).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibNoHostsAvailable);

    let err = SessionBuilder::new()
        .contact_points("10.0.0.1,10.0.0.2")
        .connect(&cluster)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibNoHostsAvailable);
    assert!(err.message().contains("10.0.0.1:9042"));

    let err = SessionBuilder::new()
        .contact_points("127.0.0.1")
        .port(9142)
        .connect(&cluster)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibNoHostsAvailable);

    let err = SessionBuilder::new()
        .contact_points("no such host!")
        .connect(&cluster)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibBadParams);
}

#[tokio::test]
async fn connects_past_stopped_contact_points() {
    let cluster = cluster(3);
    cluster.stop_node("127.0.0.1").await.unwrap();
    let session = SessionBuilder::new()
        .contact_points("127.0.0.1,127.0.0.2,127.0.0.3")
        .connect(&cluster)
        .await
        .unwrap();
    assert_eq!(session.hosts().len(), 2);

    cluster.stop_node("127.0.0.2").await.unwrap();
    cluster.stop_node("127.0.0.3").await.unwrap();
    let err = session
        .execute(&Statement::new("SELECT * FROM system.local", 0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibNoHostsAvailable);
}

#[tokio::test]
async fn consistency_beyond_live_replicas_is_unavailable() {
    let cluster = cluster(3);
    let session = with_schema(&cluster).await;
    cluster.stop_node("127.0.0.2").await.unwrap();
    cluster.stop_node("127.0.0.3").await.unwrap();

    let mut select = Statement::new("SELECT * FROM examples.collections", 0)
        .with_consistency(Consistency::Quorum);
    let err = session.execute(&select).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ServerUnavailable);

    select.set_consistency(Consistency::One);
    assert!(session.execute(&select).await.is_ok());
}

#[tokio::test]
async fn requests_after_shutdown_fail() {
    let cluster = cluster(1);
    let session = connect(&cluster).await;
    session.shutdown().await.unwrap();
    session.shutdown().await.unwrap();
    assert!(session.is_closed());

    let err = session
        .execute(&Statement::new("SELECT * FROM system.local", 0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibSessionClosed);
    let err = session.prepare("SELECT * FROM system.local").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibSessionClosed);
}

#[tokio::test(start_paused = true)]
async fn slow_nodes_time_out() {
    let cluster = EmbeddedCluster::builder()
        .latency(Duration::from_millis(200))
        .start()
        .unwrap();
    let session = SessionBuilder::new()
        .contact_points("127.0.0.1")
        .request_timeout(Duration::from_millis(50))
        .connect(&cluster)
        .await
        .unwrap();
    let err = session
        .execute(&Statement::new("SELECT * FROM system.local", 0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibRequestTimedOut);
}

#[tokio::test]
async fn prepared_statements_bind_by_name() {
    let cluster = cluster(1);
    let session = with_schema(&cluster).await;
    session.use_keyspace("examples").await.unwrap();
    assert_eq!(session.keyspace().await.as_deref(), Some("examples"));

    let insert = session
        .prepare("INSERT INTO collections (key, items) VALUES (:key, :items)")
        .await
        .unwrap();
    assert_eq!(insert.parameter_names(), ["key", "items"]);
    let again = session
        .prepare("INSERT INTO collections (key, items) VALUES (:key, :items)")
        .await
        .unwrap();
    assert_eq!(insert.id(), again.id());

    let mut statement = insert.bind();
    statement.bind_by_name("KEY", "fruit").unwrap();
    let mut items = Collection::set(1);
    items.append_text("kiwi").unwrap();
    statement.bind_by_name("items", items).unwrap();
    session.execute(&statement).await.unwrap();

    let select = session
        .prepare("SELECT * FROM collections WHERE key = ?")
        .await
        .unwrap();
    assert_eq!(select.result_columns(), ["key", "items"]);
    let mut statement = select.bind();
    statement.bind_by_name("key", "fruit").unwrap();
    let response = session.execute(&statement).await.unwrap();
    let row = response.result().first_row().unwrap();
    assert_eq!(
        row.get_by_name("items").unwrap().items().unwrap().next(),
        Some(&Value::from("kiwi"))
    );

    let err = session.prepare("SELECT * FROM missing").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ServerInvalidQuery);
}

#[tokio::test]
async fn schema_changes_invalidate_prepared_statements() {
    let cluster = cluster(1);
    let session = connect(&cluster).await;
    let other = connect(&cluster).await;
    run(&session, KEYSPACE_DDL).await;
    run(&session, "CREATE TABLE examples.shapes (key text PRIMARY KEY, a int)").await;

    let query = "SELECT * FROM examples.shapes";
    let before = session.prepare(query).await.unwrap();
    assert_eq!(before.result_columns(), ["key", "a"]);

    run(&session, "DROP TABLE examples.shapes").await;
    let err = session.prepare(query).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ServerInvalidQuery);

    run(&session, "CREATE TABLE examples.shapes (key text PRIMARY KEY, b int, c int)").await;
    let after = session.prepare(query).await.unwrap();
    assert_eq!(after.result_columns(), ["key", "b", "c"]);

    // A drop issued through another session is seen as well.
    run(&other, "DROP TABLE examples.shapes").await;
    let err = session.prepare(query).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ServerInvalidQuery);
}

#[tokio::test]
async fn pages_follow_paging_state() {
    let cluster = cluster(1);
    let session = with_schema(&cluster).await;
    for key in ["a", "b", "c", "d", "e"] {
        let mut insert = Statement::new("INSERT INTO examples.collections (key) VALUES (?)", 1);
        insert.bind_text(0, key).unwrap();
        session.execute(&insert).await.unwrap();
    }

    let mut select = Statement::new("SELECT key FROM examples.collections", 0);
    select.set_page_size(2);
    let mut keys = Vec::new();
    loop {
        let response = session.execute(&select).await.unwrap();
        let result = response.result();
        keys.extend(
            result
                .rows()
                .map(|row| row.get(0).unwrap().as_text().unwrap().to_string()),
        );
        if !result.has_more_pages() {
            break;
        }
        select.set_paging_state(result);
    }
    assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn syntax_errors_surface_server_codes() {
    let cluster = cluster(1);
    let session = connect(&cluster).await;
    let err = session
        .execute(&Statement::new("SELEC * FROM system.local", 0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ServerSyntaxError);

    let err = session
        .execute(&Statement::new("SELECT * FROM collections", 0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ServerInvalidQuery);
}
