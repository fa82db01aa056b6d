use cqlkit_cluster::{EmbeddedCluster, QueryHandler, SessionBuilder};
use cqlkit_domain::{config::ClusterConfig, CustomPayload, ErrorCode, Session};

use crate::{
    application::{local_cluster, DemoError},
    collections, custom_payload,
};

#[tokio::test]
async fn collections_example_reads_back_sorted_items() {
    let config = ClusterConfig::default();
    let cluster = local_cluster(&config).unwrap();
    let session = collections::connect_session(&cluster, SessionBuilder::from_config(&config))
        .await
        .unwrap();

    let stored = collections::run(&session, collections::DEFAULT_KEY, &collections::DEFAULT_ITEMS)
        .await
        .unwrap();
    assert_eq!(stored, vec!["apple", "banana", "mango", "orange"]);

    // Re-running hits "already exists" on the schema and still succeeds.
    let stored = collections::run(&session, collections::DEFAULT_KEY, &["kiwi", "kiwi"])
        .await
        .unwrap();
    assert_eq!(stored, vec!["kiwi"]);
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn select_of_missing_key_is_empty() {
    let config = ClusterConfig::default();
    let cluster = local_cluster(&config).unwrap();
    let session = collections::connect_session(&cluster, SessionBuilder::from_config(&config))
        .await
        .unwrap();
    collections::run(&session, "present", &["a"]).await.unwrap();

    let items = collections::select_from_collections(&session, "absent")
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn insert_fails_without_schema() {
    let cluster = EmbeddedCluster::builder().start().unwrap();
    let session = SessionBuilder::new()
        .contact_points("127.0.0.1")
        .connect(&cluster)
        .await
        .unwrap();
    let err = collections::insert_into_collections(&session, "k", &["x"])
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ServerInvalidQuery);
}

#[tokio::test]
async fn connect_session_reports_missing_hosts() {
    let cluster = EmbeddedCluster::builder().node("10.1.1.1").start().unwrap();
    let err = collections::connect_session(&cluster, SessionBuilder::from_config(&ClusterConfig::default()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LibNoHostsAvailable);
}

#[tokio::test]
async fn custom_payload_scenario_passes() {
    let report = custom_payload::run("3.11.4").await.unwrap();
    assert!(report.is_ok());
    assert_eq!(report.sent, 3);
    assert_eq!(report.returned, 3);
}

#[tokio::test]
async fn custom_payload_requires_2_2() {
    let err = custom_payload::run("2.1.9").await.unwrap_err();
    assert!(matches!(err, DemoError::Unsupported(_)));

    let cluster = custom_payload::start_cluster("2.2.0").unwrap();
    assert!(custom_payload::ensure_supported(&cluster).is_ok());
}

#[tokio::test]
async fn default_handler_fails_verification() {
    let cluster = EmbeddedCluster::builder()
        .query_handler(QueryHandler::Default)
        .start()
        .unwrap();
    let session = SessionBuilder::new()
        .contact_points("127.0.0.1")
        .connect(&cluster)
        .await
        .unwrap();

    let report = custom_payload::round_trip(&session, &custom_payload::sample_payload())
        .await
        .unwrap();
    assert_eq!(report.returned, 0);
    assert!(!report.is_ok());
}

#[tokio::test]
async fn replaced_payload_values_are_sent() {
    let cluster = custom_payload::start_cluster("3.0.0").unwrap();
    let session = SessionBuilder::new()
        .contact_points("127.0.0.1")
        .connect(&cluster)
        .await
        .unwrap();

    let mut payload: CustomPayload = custom_payload::sample_payload();
    payload.set("key2", "changed");
    payload.remove("key3");
    let report = custom_payload::round_trip(&session, &payload).await.unwrap();
    assert!(report.is_ok(), "{report}");
    assert_eq!(report.returned, 2);
}
