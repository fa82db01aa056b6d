//! Sends a custom payload with `SELECT * FROM system.local` and checks that
//! a mirroring node hands the same payload back.

use std::fmt;

use cqlkit_cluster::{EmbeddedCluster, QueryHandler, SessionBuilder};
use cqlkit_domain::{CustomPayload, DriverResult, Session, Statement};
use tracing::{debug, info};

use crate::application::DemoError;

const QUERY: &str = "SELECT * FROM system.local";

pub fn sample_payload() -> CustomPayload {
    [("key1", "value1"), ("key2", "value2"), ("key3", "value3")]
        .into_iter()
        .collect()
}

/// Outcome of comparing the returned payload to the one sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadReport {
    pub sent: usize,
    pub returned: usize,
    pub mismatches: Vec<String>,
}

impl PayloadReport {
    pub fn is_ok(&self) -> bool {
        self.sent == self.returned && self.mismatches.is_empty()
    }
}

impl fmt::Display for PayloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sent {} item(s), received {}", self.sent, self.returned)?;
        for mismatch in &self.mismatches {
            write!(f, "; {mismatch}")?;
        }
        Ok(())
    }
}

/// Starts a single node that mirrors custom payloads.
pub fn start_cluster(release_version: &str) -> DriverResult<EmbeddedCluster> {
    EmbeddedCluster::builder()
        .node("127.0.0.1")
        .release_version(release_version)
        .query_handler(QueryHandler::MirrorCustomPayload)
        .start()
}

/// Custom payloads need Cassandra 2.2 or later.
pub fn ensure_supported(cluster: &EmbeddedCluster) -> Result<(), DemoError> {
    let version = cluster.release_version();
    if version.supports_custom_payload() {
        Ok(())
    } else {
        Err(DemoError::Unsupported(format!(
            "custom payloads require Cassandra 2.2 or later, cluster runs {version}"
        )))
    }
}

pub async fn round_trip<S: Session>(session: &S, payload: &CustomPayload) -> DriverResult<PayloadReport> {
    let mut statement = Statement::new(QUERY, 0);
    statement.set_custom_payload(payload.clone());
    let response = session.execute(&statement).await?;

    let returned = response.custom_payload_item_count();
    let mut mismatches = Vec::new();
    for index in 0..returned {
        let (name, value) = response.custom_payload_item(index)?;
        debug!(index, name, "payload item returned");
        match payload.get(name) {
            Some(expected) if expected == value => {}
            Some(_) => mismatches.push(format!("value of `{name}` differs")),
            None => mismatches.push(format!("unexpected key `{name}`")),
        }
    }

    Ok(PayloadReport {
        sent: payload.len(),
        returned,
        mismatches,
    })
}

/// Full scenario: start the cluster, connect, round-trip the sample payload
/// and shut down. Fails when the payload does not come back intact.
pub async fn run(release_version: &str) -> Result<PayloadReport, DemoError> {
    let cluster = start_cluster(release_version)?;
    ensure_supported(&cluster)?;

    let session = SessionBuilder::new()
        .contact_points("127.0.0.1")
        .connect(&cluster)
        .await?;
    let report = round_trip(&session, &sample_payload()).await;
    session.shutdown().await?;
    let report = report?;

    if !report.is_ok() {
        return Err(DemoError::Verification(report.to_string()));
    }
    info!(%report, "custom payload mirrored");
    Ok(report)
}
