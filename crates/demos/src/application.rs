use cqlkit_cluster::{EmbeddedCluster, SessionBuilder, DEFAULT_RELEASE_VERSION};
use cqlkit_domain::{
    config::{split_host_port, ClusterConfig, ConfigError},
    services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError, TelemetryGuard},
    DriverError, Session,
};
use thiserror::Error;
use tracing::info;

use crate::{collections, custom_payload};

/// Loads cluster settings and installs telemetry under `prefix`.
pub fn bootstrap(prefix: &str) -> Result<(ClusterConfig, TelemetryGuard), DemoError> {
    let config = ClusterConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env(prefix);
    let telemetry = init_telemetry(&telemetry_config)?;
    Ok((config, telemetry))
}

/// Starts one embedded node per configured contact point, listening on the
/// port those contact points name.
pub fn local_cluster(config: &ClusterConfig) -> Result<EmbeddedCluster, DemoError> {
    let port = config.shared_port()?;
    let cluster = config
        .contact_points()
        .iter()
        .fold(EmbeddedCluster::builder().port(port), |builder, contact_point| {
            builder.node(split_host_port(contact_point).0)
        })
        .start()?;
    Ok(cluster)
}

pub async fn run_collections() -> Result<(), DemoError> {
    let (config, telemetry) = bootstrap("COLLECTIONS")?;
    let cluster = local_cluster(&config)?;

    let builder = SessionBuilder::from_config(&config)
        .slow_request_threshold(telemetry.slow_request_threshold());
    let session = collections::connect_session(&cluster, builder).await?;
    let result = collections::run(
        &session,
        collections::DEFAULT_KEY,
        &collections::DEFAULT_ITEMS,
    )
    .await;
    session.shutdown().await?;
    result?;
    Ok(())
}

pub async fn run_custom_payload() -> Result<(), DemoError> {
    let (_config, _telemetry) = bootstrap("CUSTOM_PAYLOAD")?;
    let report = custom_payload::run(DEFAULT_RELEASE_VERSION).await?;
    info!(sent = report.sent, returned = report.returned, "payload verified");
    println!("{report}");
    Ok(())
}

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("unsupported cluster: {0}")]
    Unsupported(String),
    #[error("verification failed: {0}")]
    Verification(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ported_contact_points_reach_the_cluster() {
        let config = ClusterConfig::default().with_contact_points("127.0.0.1:9142,127.0.0.2:9142");
        let cluster = local_cluster(&config).unwrap();
        assert_eq!(cluster.port(), 9142);

        let session = collections::connect_session(&cluster, SessionBuilder::from_config(&config))
            .await
            .unwrap();
        assert_eq!(session.hosts().len(), 2);
        session.shutdown().await.unwrap();
    }

    #[test]
    fn mixed_ports_are_a_config_error() {
        let config = ClusterConfig::default().with_contact_points("127.0.0.1:9142,127.0.0.2");
        assert!(matches!(
            local_cluster(&config),
            Err(DemoError::Config(ConfigError::MixedPorts { first: 9142, other: 9042 }))
        ));
    }

    #[tokio::test]
    async fn default_config_starts_three_nodes() {
        let cluster = local_cluster(&ClusterConfig::default()).unwrap();
        assert_eq!(cluster.live_nodes().await, 3);
    }
}
