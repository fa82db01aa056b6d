use std::{net::IpAddr, time::Duration};

use cqlkit_domain::{
    config::{split_contact_points, ClusterConfig, DEFAULT_PORT, DEFAULT_PROTOCOL_VERSION, DEFAULT_REQUEST_TIMEOUT_MS},
    Consistency, DriverError, DriverResult, ErrorCode,
};
use tracing::{info, warn};

use crate::{cluster::parse_address, session::SessionOptions, ClusterSession, EmbeddedCluster};

const MIN_PROTOCOL_VERSION: u8 = 3;
const MAX_PROTOCOL_VERSION: u8 = 4;

/// Collects session options, then connects to an [`EmbeddedCluster`].
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    contact_points: Vec<String>,
    port: u16,
    protocol_version: u8,
    consistency: Consistency,
    request_timeout: Duration,
    keyspace: Option<String>,
    slow_request_threshold: Option<Duration>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            contact_points: Vec::new(),
            port: DEFAULT_PORT,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            consistency: Consistency::default(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            keyspace: None,
            slow_request_threshold: None,
        }
    }

    pub fn from_config(config: &ClusterConfig) -> Self {
        Self {
            contact_points: config.contact_points().to_vec(),
            port: config.port(),
            protocol_version: config.protocol_version(),
            consistency: config.consistency(),
            request_timeout: config.request_timeout(),
            keyspace: None,
            slow_request_threshold: None,
        }
    }

    /// Adds contact points; accepts a comma separated list of `host` or
    /// `host:port` entries.
    pub fn contact_points(mut self, contact_points: &str) -> Self {
        self.contact_points
            .extend(split_contact_points(contact_points));
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Highest native protocol version the session may negotiate.
    pub fn protocol_version(mut self, version: u8) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    /// Requests slower than this are logged at warn level.
    pub fn slow_request_threshold(mut self, threshold: Duration) -> Self {
        self.slow_request_threshold = Some(threshold);
        self
    }

    pub async fn connect(self, cluster: &EmbeddedCluster) -> DriverResult<ClusterSession> {
        if self.contact_points.is_empty() {
            return Err(DriverError::new(
                ErrorCode::LibNoHostsAvailable,
                "No hosts available: no contact points configured",
            ));
        }
        if !(MIN_PROTOCOL_VERSION..=MAX_PROTOCOL_VERSION).contains(&self.protocol_version) {
            return Err(DriverError::bad_params(format!(
                "unsupported protocol version {}",
                self.protocol_version
            )));
        }

        let mut hosts = Vec::with_capacity(self.contact_points.len());
        let mut tried = Vec::with_capacity(self.contact_points.len());
        for contact_point in &self.contact_points {
            let (address, port) = parse_contact_point(contact_point, self.port)?;
            tried.push(format!("{address}:{port}"));
            if port == cluster.port() && cluster.is_up(address).await {
                if !hosts.contains(&address) {
                    hosts.push(address);
                }
            } else {
                warn!(%address, port, "contact point unreachable");
            }
        }
        if hosts.is_empty() {
            return Err(DriverError::new(
                ErrorCode::LibNoHostsAvailable,
                format!("No hosts available for the control connection (tried: {})", tried.join(", ")),
            ));
        }

        let protocol_version = self.protocol_version.min(cluster.native_protocol_version());
        let session = ClusterSession::new(
            cluster.clone(),
            SessionOptions {
                hosts,
                protocol_version,
                consistency: self.consistency,
                request_timeout: self.request_timeout,
                slow_request_threshold: self.slow_request_threshold,
            },
        );
        info!(
            cluster = %cluster.name(),
            protocol_version,
            hosts = session.hosts().len(),
            "session connected"
        );

        if let Some(keyspace) = &self.keyspace {
            session.use_keyspace(keyspace).await?;
        }
        Ok(session)
    }
}

/// Splits `host[:port]`, falling back to `default_port`.
fn parse_contact_point(contact_point: &str, default_port: u16) -> DriverResult<(IpAddr, u16)> {
    let invalid = || DriverError::bad_params(format!("invalid contact point `{contact_point}`"));
    let contact_point = contact_point.trim();
    if let Ok(address) = parse_address(contact_point) {
        return Ok((address, default_port));
    }
    let (host, port) = contact_point.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let address = parse_address(host).map_err(|_| invalid())?;
    let port = port.parse().map_err(|_| invalid())?;
    Ok((address, port))
}
