use std::{
    fmt,
    net::IpAddr,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use cqlkit_domain::{config::DEFAULT_PORT, CqlType, DriverError, DriverResult, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    cql::{ColumnDefinition, ParsedQuery},
    engine::{self, ExecutionContext, Outcome},
    schema::{Catalog, LOCAL_TABLE, SYSTEM_KEYSPACE},
};

pub const DEFAULT_CLUSTER_NAME: &str = "Test Cluster";
pub const DEFAULT_RELEASE_VERSION: &str = "3.11.4";
const DATA_CENTER: &str = "datacenter1";
const RACK: &str = "rack1";
const PARTITIONER: &str = "org.apache.cassandra.dht.Murmur3Partitioner";

/// Cassandra release a cluster pretends to run. Decides the native protocol
/// version it negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl ReleaseVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }

    /// Custom payloads arrived with Cassandra 2.2.
    pub fn supports_custom_payload(&self) -> bool {
        self.major >= 3 || (self.major == 2 && self.minor >= 2)
    }

    pub fn native_protocol_version(&self) -> u8 {
        if self.supports_custom_payload() {
            4
        } else {
            3
        }
    }

    fn cql_version(&self) -> &'static str {
        if self.supports_custom_payload() {
            "3.4.4"
        } else {
            "3.2.1"
        }
    }
}

impl FromStr for ReleaseVersion {
    type Err = DriverError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || DriverError::bad_params(format!("invalid release version `{value}`"));
        let mut parts = value.trim().split('.');
        let mut next = |required: bool| -> DriverResult<u32> {
            match parts.next() {
                Some(part) => part.parse().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        let version = Self::new(next(true)?, next(true)?, next(false)?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What a node does with a request's custom payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryHandler {
    /// Responses carry no custom payload.
    #[default]
    Default,
    /// Responses echo the request's custom payload.
    MirrorCustomPayload,
}

#[derive(Debug, Clone)]
struct Node {
    address: IpAddr,
    up: bool,
}

struct ClusterInner {
    name: String,
    release: ReleaseVersion,
    handler: QueryHandler,
    latency: Duration,
    port: u16,
    nodes: RwLock<Vec<Node>>,
    catalog: RwLock<Catalog>,
    schema_version: AtomicU64,
}

/// In-process cluster of simulated nodes sharing one schema catalog.
#[derive(Clone)]
pub struct EmbeddedCluster {
    inner: Arc<ClusterInner>,
}

impl fmt::Debug for EmbeddedCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedCluster")
            .field("name", &self.inner.name)
            .field("release", &self.inner.release)
            .field("handler", &self.inner.handler)
            .finish_non_exhaustive()
    }
}

impl EmbeddedCluster {
    pub fn builder() -> EmbeddedClusterBuilder {
        EmbeddedClusterBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn release_version(&self) -> ReleaseVersion {
        self.inner.release
    }

    pub fn query_handler(&self) -> QueryHandler {
        self.inner.handler
    }

    pub fn native_protocol_version(&self) -> u8 {
        self.inner.release.native_protocol_version()
    }

    /// Port every node accepts native connections on.
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub async fn node_addresses(&self) -> Vec<IpAddr> {
        self.inner
            .nodes
            .read()
            .await
            .iter()
            .map(|node| node.address)
            .collect()
    }

    pub async fn is_up(&self, address: IpAddr) -> bool {
        self.inner
            .nodes
            .read()
            .await
            .iter()
            .any(|node| node.address == address && node.up)
    }

    pub async fn live_nodes(&self) -> usize {
        self.inner.nodes.read().await.iter().filter(|node| node.up).count()
    }

    pub async fn stop_node(&self, address: &str) -> DriverResult<()> {
        self.set_node_state(address, false).await
    }

    pub async fn start_node(&self, address: &str) -> DriverResult<()> {
        self.set_node_state(address, true).await
    }

    async fn set_node_state(&self, address: &str, up: bool) -> DriverResult<()> {
        let address = parse_address(address)?;
        let mut nodes = self.inner.nodes.write().await;
        let node = nodes
            .iter_mut()
            .find(|node| node.address == address)
            .ok_or_else(|| DriverError::bad_params(format!("no node at {address}")))?;
        if node.up != up {
            node.up = up;
            info!(%address, up, "node state changed");
        }
        Ok(())
    }

    pub(crate) async fn execute(
        &self,
        parsed: &ParsedQuery,
        ctx: &ExecutionContext<'_>,
    ) -> DriverResult<Outcome> {
        if !self.inner.latency.is_zero() {
            tokio::time::sleep(self.inner.latency).await;
        }
        debug!(kind = parsed.statement.kind(), "executing statement");
        if engine::is_read_only(&parsed.statement) {
            let catalog = self.inner.catalog.read().await;
            engine::execute_read(&catalog, &parsed.statement, ctx)
        } else {
            let mut catalog = self.inner.catalog.write().await;
            let outcome = engine::execute_write(&mut catalog, &parsed.statement, ctx)?;
            if matches!(outcome, Outcome::SchemaChanged) {
                self.inner.schema_version.fetch_add(1, Ordering::AcqRel);
            }
            Ok(outcome)
        }
    }

    /// Bumped by every schema change. Prepared statements from an older
    /// version may describe tables that no longer exist.
    pub(crate) fn schema_version(&self) -> u64 {
        self.inner.schema_version.load(Ordering::Acquire)
    }

    pub(crate) async fn result_columns(
        &self,
        parsed: &ParsedQuery,
        keyspace: Option<&str>,
    ) -> DriverResult<Vec<String>> {
        let catalog = self.inner.catalog.read().await;
        engine::result_columns(&catalog, &parsed.statement, keyspace)
    }
}

/// Parses a node address; `localhost` maps to the loopback address.
pub(crate) fn parse_address(address: &str) -> DriverResult<IpAddr> {
    let address = address.trim();
    if address.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::from([127, 0, 0, 1]));
    }
    address
        .parse()
        .map_err(|_| DriverError::bad_params(format!("invalid node address `{address}`")))
}

pub struct EmbeddedClusterBuilder {
    nodes: Vec<String>,
    release: String,
    name: String,
    handler: QueryHandler,
    latency: Duration,
    port: u16,
}

impl Default for EmbeddedClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedClusterBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            release: DEFAULT_RELEASE_VERSION.to_string(),
            name: DEFAULT_CLUSTER_NAME.to_string(),
            handler: QueryHandler::Default,
            latency: Duration::ZERO,
            port: DEFAULT_PORT,
        }
    }

    pub fn node(mut self, address: impl Into<String>) -> Self {
        self.nodes.push(address.into());
        self
    }

    /// Adds `count` nodes at 127.0.0.1, 127.0.0.2, ...
    pub fn nodes(mut self, count: u8) -> Self {
        self.nodes
            .extend((1..=count).map(|index| format!("127.0.0.{index}")));
        self
    }

    pub fn release_version(mut self, version: impl Into<String>) -> Self {
        self.release = version.into();
        self
    }

    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn query_handler(mut self, handler: QueryHandler) -> Self {
        self.handler = handler;
        self
    }

    /// Delay added to every request a node serves.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Brings every node up. A builder without nodes starts a single node
    /// at 127.0.0.1.
    pub fn start(self) -> DriverResult<EmbeddedCluster> {
        let release: ReleaseVersion = self.release.parse()?;
        let mut addresses = Vec::with_capacity(self.nodes.len().max(1));
        for node in &self.nodes {
            let address = parse_address(node)?;
            if addresses.contains(&address) {
                warn!(%address, "duplicate node address ignored");
                continue;
            }
            addresses.push(address);
        }
        if addresses.is_empty() {
            addresses.push(IpAddr::from([127, 0, 0, 1]));
        }

        let catalog = system_catalog(&self.name, release)?;
        let nodes = addresses
            .into_iter()
            .map(|address| Node { address, up: true })
            .collect::<Vec<_>>();
        info!(
            cluster = %self.name,
            %release,
            nodes = nodes.len(),
            protocol = release.native_protocol_version(),
            "embedded cluster started"
        );

        Ok(EmbeddedCluster {
            inner: Arc::new(ClusterInner {
                name: self.name,
                release,
                handler: self.handler,
                latency: self.latency,
                port: self.port,
                nodes: RwLock::new(nodes),
                catalog: RwLock::new(catalog),
                schema_version: AtomicU64::new(0),
            }),
        })
    }
}

fn system_catalog(cluster_name: &str, release: ReleaseVersion) -> DriverResult<Catalog> {
    let local_columns = [
        ("key", LOCAL_TABLE.to_string()),
        ("cluster_name", cluster_name.to_string()),
        ("release_version", release.to_string()),
        ("cql_version", release.cql_version().to_string()),
        ("data_center", DATA_CENTER.to_string()),
        ("rack", RACK.to_string()),
        ("partitioner", PARTITIONER.to_string()),
        (
            "native_protocol_version",
            release.native_protocol_version().to_string(),
        ),
    ];

    let mut catalog = Catalog::default();
    catalog.create_keyspace(SYSTEM_KEYSPACE, 1, false)?;
    catalog.create_table(
        SYSTEM_KEYSPACE,
        LOCAL_TABLE,
        local_columns
            .iter()
            .map(|(name, _)| ColumnDefinition {
                name: name.to_string(),
                data_type: CqlType::Text,
            })
            .collect(),
        "key",
        false,
    )?;

    let table = catalog.table_mut(SYSTEM_KEYSPACE, LOCAL_TABLE)?;
    let cells = local_columns
        .into_iter()
        .skip(1)
        .map(|(name, value)| (name.to_string(), Value::Text(value)))
        .collect();
    table.upsert(Value::from(LOCAL_TABLE), cells, 0);
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_versions_pick_protocol() {
        let old: ReleaseVersion = "2.1.21".parse().unwrap();
        assert!(!old.supports_custom_payload());
        assert_eq!(old.native_protocol_version(), 3);

        let new: ReleaseVersion = "2.2".parse().unwrap();
        assert!(new.supports_custom_payload());
        assert_eq!(new.to_string(), "2.2.0");
        assert_eq!("3.11.4".parse::<ReleaseVersion>().unwrap().native_protocol_version(), 4);
        assert!("three".parse::<ReleaseVersion>().is_err());
        assert!("3".parse::<ReleaseVersion>().is_err());
    }

    #[tokio::test]
    async fn nodes_can_be_stopped_and_started() {
        let cluster = EmbeddedCluster::builder().nodes(3).start().unwrap();
        assert_eq!(cluster.live_nodes().await, 3);

        cluster.stop_node("127.0.0.2").await.unwrap();
        assert_eq!(cluster.live_nodes().await, 2);
        assert!(!cluster.is_up("127.0.0.2".parse().unwrap()).await);

        cluster.start_node("127.0.0.2").await.unwrap();
        assert_eq!(cluster.live_nodes().await, 3);
        assert!(cluster.stop_node("10.0.0.1").await.is_err());
    }

    #[test]
    fn builder_defaults_to_one_local_node() {
        let cluster = EmbeddedCluster::builder().start().unwrap();
        assert_eq!(cluster.name(), DEFAULT_CLUSTER_NAME);
        assert_eq!(cluster.release_version(), ReleaseVersion::new(3, 11, 4));
        assert_eq!(cluster.query_handler(), QueryHandler::Default);
        assert_eq!(cluster.port(), DEFAULT_PORT);
    }
}
