use std::{
    fmt,
    future::Future,
    net::IpAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::Utc;
use cqlkit_domain::{
    derive_prepared_id, Consistency, CustomPayload, DriverError, DriverResult, ErrorCode,
    PreparedStatement, Response, Session, Statement,
};
use metrics::{counter, histogram};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    cluster::QueryHandler,
    cql,
    engine::{self, ExecutionContext, Outcome},
    prepared::PreparedCache,
    EmbeddedCluster,
};

const DEFAULT_SLOW_REQUEST: Duration = Duration::from_millis(500);

pub(crate) struct SessionOptions {
    pub hosts: Vec<IpAddr>,
    pub protocol_version: u8,
    pub consistency: Consistency,
    pub request_timeout: Duration,
    pub slow_request_threshold: Option<Duration>,
}

struct SessionInner {
    cluster: EmbeddedCluster,
    hosts: Vec<IpAddr>,
    protocol_version: u8,
    consistency: Consistency,
    request_timeout: Duration,
    slow_request_threshold: Duration,
    keyspace: RwLock<Option<String>>,
    next_host: AtomicUsize,
    closed: AtomicBool,
    prepared: PreparedCache,
    prepared_schema_version: AtomicU64,
}

/// Session connected to an [`EmbeddedCluster`]. Cheap to clone; clones
/// share the connection state, the current keyspace and the prepared cache.
#[derive(Clone)]
pub struct ClusterSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for ClusterSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSession")
            .field("hosts", &self.inner.hosts)
            .field("protocol_version", &self.inner.protocol_version)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ClusterSession {
    pub(crate) fn new(cluster: EmbeddedCluster, options: SessionOptions) -> Self {
        let cluster_schema_version = cluster.schema_version();
        Self {
            inner: Arc::new(SessionInner {
                cluster,
                hosts: options.hosts,
                protocol_version: options.protocol_version,
                consistency: options.consistency,
                request_timeout: options.request_timeout,
                slow_request_threshold: options
                    .slow_request_threshold
                    .unwrap_or(DEFAULT_SLOW_REQUEST),
                keyspace: RwLock::new(None),
                next_host: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                prepared: PreparedCache::default(),
                prepared_schema_version: AtomicU64::new(cluster_schema_version),
            }),
        }
    }

    /// Hosts the session holds connections to.
    pub fn hosts(&self) -> &[IpAddr] {
        &self.inner.hosts
    }

    pub fn protocol_version(&self) -> u8 {
        self.inner.protocol_version
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub async fn keyspace(&self) -> Option<String> {
        self.inner.keyspace.read().await.clone()
    }

    /// Switches the session keyspace, like `USE <keyspace>`.
    pub async fn use_keyspace(&self, keyspace: &str) -> DriverResult<()> {
        let statement = Statement::new(format!("USE {keyspace}"), 0);
        self.execute(&statement).await.map(|_| ())
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.is_closed() {
            return Err(DriverError::new(
                ErrorCode::LibSessionClosed,
                "Session is closed",
            ));
        }
        Ok(())
    }

    /// Picks the next live host in round-robin order.
    async fn coordinator(&self) -> DriverResult<IpAddr> {
        let hosts = &self.inner.hosts;
        let start = self.inner.next_host.fetch_add(1, Ordering::Relaxed);
        for offset in 0..hosts.len() {
            let host = hosts[(start + offset) % hosts.len()];
            if self.inner.cluster.is_up(host).await {
                return Ok(host);
            }
        }
        Err(DriverError::new(
            ErrorCode::LibNoHostsAvailable,
            "All hosts in current policy attempted and were either unavailable or failed",
        ))
    }

    /// Bounds `request` by the request timeout and records metrics.
    async fn timed<T>(
        &self,
        operation: &'static str,
        request: impl Future<Output = DriverResult<T>>,
    ) -> DriverResult<T> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.inner.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::new(
                ErrorCode::LibRequestTimedOut,
                format!(
                    "Request timed out after {} ms",
                    self.inner.request_timeout.as_millis()
                ),
            )),
        };
        let elapsed = started.elapsed();

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.code().as_str(),
        };
        counter!("cqlkit_requests_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        histogram!("cqlkit_request_duration_seconds", "operation" => operation)
            .record(elapsed.as_secs_f64());
        if elapsed >= self.inner.slow_request_threshold {
            warn!(operation, elapsed_ms = elapsed.as_millis() as u64, "slow request");
        }
        result
    }

    async fn run(&self, statement: &Statement) -> DriverResult<Response> {
        self.ensure_open()?;
        let payload = statement.custom_payload().filter(|payload| !payload.is_empty());
        if payload.is_some() && self.inner.protocol_version < 4 {
            return Err(DriverError::new(
                ErrorCode::LibMessageEncode,
                format!(
                    "Custom payloads are only supported with protocol version 4 or later (negotiated {})",
                    self.inner.protocol_version
                ),
            ));
        }

        let parsed = cql::parse(statement.query())?;
        let values = engine::bind_values(&parsed, statement)?;
        let coordinator = self.coordinator().await?;
        let session_keyspace = self.keyspace().await;
        let ctx = ExecutionContext {
            values: &values,
            keyspace: statement.keyspace().or(session_keyspace.as_deref()),
            consistency: statement.consistency().unwrap_or(self.inner.consistency),
            live_nodes: self.inner.cluster.live_nodes().await,
            timestamp: statement
                .timestamp()
                .unwrap_or_else(|| Utc::now().timestamp_micros()),
            page_size: statement.page_size(),
            paging_state: statement.paging_state(),
        };
        debug!(
            %coordinator,
            kind = parsed.statement.kind(),
            consistency = %ctx.consistency,
            "sending request"
        );

        let outcome = self.inner.cluster.execute(&parsed, &ctx).await?;
        if let Outcome::KeyspaceChanged(keyspace) = &outcome {
            *self.inner.keyspace.write().await = Some(keyspace.clone());
        }

        let returned = match (self.inner.cluster.query_handler(), payload) {
            (QueryHandler::MirrorCustomPayload, Some(payload)) => payload.clone(),
            _ => CustomPayload::new(),
        };
        Ok(Response::new(outcome.into_result_set(), returned, Vec::new()))
    }

    async fn prepare_query(&self, query: &str) -> DriverResult<PreparedStatement> {
        self.ensure_open()?;
        let keyspace = self.keyspace().await;
        let id = derive_prepared_id(keyspace.as_deref(), query);
        let schema_version = self.inner.cluster.schema_version();
        if self
            .inner
            .prepared_schema_version
            .swap(schema_version, Ordering::AcqRel)
            != schema_version
        {
            self.inner.prepared.clear();
            debug!(schema_version, "schema changed, prepared statements dropped");
        }
        if let Some(prepared) = self.inner.prepared.get(&id) {
            debug!(%id, "prepared statement cache hit");
            return Ok(prepared);
        }

        let parsed = cql::parse(query)?;
        self.coordinator().await?;
        let columns = self
            .inner
            .cluster
            .result_columns(&parsed, keyspace.as_deref())
            .await?;
        let prepared = PreparedStatement::new(query, keyspace, parsed.marker_names(), columns);
        self.inner.prepared.insert(prepared.clone());
        debug!(%id, "statement prepared");
        Ok(prepared)
    }
}

#[async_trait]
impl Session for ClusterSession {
    async fn execute(&self, statement: &Statement) -> DriverResult<Response> {
        self.timed("execute", self.run(statement)).await
    }

    async fn prepare(&self, query: &str) -> DriverResult<PreparedStatement> {
        self.timed("prepare", self.prepare_query(query)).await
    }

    async fn shutdown(&self) -> DriverResult<()> {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.prepared.clear();
            info!(cluster = %self.inner.cluster.name(), "session closed");
        }
        Ok(())
    }
}
