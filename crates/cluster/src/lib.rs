//! Embedded, in-process Cassandra-like cluster backing the driver contract.
//! Nodes share one schema catalog; sessions parse the supported CQL subset,
//! enforce consistency against live nodes and optionally mirror custom
//! payloads back to the client.

mod builder;
mod cluster;
mod cql;
mod engine;
mod prepared;
mod schema;
mod session;

pub use builder::SessionBuilder;
pub use cluster::{
    EmbeddedCluster, EmbeddedClusterBuilder, QueryHandler, ReleaseVersion, DEFAULT_CLUSTER_NAME,
    DEFAULT_RELEASE_VERSION,
};
pub use prepared::PreparedCache;
pub use session::ClusterSession;

#[cfg(test)]
mod tests;
