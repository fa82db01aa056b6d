use async_trait::async_trait;

use crate::error::DriverResult;
use crate::model::{PreparedStatement, Response, Statement};

/// A connected session. Each method resolves once the request completes;
/// awaiting it is the equivalent of waiting on the driver future.
#[async_trait]
pub trait Session: Send + Sync {
    async fn execute(&self, statement: &Statement) -> DriverResult<Response>;

    async fn prepare(&self, query: &str) -> DriverResult<PreparedStatement>;

    /// Closes the session. Subsequent requests fail with
    /// `LIB_SESSION_CLOSED`; closing twice is not an error.
    async fn shutdown(&self) -> DriverResult<()>;
}
