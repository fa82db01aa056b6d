//! Driver contract shared by the cluster backend and the demo binaries:
//! values and collections, statements with custom payloads, result
//! iteration, error codes and the async `Session` seam. Configuration and
//! telemetry helpers live here too so every binary boots the same way.

pub mod config;
pub mod error;
pub mod model;
pub mod services;
pub mod session;

pub use error::{DriverError, DriverResult, ErrorCode};
pub use model::*;
pub use session::Session;
