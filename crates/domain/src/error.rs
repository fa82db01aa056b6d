//! Driver error codes and the error value every fallible driver call returns.

use strum_macros::{Display, IntoStaticStr};
use thiserror::Error;

/// Common result alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Error codes surfaced by the driver. `LIB_*` codes originate client-side,
/// `SERVER_*` codes mirror the error responses a node sends back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    LibBadParams,
    LibIndexOutOfBounds,
    LibInvalidValueType,
    LibNameDoesNotExist,
    LibNoHostsAvailable,
    LibRequestTimedOut,
    LibMessageEncode,
    LibParameterUnset,
    LibSessionClosed,
    ServerSyntaxError,
    ServerInvalidQuery,
    ServerAlreadyExists,
    ServerUnavailable,
}

impl ErrorCode {
    /// Returns `true` when the code was produced by a node rather than the
    /// client library.
    pub fn is_server_error(self) -> bool {
        matches!(
            self,
            ErrorCode::ServerSyntaxError
                | ErrorCode::ServerInvalidQuery
                | ErrorCode::ServerAlreadyExists
                | ErrorCode::ServerUnavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    code: ErrorCode,
    message: String,
}

impl DriverError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LibBadParams, message)
    }

    pub fn index_out_of_bounds(index: usize, len: usize) -> Self {
        Self::new(
            ErrorCode::LibIndexOutOfBounds,
            format!("index {index} is out of bounds (length {len})"),
        )
    }

    pub fn invalid_value_type(expected: &str, actual: &str) -> Self {
        Self::new(
            ErrorCode::LibInvalidValueType,
            format!("expected a {expected} value but found {actual}"),
        )
    }

    pub fn name_does_not_exist(name: &str) -> Self {
        Self::new(
            ErrorCode::LibNameDoesNotExist,
            format!("no bind marker or column named `{name}`"),
        )
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerSyntaxError, message)
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerInvalidQuery, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_in_screaming_snake_case() {
        assert_eq!(ErrorCode::LibNoHostsAvailable.to_string(), "LIB_NO_HOSTS_AVAILABLE");
        assert_eq!(ErrorCode::ServerInvalidQuery.as_str(), "SERVER_INVALID_QUERY");
    }

    #[test]
    fn error_displays_its_message() {
        let err = DriverError::index_out_of_bounds(3, 2);
        assert_eq!(err.code(), ErrorCode::LibIndexOutOfBounds);
        assert_eq!(err.to_string(), "index 3 is out of bounds (length 2)");
        assert!(!err.code().is_server_error());
        assert!(DriverError::syntax("bad").code().is_server_error());
    }
}
