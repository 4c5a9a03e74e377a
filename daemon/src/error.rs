//! Query error taxonomy

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("no devices matched the request")]
    NoDevicesResolved,

    #[error("no processes found in the requested window")]
    NoProcessesInWindow,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

impl QueryError {
    /// Stable name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::InvalidRequest(_) => "invalid_request",
            QueryError::TenantNotFound(_) => "tenant_not_found",
            QueryError::NoDevicesResolved => "no_devices_resolved",
            QueryError::NoProcessesInWindow => "no_processes_in_window",
            QueryError::StorageUnavailable(_) => "storage_unavailable",
            QueryError::Timeout(_) => "timeout",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, QueryError::InvalidRequest(_))
    }

    /// Message for outcomes that end a query with an empty result instead of a failure.
    /// `None` for hard failures.
    pub fn empty_message(&self) -> Option<&'static str> {
        match self {
            QueryError::TenantNotFound(_) => Some("tenant not found"),
            QueryError::NoDevicesResolved => Some("no devices found"),
            QueryError::NoProcessesInWindow => Some("no processes found"),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(e: rusqlite::Error) -> Self {
        QueryError::StorageUnavailable(e.to_string())
    }
}
