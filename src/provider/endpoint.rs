//! The plugin side of the process boundary.

use tokio_util::sync::CancellationToken;

use crate::contract::{AddressError, Bundle, QueryAddress, RowSet};
use crate::ipc::protocol::{INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PERMISSION_DENIED};

/// Errors an endpoint reports to its caller.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The caller has no grant.
    #[error("Caller '{0}' is not allowed to access this plugin")]
    PermissionDenied(String),

    /// Unknown out-of-band method or query path.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The query address could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    /// The plugin failed internally.
    #[error("{0}")]
    Internal(String),
}

impl EndpointError {
    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::PermissionDenied(_) => PERMISSION_DENIED,
            Self::Unsupported(_) => METHOD_NOT_FOUND,
            Self::InvalidAddress(_) => INVALID_PARAMS,
            Self::Internal(_) => INTERNAL_ERROR,
        }
    }
}

/// A plugin endpoint: out-of-band calls plus row queries.
///
/// Both methods block the calling thread. Servers call them from a thread
/// dedicated to the request.
pub trait Endpoint: Send + Sync {
    /// Answer an out-of-band call.
    fn call(&self, caller: &str, method: &str) -> Result<Option<Bundle>, EndpointError>;

    /// Answer a row query. `Ok(None)` for "no result", including an
    /// unauthorized caller and a cancelled query.
    fn query(
        &self,
        caller: &str,
        address: &QueryAddress,
        cancel: &CancellationToken,
    ) -> Result<Option<RowSet>, EndpointError>;
}
