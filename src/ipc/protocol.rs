//! Plugin protocol message types.
//!
//! Host and plugin exchange newline-delimited JSON-RPC 2.0 messages over
//! the plugin's stdio. Every request names the calling package so the
//! plugin can apply its grant set.

use serde::{Deserialize, Serialize};
use serde_json::Value;


/// Out-of-band call on the endpoint (`GetType`, `GetState`, ...).
pub const METHOD_CALL: &str = "call";
/// Row query against a `content://` address.
pub const METHOD_QUERY: &str = "query";
/// Notification cancelling an in-flight request.
pub const METHOD_CANCEL: &str = "$/cancelRequest";

/// Malformed request object or params.
pub const INVALID_PARAMS: i32 = -32602;
/// Method or out-of-band call not supported.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Internal plugin failure.
pub const INTERNAL_ERROR: i32 = -32603;
/// Caller is not allowed to talk to this endpoint.
pub const PERMISSION_DENIED: i32 = -32001;

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Method name
    pub method: String,
    /// Parameters (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self { jsonrpc: "2.0".to_string(), id: id.into(), method: method.into(), params }
    }
}

/// JSON-RPC request ID (can be string or number).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    /// String ID
    String(String),
    /// Numeric ID
    Number(i64),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Result (if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Successful response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    /// Error response.
    pub fn failure(id: RequestId, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
        }
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Get the result value. A `null` or missing result decodes as `None`.
    pub fn into_result<T: for<'de> Deserialize<'de>>(self) -> Result<Option<T>, JsonRpcError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        match self.result {
            None | Some(Value::Null) => Ok(None),
            Some(result) => serde_json::from_value(result).map(Some).map_err(|e| JsonRpcError {
                code: INTERNAL_ERROR,
                message: format!("Failed to parse result: {}", e),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// JSON-RPC 2.0 notification (no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self { jsonrpc: "2.0".to_string(), method: method.into(), params }
    }
}

/// Any message a plugin reads: a request when `id` is present, a
/// notification otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    /// Request ID, absent for notifications
    #[serde(default)]
    pub id: Option<RequestId>,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default)]
    pub params: Option<Value>,
}

// ============================================================================
// Method parameters
// ============================================================================

/// Parameters of [`METHOD_CALL`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallParams {
    /// Calling package.
    pub caller: String,
    /// Out-of-band method name.
    pub method: String,
}

/// Parameters of [`METHOD_QUERY`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParams {
    /// Calling package.
    pub caller: String,
    /// `content://` address.
    pub address: String,
}

/// Parameters of [`METHOD_CANCEL`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelParams {
    /// ID of the request to cancel.
    pub id: RequestId,
}
