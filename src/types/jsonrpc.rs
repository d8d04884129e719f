//! JSON-RPC 2.0 envelope types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-RPC version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// A request ID; either a string or a number per the JSON-RPC spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String request ID
    String(String),
    /// Numeric request ID
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// A JSON-RPC request that expects a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0"
    pub jsonrpc: String,
    /// Unique request identifier
    pub id: RequestId,
    /// Method name to invoke
    pub method: String,
    /// Optional method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new request.
    pub fn new(
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: Option<serde_json::Value>,
    ) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC notification (no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Must be "2.0"
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Must be "2.0"
    pub jsonrpc: String,
    /// Request ID this response corresponds to
    pub id: RequestId,
    /// Either result or error must be present
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

/// Response payload; exactly one of result or error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    /// Successful result
    Result(serde_json::Value),
    /// Error response
    Error(JsonRpcError),
}

impl JsonRpcResponse {
    /// Create a successful response.
    pub fn success(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result(result),
        }
    }

    /// Create an error response.
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    /// Check if this is a successful response.
    pub fn is_success(&self) -> bool {
        matches!(self.payload, ResponsePayload::Result(_))
    }

    /// Get the error if this is an error response.
    pub fn get_error(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            ResponsePayload::Error(e) => Some(e),
            ResponsePayload::Result(_) => None,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Create a new error object.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<crate::Error> for JsonRpcError {
    fn from(err: crate::Error) -> Self {
        Self {
            code: err.code().as_i32(),
            message: err.to_string(),
            data: err.data().cloned(),
        }
    }
}

/// Raw incoming message, classified before full decoding.
#[derive(Debug, Deserialize)]
pub struct RawMessage {
    /// JSON-RPC version
    pub jsonrpc: String,
    /// Request ID (absent on notifications)
    #[serde(default)]
    pub id: Option<RequestId>,
    /// Method name (absent on responses)
    #[serde(default)]
    pub method: Option<String>,
    /// Raw params
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    /// Result (responses only)
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Error (error responses only)
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl RawMessage {
    /// Determine what kind of message this is.
    pub fn message_type(&self) -> MessageType {
        match (&self.id, &self.method, &self.result, &self.error) {
            (Some(_), Some(_), None, None) => MessageType::Request,
            (None, Some(_), None, None) => MessageType::Notification,
            (Some(_), None, Some(_), None) | (Some(_), None, None, Some(_)) => {
                MessageType::Response
            },
            _ => MessageType::Invalid,
        }
    }
}

/// Classification of a raw JSON-RPC message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Request (has id and method)
    Request,
    /// Notification (method, no id)
    Notification,
    /// Response (id plus result or error)
    Response,
    /// Not a valid JSON-RPC message
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_id_round_trips() {
        assert_eq!(json!(RequestId::from("req-1")), json!("req-1"));
        assert_eq!(json!(RequestId::from(42i64)), json!(42));
    }

    #[test]
    fn response_success_shape() {
        let response = JsonRpcResponse::success(RequestId::from(1i64), json!({"ok": true}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["result"]["ok"], true);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn response_error_shape() {
        let response = JsonRpcResponse::error(
            RequestId::from("a"),
            JsonRpcError::new(-32601, "method not found"),
        );
        assert!(!response.is_success());
        assert_eq!(response.get_error().unwrap().code, -32601);
    }

    #[test]
    fn raw_message_classification() {
        let request: RawMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/list"
        }))
        .unwrap();
        assert_eq!(request.message_type(), MessageType::Request);

        let notification: RawMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 1}
        }))
        .unwrap();
        assert_eq!(notification.message_type(), MessageType::Notification);

        let invalid: RawMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0"})).unwrap();
        assert_eq!(invalid.message_type(), MessageType::Invalid);
    }

    #[test]
    fn error_taxonomy_maps_to_wire_codes() {
        let err: JsonRpcError = crate::Error::not_found("series XXXXX not found").into();
        assert_eq!(err.code, -32011);
        assert!(err.message.contains("XXXXX"));
    }
}
