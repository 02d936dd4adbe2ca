//! JSON-RPC 2.0 envelope used on the `/mcp` stream: client-initiated
//! requests/notifications, responses, and the server-initiated requests the
//! sampling round-trip relies on all share this shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::GatewayError;

pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Custom MCP-gateway codes in the reserved server-error range, one per
/// kind named in the error-handling design that has no natural JSON-RPC
/// equivalent.
pub mod gateway_error_codes {
    pub const AUTHENTICATION_REQUIRED: i64 = -32001;
    pub const SESSION_NOT_FOUND: i64 = -32002;
    pub const INVALID_ARGUMENTS: i64 = -32003;
    pub const NOT_FOUND: i64 = -32004;
    pub const DEADLINE_EXCEEDED: i64 = -32005;
    pub const TRANSPORT_CLOSED: i64 = -32006;
    pub const RATE_LIMITED: i64 = -32007;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId::String(value)
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(flatten, skip_serializing_if = "HashMap::is_empty", default)]
    pub meta: HashMap<String, Value>,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id: Some(id),
            meta: HashMap::new(),
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id: None,
            meta: HashMap::new(),
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<RequestId>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(error_codes::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message.into())
    }

    /// Builds the JSON-RPC error object for a [`GatewayError`], carrying its
    /// stable `kind` in `data.kind` so clients can branch on it without
    /// string-matching `message`.
    pub fn from_gateway_error(err: &GatewayError) -> Self {
        let code = match err {
            GatewayError::AuthenticationRequired => gateway_error_codes::AUTHENTICATION_REQUIRED,
            GatewayError::SessionNotFound(_) => gateway_error_codes::SESSION_NOT_FOUND,
            GatewayError::InvalidArguments { .. } => gateway_error_codes::INVALID_ARGUMENTS,
            GatewayError::NotFound(_) => gateway_error_codes::NOT_FOUND,
            GatewayError::DeadlineExceeded => gateway_error_codes::DEADLINE_EXCEEDED,
            GatewayError::TransportClosed => gateway_error_codes::TRANSPORT_CLOSED,
            GatewayError::RateLimited => gateway_error_codes::RATE_LIMITED,
            GatewayError::InvalidToken(_) => error_codes::INVALID_PARAMS,
            _ => error_codes::INTERNAL_ERROR,
        };
        let mut data = serde_json::json!({ "kind": err.kind() });
        if let GatewayError::InvalidArguments { paths } = err {
            data["paths"] = serde_json::json!(paths);
        }
        Self::new(code, err.description()).with_data(data)
    }
}

/// Any one of the three message shapes that can arrive on, or be pushed
/// onto, the `/mcp` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    pub fn get_id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(r) => r.id.as_ref(),
            JsonRpcMessage::Response(r) => r.id.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_has_no_id() {
        let n = JsonRpcRequest::notification("notifications/progress", Some(json!({"value": 1})));
        assert!(n.is_notification());
    }

    #[test]
    fn request_round_trips_through_json() {
        let req = JsonRpcRequest::new("tools/call", Some(json!({"name": "x"})), RequestId::Number(1));
        let text = serde_json::to_string(&req).unwrap();
        let back: JsonRpcRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(back.method, "tools/call");
        assert_eq!(back.id, Some(RequestId::Number(1)));
    }

    #[test]
    fn gateway_error_carries_kind_in_data() {
        let err = GatewayError::SessionNotFound("S-unknown".to_string());
        let rpc = JsonRpcError::from_gateway_error(&err);
        assert_eq!(rpc.code, gateway_error_codes::SESSION_NOT_FOUND);
        assert_eq!(rpc.data.unwrap()["kind"], "session_not_found");
    }
}
