//! JSON-RPC 2.0 message types, server side.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 request. A request without an id is a notification and
/// gets no response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    /// `null` when the request could not be read far enough to find its id.
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.code;
        let message = &self.message;
        write!(f, "[{code}] {message}")
    }
}

impl std::error::Error for JsonRpcError {}

/// Engine errors on the wire: a code per kind, with the kind name and
/// whether a retry can help in `data`.
impl From<engine::Error> for JsonRpcError {
    fn from(e: engine::Error) -> Self {
        use engine::Error as E;
        let code = match &e {
            E::NotConnected(_) => -32001,
            E::NotAuthenticated => -32002,
            E::EvidenceInvalid(_) => -32003,
            E::ScopeExceeded(_) => -32004,
            E::GrantNotFound(_) => -32005,
            E::PolicyNotFound(_) => -32006,
            E::AppealNotFound(_) => -32007,
            E::InterventionNotFound(_) => -32008,
            E::ThresholdNotReached { .. } => -32009,
            E::ConcurrentModification(_) => -32010,
            E::Expired(_) => -32011,
            E::NotPermitted(_) => -32012,
            E::InvalidTransition(_) => -32013,
            E::Invalid(_) => INVALID_PARAMS,
            _ => INTERNAL_ERROR,
        };
        Self {
            code,
            message: e.to_string(),
            data: Some(serde_json::json!({
                "kind": e.kind(),
                "retryable": e.is_retryable(),
            })),
        }
    }
}

impl From<crate::Error> for JsonRpcError {
    fn from(e: crate::Error) -> Self {
        match e {
            e @ crate::Error::Wire { .. } => Self::invalid_params(e.to_string()),
            other => Self::new(INTERNAL_ERROR, other.to_string()),
        }
    }
}

/// Request ID (can be string or number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_request() {
        let json = r#"{"jsonrpc":"2.0","id":7,"method":"get_my_stewards"}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.id, Some(RequestId::Number(7)));
        assert!(req.params.is_null());
    }

    #[test]
    fn notification_has_no_id() {
        let json = r#"{"jsonrpc":"2.0","method":"sweep","params":{}}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert!(req.id.is_none());
    }

    #[test]
    fn serialize_failure() {
        let resp = JsonRpcResponse::failure(
            Some("a".into()),
            JsonRpcError::new(METHOD_NOT_FOUND, "no such method"),
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"code\":-32601"));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn engine_errors_carry_kind_and_retryability() {
        let err = JsonRpcError::from(engine::Error::ConcurrentModification("v3".into()));
        assert_eq!(err.code, -32010);
        let data = err.data.unwrap();
        assert_eq!(data["kind"], "concurrent_modification");
        assert_eq!(data["retryable"], true);

        let err = JsonRpcError::from(engine::Error::Invalid("bad".into()));
        assert_eq!(err.code, INVALID_PARAMS);
        assert_eq!(err.data.unwrap()["retryable"], false);
    }
}
