//! JSON-RPC 2.0 message types.
//!
//! Only what the device channel needs: outbound requests and notifications,
//! inbound responses and notifications. Requests initiated by the device
//! are recognized so they can be logged and ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::McpError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Request id. Devices echo whatever we send, but some firmware turns
/// numbers into strings, so both forms are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// Normalize so `7` and `"7"` address the same waiter.
    #[must_use]
    pub fn normalized(&self) -> Self {
        match self {
            Self::String(s) => s.parse().map_or_else(|_| self.clone(), Self::Number),
            Self::Number(_) => self.clone(),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Option<RequestId>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Split into the result value or the device-reported error.
    pub fn into_result(self) -> Result<Value, McpError> {
        if let Some(err) = self.error {
            return Err(McpError::Server {
                code: err.code,
                message: err.message,
            });
        }
        self.result
            .ok_or_else(|| McpError::Protocol("Missing result in response".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Any inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
    /// A request initiated by the device. Not served.
    Request { id: RequestId, method: String },
}

impl Inbound {
    /// Classify a payload by the members it carries.
    pub fn decode(payload: Value) -> Result<Self, McpError> {
        let Value::Object(map) = &payload else {
            return Err(McpError::Protocol("payload is not an object".to_string()));
        };

        let has_method = map.contains_key("method");
        let has_id = map.get("id").is_some_and(|id| !id.is_null());

        match (has_method, has_id) {
            (true, true) => {
                #[derive(Deserialize)]
                struct Req {
                    id: RequestId,
                    method: String,
                }
                let req: Req = serde_json::from_value(payload)?;
                Ok(Self::Request {
                    id: req.id,
                    method: req.method,
                })
            }
            (true, false) => Ok(Self::Notification(serde_json::from_value(payload)?)),
            (false, _) if map.contains_key("result") || map.contains_key("error") => {
                Ok(Self::Response(serde_json::from_value(payload)?))
            }
            _ => Err(McpError::Protocol(
                "payload is neither request, response nor notification".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_missing_params() {
        let request = JsonRpcRequest::new(RequestId::Number(1), "tools/list", None);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn decode_classifies_messages() {
        let response = Inbound::decode(json!({"jsonrpc":"2.0","id":3,"result":{}})).unwrap();
        assert!(matches!(response, Inbound::Response(r) if r.id == Some(RequestId::Number(3))));

        let notification =
            Inbound::decode(json!({"jsonrpc":"2.0","method":"notifications/tools/list_changed"}))
                .unwrap();
        assert!(matches!(notification, Inbound::Notification(n) if n.params.is_none()));

        let request = Inbound::decode(json!({"jsonrpc":"2.0","id":"a","method":"ping"})).unwrap();
        assert!(matches!(request, Inbound::Request { method, .. } if method == "ping"));

        assert!(Inbound::decode(json!([1, 2])).is_err());
        assert!(Inbound::decode(json!({"jsonrpc":"2.0"})).is_err());
    }

    #[test]
    fn error_response_becomes_server_error() {
        let response = match Inbound::decode(
            json!({"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}),
        )
        .unwrap()
        {
            Inbound::Response(r) => r,
            other => panic!("unexpected {other:?}"),
        };
        match response.into_result() {
            Err(McpError::Server { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn string_ids_normalize_to_numbers() {
        assert_eq!(
            RequestId::String("42".into()).normalized(),
            RequestId::Number(42)
        );
        assert_eq!(
            RequestId::String("abc".into()).normalized(),
            RequestId::String("abc".into())
        );
    }
}
