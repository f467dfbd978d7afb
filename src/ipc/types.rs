//! JSON-RPC 2.0 message types for the bridge channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// JSON-RPC 2.0 request ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId::Number(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Create a new request with the given method and parameters.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 error data with the bridge's `kind` field.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub kind: String,
    #[serde(default)]
    pub details: Option<Value>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<ErrorData>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl Response {
    /// Check if this is a successful response.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.result.is_some()
    }

    /// Get the error kind string if this is an error response.
    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref()?.data.as_ref()?.kind.as_str().into()
    }
}

/// JSON-RPC 2.0 notification (no id).
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Incoming message that could be either a response or notification.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IncomingMessage {
    Response(Response),
    Notification(Notification),
}

impl IncomingMessage {
    /// Check if this message has an ID (i.e., is a response, not a notification).
    pub fn has_id(&self) -> bool {
        match self {
            IncomingMessage::Response(r) => r.id.is_some(),
            IncomingMessage::Notification(_) => false,
        }
    }
}

/// RPC method names used against the bridge.
pub mod methods {
    /// Liveness probe.
    pub const SYSTEM_PING: &str = "system.ping";
    /// Graceful bridge shutdown.
    pub const SYSTEM_SHUTDOWN: &str = "system.shutdown";
    /// Per-integration status query backing the tray counter.
    pub const STATUS_GET_INTEGRATIONS: &str = "status.get_integrations";
}

/// Timeout configuration for RPC methods.
pub struct TimeoutConfig;

impl TimeoutConfig {
    /// Get the timeout duration for a method.
    pub fn get(method: &str) -> Duration {
        use phf::phf_map;

        static TIMEOUTS: phf::Map<&'static str, u64> = phf_map! {
            "system.ping" => 1,
            "system.shutdown" => 2,
            // The status query fans out to every connector on the backend
            "status.get_integrations" => 15,
        };

        let secs = TIMEOUTS.get(method).copied().unwrap_or(5);
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::new(1u64, methods::STATUS_GET_INTEGRATIONS, None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"status.get_integrations\""));
        assert!(!json.contains("\"params\""));
    }

    #[test]
    fn test_timeout_config() {
        assert_eq!(
            TimeoutConfig::get(methods::SYSTEM_PING),
            Duration::from_secs(1)
        );
        assert_eq!(
            TimeoutConfig::get(methods::STATUS_GET_INTEGRATIONS),
            Duration::from_secs(15)
        );
        assert_eq!(TimeoutConfig::get("unknown.method"), Duration::from_secs(5));
    }

    #[test]
    fn test_response_parsing() {
        let json =
            r#"{"jsonrpc":"2.0","id":1,"result":[{"name":"Shopify","failed_jobs_count":2}]}"#;
        let resp: Response = serde_json::from_str(json).unwrap();
        assert!(resp.is_success());
        assert!(resp.id.is_some());
    }

    #[test]
    fn test_error_response_parsing() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"Query failed","data":{"kind":"E_QUERY_FAILED"}}}"#;
        let resp: Response = serde_json::from_str(json).unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.error_kind(), Some("E_QUERY_FAILED"));
    }

    #[test]
    fn test_notification_parsing() {
        let json = r#"{"jsonrpc":"2.0","method":"event.backend_state","params":{"state":"ready"}}"#;
        let notif: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(notif.method, "event.backend_state");
    }

    #[test]
    fn test_incoming_message_without_id_is_not_a_response() {
        // Untagged enums can parse notifications as Response with id: None;
        // has_id() is the reliable discriminator.
        let json = r#"{"jsonrpc":"2.0","method":"event.backend_state","params":{}}"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();
        assert!(!msg.has_id());
    }
}
