//! Error handling for the integration monitor.
//!
//! This module provides:
//! - Strongly-typed error kinds matching the bridge protocol
//! - A lossless mapping from RPC failures to those kinds
//!
//! Fetch failures never surface as UI banners: the indicator keeps its
//! last committed snapshot and the failure is logged and classified here.

mod kinds;

pub use kinds::ErrorKind;

use serde::Serialize;

use crate::ipc::RpcError;

/// A classified application failure, ready for logging or event payloads.
#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    /// Human-readable message.
    pub message: String,
    /// Classified kind, when the failure maps onto the bridge taxonomy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl AppError {
    /// Wrap a plain message with no protocol classification.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    /// Classify an RPC failure.
    ///
    /// Remote errors carry the bridge's own `E_*` kind; local transport
    /// failures map onto the nearest protocol kind.
    pub fn from_rpc(error: &RpcError) -> Self {
        let kind = match error {
            RpcError::Remote { kind, .. } => ErrorKind::from_bridge(kind),
            RpcError::Timeout { .. } => Some(ErrorKind::Timeout),
            RpcError::Disconnected => Some(ErrorKind::BackendUnavailable),
            RpcError::Protocol(_) | RpcError::Serialization(_) => Some(ErrorKind::ParseError),
            RpcError::Io(_) => Some(ErrorKind::Network),
        };

        Self {
            message: error.to_string(),
            kind,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{}: {}", kind, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}
