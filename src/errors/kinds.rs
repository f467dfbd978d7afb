//! Error kind definitions matching the bridge protocol.
//!
//! These error kinds correspond to the `E_*` codes returned by the
//! integration bridge in JSON-RPC error responses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kinds that can occur in the application.
///
/// These are stable identifiers that can be used for:
/// - Logging and diagnostics
/// - Matching remote failures to local handling policy
///
/// The string representation matches the bridge's `E_*` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // === Connector Errors ===
    /// A connector endpoint could not be reached.
    ConnectorUnreachable,
    /// A connector rejected the bridge's credentials.
    ConnectorAuth,
    /// The status query failed on the backend.
    QueryFailed,

    // === Bridge Lifecycle Errors ===
    /// The bridge process is not running.
    BackendUnavailable,
    /// The bridge is still starting up.
    NotReady,

    // === Network Errors ===
    /// Network error.
    Network,
    /// The backend reported a timeout of its own.
    Timeout,

    // === Protocol Errors ===
    /// Method not found.
    MethodNotFound,
    /// Invalid parameters.
    InvalidParams,
    /// Parse error.
    ParseError,

    // === Internal Errors ===
    /// Resource not found.
    NotFound,
    /// Internal error.
    Internal,
}

impl ErrorKind {
    /// Convert a bridge error kind string to an ErrorKind.
    ///
    /// Returns `None` if the string is not a recognized error kind.
    pub fn from_bridge(kind: &str) -> Option<Self> {
        match kind {
            "E_CONNECTOR_UNREACHABLE" => Some(Self::ConnectorUnreachable),
            "E_CONNECTOR_AUTH" => Some(Self::ConnectorAuth),
            "E_QUERY_FAILED" => Some(Self::QueryFailed),
            "E_BACKEND_UNAVAILABLE" => Some(Self::BackendUnavailable),
            "E_NOT_READY" => Some(Self::NotReady),
            "E_NETWORK" => Some(Self::Network),
            "E_TIMEOUT" => Some(Self::Timeout),
            "E_METHOD_NOT_FOUND" => Some(Self::MethodNotFound),
            "E_INVALID_PARAMS" => Some(Self::InvalidParams),
            "E_PARSE_ERROR" => Some(Self::ParseError),
            "E_NOT_FOUND" => Some(Self::NotFound),
            "E_INTERNAL" => Some(Self::Internal),
            _ => None,
        }
    }

    /// Convert to the bridge error kind string (E_* format).
    pub fn to_bridge(&self) -> &'static str {
        match self {
            Self::ConnectorUnreachable => "E_CONNECTOR_UNREACHABLE",
            Self::ConnectorAuth => "E_CONNECTOR_AUTH",
            Self::QueryFailed => "E_QUERY_FAILED",
            Self::BackendUnavailable => "E_BACKEND_UNAVAILABLE",
            Self::NotReady => "E_NOT_READY",
            Self::Network => "E_NETWORK",
            Self::Timeout => "E_TIMEOUT",
            Self::MethodNotFound => "E_METHOD_NOT_FOUND",
            Self::InvalidParams => "E_INVALID_PARAMS",
            Self::ParseError => "E_PARSE_ERROR",
            Self::NotFound => "E_NOT_FOUND",
            Self::Internal => "E_INTERNAL",
        }
    }

    /// Check if a later refresh can plausibly succeed without user action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectorUnreachable
                | Self::QueryFailed
                | Self::BackendUnavailable
                | Self::NotReady
                | Self::Network
                | Self::Timeout
        )
    }

    /// Check if this error kind requires user action (credentials, settings).
    pub fn requires_user_action(&self) -> bool {
        matches!(self, Self::ConnectorAuth)
    }

    /// Check if this error kind is internal (should be logged, not shown to user).
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Internal | Self::ParseError | Self::MethodNotFound | Self::InvalidParams
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bridge())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bridge_roundtrip() {
        let variants = vec![
            ErrorKind::ConnectorUnreachable,
            ErrorKind::ConnectorAuth,
            ErrorKind::QueryFailed,
            ErrorKind::BackendUnavailable,
            ErrorKind::NotReady,
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::MethodNotFound,
            ErrorKind::InvalidParams,
            ErrorKind::ParseError,
            ErrorKind::NotFound,
            ErrorKind::Internal,
        ];

        for variant in variants {
            let bridge_str = variant.to_bridge();
            let parsed = ErrorKind::from_bridge(bridge_str);
            assert_eq!(
                parsed,
                Some(variant),
                "Roundtrip failed for {:?} -> {} -> {:?}",
                variant,
                bridge_str,
                parsed
            );
        }
    }

    #[test]
    fn test_unknown_bridge_kind() {
        assert_eq!(ErrorKind::from_bridge("E_SOMETHING_NEW"), None);
        assert_eq!(ErrorKind::from_bridge(""), None);
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(ErrorKind::Network.is_recoverable());
        assert!(ErrorKind::QueryFailed.is_recoverable());
        assert!(!ErrorKind::ConnectorAuth.is_recoverable());
        assert!(ErrorKind::ConnectorAuth.requires_user_action());
    }

    #[test]
    fn test_internal_classification() {
        assert!(ErrorKind::Internal.is_internal());
        assert!(ErrorKind::ParseError.is_internal());
        assert!(!ErrorKind::QueryFailed.is_internal());
    }
}
