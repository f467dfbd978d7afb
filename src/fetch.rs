//! Status fetching seam between the indicator and the bridge channel.
//!
//! The indicator never talks to the RPC client directly; it is handed a
//! [`StatusFetch`] capability so tests can inject scripted fakes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregate::IntegrationStatusRecord;
use crate::backend::BridgeManager;
use crate::ipc::{methods, RpcError};

/// One parameterless remote query for per-integration status records.
///
/// Implementations return the backend's ordering untouched and propagate
/// failures without retrying; retry policy belongs to the transport.
#[async_trait]
pub trait StatusFetch: Send + Sync {
    async fn fetch_statuses(&self) -> Result<Vec<IntegrationStatusRecord>, RpcError>;
}

/// Production fetcher: `status.get_integrations` over the bridge channel.
///
/// The client is resolved per call so a bridge restart transparently
/// reconnects the indicator.
pub struct RpcStatusFetch {
    bridge: Arc<BridgeManager>,
}

impl RpcStatusFetch {
    pub fn new(bridge: Arc<BridgeManager>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl StatusFetch for RpcStatusFetch {
    async fn fetch_statuses(&self) -> Result<Vec<IntegrationStatusRecord>, RpcError> {
        let client = self.bridge.client().ok_or(RpcError::Disconnected)?;
        client
            .call::<Vec<IntegrationStatusRecord>>(methods::STATUS_GET_INTEGRATIONS, None)
            .await
    }
}
