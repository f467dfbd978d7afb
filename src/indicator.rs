//! The status indicator core: fetch, aggregate, commit.
//!
//! One inbound trigger (the tray menu opening), one outbound call (the
//! status query). Mount runs a single refresh cycle before reporting
//! completion; every menu-open event afterwards runs another. Overlapping
//! refreshes are allowed and resolved by the state manager's ticket guard.

use std::sync::Arc;

use crate::aggregate::aggregate;
use crate::fetch::StatusFetch;
use crate::ipc::RpcError;
use crate::state::{IndicatorPhase, StatusStateManager};

/// The tray status indicator widget.
///
/// Owns no mutable state of its own: the latest snapshot lives in the
/// shared [`StatusStateManager`], which the renderer observes.
pub struct StatusIndicator {
    fetcher: Arc<dyn StatusFetch>,
    state: Arc<StatusStateManager>,
}

impl StatusIndicator {
    pub fn new(fetcher: Arc<dyn StatusFetch>, state: Arc<StatusStateManager>) -> Self {
        Self { fetcher, state }
    }

    /// Shared state manager backing this indicator.
    pub fn state(&self) -> &Arc<StatusStateManager> {
        &self.state
    }

    /// Mount the indicator: attach and run the first refresh cycle.
    ///
    /// Mount completes even when the initial fetch fails; the zero/empty
    /// snapshot keeps being displayed until a later refresh succeeds.
    pub async fn mount(&self) {
        if self.state.phase() != IndicatorPhase::Unmounted {
            log::debug!("Indicator already mounted");
            return;
        }

        if let Err(e) = self.state.attach() {
            log::warn!("Indicator attach rejected: {}", e);
            return;
        }

        if let Err(e) = self.refresh().await {
            log::warn!("Initial status fetch failed: {}", e);
        }
    }

    /// Run one fetch → aggregate → commit cycle.
    ///
    /// Errors are propagated after being recorded against the ticket; the
    /// committed snapshot is never touched on failure.
    pub async fn refresh(&self) -> Result<(), RpcError> {
        let ticket = self.state.begin_refresh();

        let records = match self.fetcher.fetch_statuses().await {
            Ok(records) => records,
            Err(e) => {
                self.state.fail(ticket, &e);
                return Err(e);
            }
        };

        let status = aggregate(records);
        if !self.state.commit(ticket, status) {
            log::debug!("Refresh result superseded before commit");
        }

        Ok(())
    }
}
