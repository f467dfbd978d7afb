//! Indicator state machine and snapshot store.
//!
//! The tray indicator cycles through three phases and owns exactly one
//! mutable value: the latest committed [`AggregatedStatus`] snapshot.
//! Refreshes are guarded by monotonically increasing tickets so that an
//! in-flight fetch superseded by a newer one can never overwrite the
//! newer result.
//!
//! # Phase Diagram
//!
//! ```text
//!                ┌───────────┐
//!                │ Unmounted │
//!                └─────┬─────┘
//!                      │ attach
//!                      ▼
//!                ┌───────────┐  refresh committed   ┌───────────┐
//!                │   Stale   │─────────────────────►│   Fresh   │
//!                └───────────┘◄─────────────────────└───────────┘
//!                      ▲         refresh started
//!                      │
//!            (teardown returns to Unmounted from either mounted phase)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::aggregate::AggregatedStatus;

/// Indicator lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorPhase {
    /// Not attached to the tray yet (or torn down).
    Unmounted,
    /// Mounted; the displayed snapshot may be behind the backend.
    Stale,
    /// Mounted; the displayed snapshot is the latest committed fetch.
    Fresh,
}

impl Default for IndicatorPhase {
    fn default() -> Self {
        Self::Unmounted
    }
}

/// Event broadcast whenever the committed snapshot or phase changes.
#[derive(Clone, Debug, Serialize)]
pub struct StatusEvent {
    /// Current phase.
    pub phase: IndicatorPhase,
    /// The committed snapshot at the time of the event.
    pub status: AggregatedStatus,
    /// Timestamp of the event itself.
    pub timestamp: DateTime<Utc>,
}

/// Error for invalid phase transitions.
#[derive(Debug, Error)]
#[error("Invalid phase transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    /// Current phase.
    pub from: IndicatorPhase,
    /// Attempted target phase.
    pub to: IndicatorPhase,
}

/// Ticket identifying one refresh operation.
///
/// Tickets are issued in strictly increasing order; only the most recently
/// issued ticket may commit its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket(u64);

/// Thread-safe store for the indicator phase and latest snapshot.
pub struct StatusStateManager {
    /// Current lifecycle phase.
    phase: RwLock<IndicatorPhase>,
    /// Latest committed snapshot (zero/empty until the first commit).
    snapshot: RwLock<AggregatedStatus>,
    /// Ticket counter; the stored value is the newest issued ticket.
    refresh_seq: AtomicU64,
    /// Broadcast sender for snapshot/phase events.
    event_sender: broadcast::Sender<StatusEvent>,
}

impl StatusStateManager {
    /// Create a new manager in the `Unmounted` phase with an empty snapshot.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            phase: RwLock::new(IndicatorPhase::Unmounted),
            snapshot: RwLock::new(AggregatedStatus::default()),
            refresh_seq: AtomicU64::new(0),
            event_sender: tx,
        }
    }

    /// Get the current phase.
    pub fn phase(&self) -> IndicatorPhase {
        *self.phase.read().unwrap()
    }

    /// Clone of the latest committed snapshot.
    pub fn snapshot(&self) -> AggregatedStatus {
        self.snapshot.read().unwrap().clone()
    }

    /// Attempt a phase transition.
    pub fn transition(&self, new_phase: IndicatorPhase) -> Result<(), InvalidTransition> {
        {
            let mut phase = self.phase.write().unwrap();
            let current = *phase;

            if !Self::is_valid_transition(current, new_phase) {
                return Err(InvalidTransition {
                    from: current,
                    to: new_phase,
                });
            }

            *phase = new_phase;
        }
        self.emit_event();
        Ok(())
    }

    /// Mark the indicator as attached to its tray container.
    pub fn attach(&self) -> Result<(), InvalidTransition> {
        self.transition(IndicatorPhase::Stale)
    }

    /// Begin a refresh: issue a ticket and mark the display as stale.
    pub fn begin_refresh(&self) -> RefreshTicket {
        let ticket = self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut phase = self.phase.write().unwrap();
            if *phase == IndicatorPhase::Fresh {
                *phase = IndicatorPhase::Stale;
            }
        }

        RefreshTicket(ticket)
    }

    /// Commit a refresh result.
    ///
    /// Returns `false` (leaving the snapshot untouched) when a newer refresh
    /// was started after this ticket was issued; the committed snapshot is
    /// always the product of the newest refresh, never a stale overwrite.
    pub fn commit(&self, ticket: RefreshTicket, status: AggregatedStatus) -> bool {
        {
            let mut snapshot = self.snapshot.write().unwrap();
            let newest = self.refresh_seq.load(Ordering::SeqCst);
            if ticket.0 != newest {
                log::debug!(
                    "Discarding superseded refresh result (ticket {}, newest {})",
                    ticket.0,
                    newest
                );
                return false;
            }

            *snapshot = status;

            let mut phase = self.phase.write().unwrap();
            if *phase == IndicatorPhase::Stale {
                *phase = IndicatorPhase::Fresh;
            }
        }
        self.emit_event();
        true
    }

    /// Record a failed refresh.
    ///
    /// The snapshot is deliberately left untouched: the last successfully
    /// rendered state (or the initial zero state) keeps being displayed.
    pub fn fail(&self, ticket: RefreshTicket, error: &dyn std::fmt::Display) {
        if ticket.0 == self.refresh_seq.load(Ordering::SeqCst) {
            log::warn!("Status refresh failed: {}", error);
        } else {
            log::debug!("Superseded status refresh failed: {}", error);
        }
    }

    /// Detach from the tray (host teardown).
    pub fn detach(&self) -> Result<(), InvalidTransition> {
        self.transition(IndicatorPhase::Unmounted)
    }

    /// Re-broadcast the current state without changing it.
    ///
    /// Used when presentation settings change and observers must re-render.
    pub fn touch(&self) {
        self.emit_event();
    }

    /// Subscribe to snapshot/phase events.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.event_sender.subscribe()
    }

    /// Snapshot of the current state as an event payload.
    pub fn current_event(&self) -> StatusEvent {
        StatusEvent {
            phase: self.phase(),
            status: self.snapshot(),
            timestamp: Utc::now(),
        }
    }

    /// Check whether a phase transition is valid.
    fn is_valid_transition(from: IndicatorPhase, to: IndicatorPhase) -> bool {
        use IndicatorPhase::*;

        // Same-phase transitions are no-ops
        if from == to {
            return true;
        }

        matches!(
            (from, to),
            // Mount
            (Unmounted, Stale)
                // Refresh cycle
                | (Stale, Fresh)
                | (Fresh, Stale)
                // Teardown
                | (Stale, Unmounted)
                | (Fresh, Unmounted)
        )
    }

    /// Emit a state event to all subscribers.
    fn emit_event(&self) {
        // Ignore send errors (no receivers is fine)
        let _ = self.event_sender.send(self.current_event());
    }
}

impl Default for StatusStateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, IntegrationStatusRecord};

    fn batch(failed: u64, missing: u64) -> AggregatedStatus {
        aggregate(vec![IntegrationStatusRecord::new("Test", failed, missing)])
    }

    #[test]
    fn test_initial_phase_is_unmounted() {
        let manager = StatusStateManager::new();
        assert_eq!(manager.phase(), IndicatorPhase::Unmounted);
        assert!(manager.snapshot().is_all_clear());
    }

    #[test]
    fn test_attach_then_refresh_cycle() {
        let manager = StatusStateManager::new();

        manager.attach().unwrap();
        assert_eq!(manager.phase(), IndicatorPhase::Stale);

        let ticket = manager.begin_refresh();
        assert!(manager.commit(ticket, batch(2, 4)));
        assert_eq!(manager.phase(), IndicatorPhase::Fresh);
        assert_eq!(manager.snapshot().counter_text(), "2 / 4");

        // A second refresh marks the display stale again until it commits
        let ticket = manager.begin_refresh();
        assert_eq!(manager.phase(), IndicatorPhase::Stale);
        assert!(manager.commit(ticket, batch(5, 0)));
        assert_eq!(manager.phase(), IndicatorPhase::Fresh);
        assert_eq!(manager.snapshot().counter_text(), "5 / 0");
    }

    #[test]
    fn test_refresh_never_regresses_to_unmounted() {
        let manager = StatusStateManager::new();
        manager.attach().unwrap();

        let ticket = manager.begin_refresh();
        manager.commit(ticket, batch(1, 1));

        manager.begin_refresh();
        assert_eq!(manager.phase(), IndicatorPhase::Stale);

        manager.detach().unwrap();
        assert_eq!(manager.phase(), IndicatorPhase::Unmounted);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let manager = StatusStateManager::new();

        // Unmounted cannot jump straight to Fresh
        let err = manager.transition(IndicatorPhase::Fresh).unwrap_err();
        assert_eq!(err.from, IndicatorPhase::Unmounted);
        assert_eq!(err.to, IndicatorPhase::Fresh);
        assert_eq!(manager.phase(), IndicatorPhase::Unmounted);
    }

    #[test]
    fn test_superseded_ticket_cannot_commit() {
        let manager = StatusStateManager::new();
        manager.attach().unwrap();

        let first = manager.begin_refresh();
        let second = manager.begin_refresh();

        // The newer refresh lands first
        assert!(manager.commit(second, batch(5, 0)));
        assert_eq!(manager.snapshot().counter_text(), "5 / 0");

        // The older in-flight result must be discarded
        assert!(!manager.commit(first, batch(2, 4)));
        assert_eq!(manager.snapshot().counter_text(), "5 / 0");
        assert_eq!(manager.phase(), IndicatorPhase::Fresh);
    }

    #[test]
    fn test_failed_refresh_leaves_snapshot_untouched() {
        let manager = StatusStateManager::new();
        manager.attach().unwrap();

        let ticket = manager.begin_refresh();
        assert!(manager.commit(ticket, batch(3, 12)));

        let failing = manager.begin_refresh();
        manager.fail(failing, &"backend unreachable");

        assert_eq!(manager.snapshot().counter_text(), "3 / 12");
        // Display stays stale until a later refresh succeeds
        assert_eq!(manager.phase(), IndicatorPhase::Stale);
    }

    #[test]
    fn test_commit_emits_event() {
        let manager = StatusStateManager::new();
        let mut receiver = manager.subscribe();

        manager.attach().unwrap();
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.phase, IndicatorPhase::Stale);

        let ticket = manager.begin_refresh();
        manager.commit(ticket, batch(2, 1));

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.phase, IndicatorPhase::Fresh);
        assert_eq!(event.status.counter_text(), "2 / 1");
    }

    #[test]
    fn test_discarded_commit_emits_no_event() {
        let manager = StatusStateManager::new();
        manager.attach().unwrap();

        let stale = manager.begin_refresh();
        let newest = manager.begin_refresh();
        manager.commit(newest, batch(1, 0));

        let mut receiver = manager.subscribe();
        assert!(!manager.commit(stale, batch(9, 9)));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_tickets_are_strictly_increasing() {
        let manager = StatusStateManager::new();
        let a = manager.begin_refresh();
        let b = manager.begin_refresh();
        assert_ne!(a, b);
    }

    #[test]
    fn test_current_event_reflects_state() {
        let manager = StatusStateManager::new();
        let event = manager.current_event();
        assert_eq!(event.phase, IndicatorPhase::Unmounted);
        assert!(event.status.is_all_clear());
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let manager = Arc::new(StatusStateManager::new());
        manager.attach().unwrap();

        let mut handles = vec![];
        for _ in 0..8 {
            let m = Arc::clone(&manager);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    let ticket = m.begin_refresh();
                    m.commit(ticket, AggregatedStatus::default());
                    let _ = m.snapshot();
                    let _ = m.phase();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        // Manager must end in a coherent mounted phase
        assert_ne!(manager.phase(), IndicatorPhase::Unmounted);
    }
}
