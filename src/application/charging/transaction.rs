//! Transaction lifecycle of a connector: `Idle -> Charging -> Idle`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::profile_store::ProfileStore;
use crate::domain::{ActiveTransaction, ChargingState};
use crate::shared::{ChargingError, ChargingResult};

/// Result of a StopTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoppedTransaction {
    pub transaction_id: i32,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    /// TxProfiles removed together with the transaction
    pub purged_profiles: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct TransactionLifecycleTracker {
    connector_id: u32,
    active: Option<ActiveTransaction>,
}

impl TransactionLifecycleTracker {
    pub fn new(connector_id: u32) -> Self {
        Self {
            connector_id,
            active: None,
        }
    }

    pub fn state(&self) -> ChargingState {
        if self.active.is_some() {
            ChargingState::Charging
        } else {
            ChargingState::Idle
        }
    }

    pub fn active(&self) -> Option<&ActiveTransaction> {
        self.active.as_ref()
    }

    /// Record a started transaction and bind the TxProfiles waiting for it.
    /// Returns the ids of the profiles that were bound.
    pub fn on_start(
        &mut self,
        store: &mut ProfileStore,
        transaction_id: i32,
        now: DateTime<Utc>,
    ) -> ChargingResult<Vec<i32>> {
        if let Some(active) = &self.active {
            return Err(ChargingError::TransactionAlreadyActive {
                connector_id: self.connector_id,
                transaction_id: active.transaction_id,
            });
        }

        let tx = ActiveTransaction {
            transaction_id,
            started_at: now,
        };
        let bound = store.bind_pending(&tx);
        self.active = Some(tx);

        info!(
            connector_id = self.connector_id,
            transaction_id,
            bound_profiles = ?bound,
            "Transaction started"
        );
        Ok(bound)
    }

    /// End the running transaction, purging its TxProfiles. `None` when idle.
    pub fn on_stop(&mut self, store: &mut ProfileStore, now: DateTime<Utc>) -> Option<StoppedTransaction> {
        let tx = self.active.take()?;
        let purged_profiles = store.purge_transaction(tx.transaction_id);

        info!(
            connector_id = self.connector_id,
            transaction_id = tx.transaction_id,
            purged_profiles = ?purged_profiles,
            "Transaction stopped"
        );

        Some(StoppedTransaction {
            transaction_id: tx.transaction_id,
            started_at: tx.started_at,
            stopped_at: now,
            purged_profiles,
        })
    }

    /// Forget the transaction without touching the store.
    pub fn reset(&mut self) {
        self.active = None;
    }
}
