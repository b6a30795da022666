//! Station: the set of connector workers of one simulated charge point.
//!
//! Requests addressed to a single connector are forwarded to its worker.
//! Requests addressed to connector 0 fan out to every connector and the
//! replies are aggregated.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::composite::CompositeSchedule;
use super::power_state::ConnectorSnapshot;
use super::profile_store::{ClearCriteria, ClearOutcome, StoredProfile};
use super::transaction::StoppedTransaction;
use super::worker::{spawn_connector, ConnectorHandle, WorkerSettings};
use crate::domain::charging_profile::validate_payload;
use crate::domain::{ChargingProfilePurpose, EffectiveLimit, ElectricalConfig, RateUnit};
use crate::notifications::{Event, EventSubscriber, ProfileRejectedEvent, SharedEventBus};
use crate::shared::{
    ChargingError, ChargingProfilePayload, ChargingResult, SharedClock, ShutdownSignal,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProfileStatus {
    Accepted,
    Rejected,
}

/// Reply to SetChargingProfile.
#[derive(Debug, Clone, PartialEq)]
pub struct SetChargingProfileResult {
    pub status: ProfileStatus,
    /// Why the profile was rejected
    pub reason: Option<ChargingError>,
    /// Ids displaced by the new profile, over all targeted connectors
    pub replaced: Vec<i32>,
}

impl SetChargingProfileResult {
    fn accepted(replaced: Vec<i32>) -> Self {
        Self {
            status: ProfileStatus::Accepted,
            reason: None,
            replaced,
        }
    }

    fn rejected(reason: ChargingError) -> Self {
        Self {
            status: ProfileStatus::Rejected,
            reason: Some(reason),
            replaced: Vec::new(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == ProfileStatus::Accepted
    }
}

struct ConnectorEntry {
    handle: ConnectorHandle,
    join: JoinHandle<()>,
}

pub struct Station {
    settings: WorkerSettings,
    connectors: DashMap<u32, ConnectorEntry>,
    clock: SharedClock,
    events: SharedEventBus,
    shutdown: ShutdownSignal,
}

/// Shared, reference-counted station
pub type SharedStation = Arc<Station>;

impl Station {
    pub fn new(
        settings: WorkerSettings,
        clock: SharedClock,
        events: SharedEventBus,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            settings,
            connectors: DashMap::new(),
            clock,
            events,
            shutdown,
        }
    }

    /// Wrap in `Arc` for shared ownership
    pub fn shared(
        settings: WorkerSettings,
        clock: SharedClock,
        events: SharedEventBus,
        shutdown: ShutdownSignal,
    ) -> SharedStation {
        Arc::new(Self::new(settings, clock, events, shutdown))
    }

    pub fn station_id(&self) -> &str {
        &self.settings.station_id
    }

    pub fn subscribe(&self) -> EventSubscriber {
        self.events.subscribe()
    }

    /// Events published by one connector's worker and meter sampler.
    pub fn subscribe_connector(&self, connector_id: u32) -> EventSubscriber {
        self.events.subscribe_connector(connector_id)
    }

    /// Configure a connector and start its worker.
    pub fn add_connector(
        &self,
        connector_id: u32,
        electrical: ElectricalConfig,
    ) -> ChargingResult<ConnectorHandle> {
        if connector_id == 0 {
            return Err(ChargingError::InvalidConfiguration(
                "connector id 0 is reserved for the whole station".into(),
            ));
        }
        if self.connectors.contains_key(&connector_id) {
            return Err(ChargingError::InvalidConfiguration(format!(
                "connector {} already configured",
                connector_id
            )));
        }

        let (handle, join) = spawn_connector(
            connector_id,
            electrical,
            self.settings.clone(),
            self.clock.clone(),
            self.events.clone(),
            self.shutdown.clone(),
        )?;
        self.connectors.insert(
            connector_id,
            ConnectorEntry {
                handle: handle.clone(),
                join,
            },
        );
        info!(station_id = %self.settings.station_id, connector_id, "Connector added");
        Ok(handle)
    }

    /// Stop a connector worker and forget the connector.
    pub async fn remove_connector(&self, connector_id: u32) -> bool {
        let Some((_, entry)) = self.connectors.remove(&connector_id) else {
            return false;
        };
        entry.handle.shutdown().await;
        if let Err(e) = entry.join.await {
            warn!(connector_id, error = %e, "Connector worker ended abnormally");
        }
        info!(station_id = %self.settings.station_id, connector_id, "Connector removed");
        true
    }

    pub fn connector(&self, connector_id: u32) -> ChargingResult<ConnectorHandle> {
        self.connectors
            .get(&connector_id)
            .map(|entry| entry.handle.clone())
            .ok_or(ChargingError::UnknownConnector(connector_id))
    }

    /// Configured connector ids in ascending order.
    pub fn connector_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.connectors.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Handles of every connector, ordered by id.
    pub fn handles(&self) -> Vec<ConnectorHandle> {
        let mut handles: Vec<ConnectorHandle> =
            self.connectors.iter().map(|r| r.handle.clone()).collect();
        handles.sort_by_key(|h| h.connector_id());
        handles
    }

    /// SetChargingProfile. Connector 0 installs the profile on every connector,
    /// and only once every connector has accepted it. A rejection leaves all
    /// connectors as they were.
    pub async fn set_charging_profile(
        &self,
        connector_id: u32,
        payload: ChargingProfilePayload,
    ) -> SetChargingProfileResult {
        if connector_id != 0 {
            let handle = match self.connector(connector_id) {
                Ok(handle) => handle,
                Err(e) => return SetChargingProfileResult::rejected(e),
            };
            return match handle.set_profile(payload, connector_id).await {
                Ok(outcome) => SetChargingProfileResult::accepted(outcome.replaced),
                Err(e) => SetChargingProfileResult::rejected(e),
            };
        }

        if let Err(e) = validate_payload(&payload) {
            return SetChargingProfileResult::rejected(e);
        }
        if ChargingProfilePurpose::from(&payload.charging_profile_purpose)
            == ChargingProfilePurpose::TxProfile
        {
            return SetChargingProfileResult::rejected(ChargingError::InvalidProfile(
                "TxProfile cannot target connector 0".into(),
            ));
        }

        let handles = self.handles();
        if handles.is_empty() {
            return SetChargingProfileResult::rejected(ChargingError::UnknownConnector(0));
        }

        let profile_id = payload.charging_profile_id;

        // every connector must accept before any of them changes
        for handle in &handles {
            if let Err(e) = handle.check_profile(payload.clone(), 0).await {
                warn!(
                    connector_id = handle.connector_id(),
                    profile_id,
                    error = %e,
                    "Station-wide profile rejected"
                );
                self.events.publish(Event::ProfileRejected(ProfileRejectedEvent {
                    station_id: self.settings.station_id.clone(),
                    connector_id: handle.connector_id(),
                    profile_id,
                    reason: e.reason_code().to_string(),
                    message: e.to_string(),
                    timestamp: self.clock.now(),
                }));
                return SetChargingProfileResult::rejected(e);
            }
        }

        let mut installed: Vec<(&ConnectorHandle, Vec<StoredProfile>)> = Vec::new();
        let mut replaced = Vec::new();
        for handle in &handles {
            match handle.set_profile(payload.clone(), 0).await {
                Ok(outcome) => {
                    replaced.extend(outcome.replaced);
                    installed.push((handle, outcome.displaced));
                }
                Err(e) => {
                    // a command queued between check and install changed the connector
                    warn!(
                        connector_id = handle.connector_id(),
                        profile_id,
                        error = %e,
                        "Station-wide profile rejected during install, rolling back"
                    );
                    Self::roll_back(profile_id, installed).await;
                    return SetChargingProfileResult::rejected(e);
                }
            }
        }

        replaced.sort_unstable();
        replaced.dedup();
        SetChargingProfileResult::accepted(replaced)
    }

    async fn roll_back(profile_id: i32, installed: Vec<(&ConnectorHandle, Vec<StoredProfile>)>) {
        for (handle, displaced) in installed {
            if let Err(e) = handle.restore_profiles(profile_id, displaced).await {
                warn!(
                    connector_id = handle.connector_id(),
                    profile_id,
                    error = %e,
                    "Rollback of station-wide profile failed"
                );
            }
        }
    }

    /// ClearChargingProfile. Unknown connectors simply clear nothing.
    pub async fn clear_charging_profile(&self, criteria: ClearCriteria) -> ClearOutcome {
        let targets = match criteria.connector_id {
            Some(c) if c != 0 => self.connector(c).map(|h| vec![h]).unwrap_or_default(),
            _ => self.handles(),
        };

        let mut total = ClearOutcome::default();
        for handle in targets {
            match handle.clear_profiles(criteria).await {
                Ok(outcome) => total.merge(outcome),
                Err(e) => warn!(connector_id = handle.connector_id(), error = %e, "Clear failed"),
            }
        }
        total
    }

    pub async fn start_transaction(
        &self,
        connector_id: u32,
        transaction_id: i32,
    ) -> ChargingResult<Vec<i32>> {
        self.connector(connector_id)?
            .start_transaction(transaction_id)
            .await
    }

    pub async fn stop_transaction(
        &self,
        connector_id: u32,
    ) -> ChargingResult<Option<StoppedTransaction>> {
        self.connector(connector_id)?.stop_transaction().await
    }

    pub async fn composite_schedule(
        &self,
        connector_id: u32,
        duration_secs: i64,
        rate_unit: Option<RateUnit>,
    ) -> ChargingResult<CompositeSchedule> {
        self.connector(connector_id)?
            .composite_schedule(duration_secs, rate_unit)
            .await
    }

    pub async fn reconfigure(
        &self,
        connector_id: u32,
        electrical: ElectricalConfig,
    ) -> ChargingResult<()> {
        self.connector(connector_id)?.reconfigure(electrical).await
    }

    /// Connector disconnected from the CSMS: drop its profiles and transaction.
    pub async fn reset_connector(&self, connector_id: u32) -> ChargingResult<Vec<i32>> {
        self.connector(connector_id)?.reset().await
    }

    pub fn connector_state(&self, connector_id: u32) -> ChargingResult<ConnectorSnapshot> {
        Ok(self.connector(connector_id)?.snapshot())
    }

    pub fn effective_limit(&self, connector_id: u32) -> ChargingResult<EffectiveLimit> {
        Ok(self.connector(connector_id)?.effective_limit())
    }

    /// Recompute every connector now.
    pub async fn tick(&self) {
        for handle in self.handles() {
            if let Err(e) = handle.tick().await {
                warn!(connector_id = handle.connector_id(), error = %e, "Tick failed");
            }
        }
    }

    /// Trigger shutdown and wait for every worker to exit.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        let ids = self.connector_ids();
        for id in ids {
            if let Some((_, entry)) = self.connectors.remove(&id) {
                if let Err(e) = entry.join.await {
                    warn!(connector_id = id, error = %e, "Connector worker ended abnormally");
                }
            }
        }
        info!(station_id = %self.settings.station_id, "Station stopped");
    }
}
