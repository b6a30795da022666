//! Connector worker
//!
//! One task per connector owns its [`ConnectorPowerState`]. Commands arrive
//! on an mpsc inbox and are applied in order; replies go back on oneshot
//! channels. After every command or timer wake-up the worker publishes a
//! fresh [`ConnectorSnapshot`] on a watch channel and emits events for what
//! changed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::composite::{self, CompositeSchedule};
use super::power_state::{ConnectorPowerState, ConnectorSnapshot};
use super::profile_store::{
    ClearCriteria, ClearOutcome, SetOutcome, SmartChargingRules, StoredProfile,
};
use super::transaction::StoppedTransaction;
use crate::domain::{EffectiveLimit, ElectricalConfig, RateUnit};
use crate::notifications::{
    EffectiveLimitChangedEvent, Event, ProfileInstalledEvent, ProfileRejectedEvent,
    ProfilesClearedEvent, SharedEventBus, TransactionStartedEvent, TransactionStoppedEvent,
};
use crate::shared::{ChargingError, ChargingProfilePayload, ChargingResult, SharedClock, ShutdownSignal};

/// Longest the worker sleeps when no transition is pending.
const MAX_IDLE: Duration = Duration::from_secs(3600);
/// Shortest timer sleep.
const MIN_WAKE: Duration = Duration::from_millis(10);

/// How the worker schedules its timer recomputations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeMode {
    /// Sleep until the next schedule transition
    #[default]
    NextTransition,
    /// Recompute at a fixed interval
    Poll,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub station_id: String,
    pub rules: SmartChargingRules,
    pub recompute: RecomputeMode,
    pub poll_interval: Duration,
    pub inbox_capacity: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            station_id: "SIM-CP-001".to_string(),
            rules: SmartChargingRules::default(),
            recompute: RecomputeMode::NextTransition,
            poll_interval: Duration::from_millis(500),
            inbox_capacity: 64,
        }
    }
}

/// Requests accepted by a connector worker.
#[derive(Debug)]
pub enum ConnectorCommand {
    SetProfile {
        payload: Box<ChargingProfilePayload>,
        target_connector: u32,
        reply: oneshot::Sender<ChargingResult<SetOutcome>>,
    },
    /// Run the acceptance rules of `SetProfile` without installing
    CheckProfile {
        payload: Box<ChargingProfilePayload>,
        target_connector: u32,
        reply: oneshot::Sender<ChargingResult<Vec<i32>>>,
    },
    /// Undo a station-wide `SetProfile`
    RestoreProfiles {
        profile_id: i32,
        displaced: Vec<StoredProfile>,
        reply: oneshot::Sender<Vec<i32>>,
    },
    ClearProfiles {
        criteria: ClearCriteria,
        reply: oneshot::Sender<ClearOutcome>,
    },
    StartTransaction {
        transaction_id: i32,
        reply: oneshot::Sender<ChargingResult<Vec<i32>>>,
    },
    StopTransaction {
        reply: oneshot::Sender<Option<StoppedTransaction>>,
    },
    CompositeSchedule {
        duration_secs: i64,
        rate_unit: Option<RateUnit>,
        reply: oneshot::Sender<ChargingResult<CompositeSchedule>>,
    },
    Reconfigure {
        electrical: ElectricalConfig,
        reply: oneshot::Sender<ChargingResult<()>>,
    },
    Reset {
        reply: oneshot::Sender<Vec<i32>>,
    },
    /// Recompute now, as a timer wake-up would
    Tick {
        reply: oneshot::Sender<EffectiveLimit>,
    },
    Shutdown,
}

/// Cloneable front end of a connector worker.
#[derive(Clone)]
pub struct ConnectorHandle {
    connector_id: u32,
    sender: mpsc::Sender<ConnectorCommand>,
    snapshot: watch::Receiver<ConnectorSnapshot>,
}

impl ConnectorHandle {
    pub fn connector_id(&self) -> u32 {
        self.connector_id
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ConnectorSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn effective_limit(&self) -> EffectiveLimit {
        self.snapshot.borrow().effective_limit
    }

    /// Receiver notified on every published snapshot.
    pub fn watch(&self) -> watch::Receiver<ConnectorSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ConnectorCommand,
    ) -> ChargingResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| ChargingError::ConnectorUnavailable(self.connector_id))?;
        rx.await
            .map_err(|_| ChargingError::ConnectorUnavailable(self.connector_id))
    }

    pub async fn set_profile(
        &self,
        payload: ChargingProfilePayload,
        target_connector: u32,
    ) -> ChargingResult<SetOutcome> {
        self.request(|reply| ConnectorCommand::SetProfile {
            payload: Box::new(payload),
            target_connector,
            reply,
        })
        .await?
    }

    /// Whether `set_profile` would accept the payload; returns the ids it
    /// would displace.
    pub async fn check_profile(
        &self,
        payload: ChargingProfilePayload,
        target_connector: u32,
    ) -> ChargingResult<Vec<i32>> {
        self.request(|reply| ConnectorCommand::CheckProfile {
            payload: Box::new(payload),
            target_connector,
            reply,
        })
        .await?
    }

    pub async fn restore_profiles(
        &self,
        profile_id: i32,
        displaced: Vec<StoredProfile>,
    ) -> ChargingResult<Vec<i32>> {
        self.request(|reply| ConnectorCommand::RestoreProfiles {
            profile_id,
            displaced,
            reply,
        })
        .await
    }

    pub async fn clear_profiles(&self, criteria: ClearCriteria) -> ChargingResult<ClearOutcome> {
        self.request(|reply| ConnectorCommand::ClearProfiles { criteria, reply })
            .await
    }

    pub async fn start_transaction(&self, transaction_id: i32) -> ChargingResult<Vec<i32>> {
        self.request(|reply| ConnectorCommand::StartTransaction {
            transaction_id,
            reply,
        })
        .await?
    }

    pub async fn stop_transaction(&self) -> ChargingResult<Option<StoppedTransaction>> {
        self.request(|reply| ConnectorCommand::StopTransaction { reply })
            .await
    }

    pub async fn composite_schedule(
        &self,
        duration_secs: i64,
        rate_unit: Option<RateUnit>,
    ) -> ChargingResult<CompositeSchedule> {
        self.request(|reply| ConnectorCommand::CompositeSchedule {
            duration_secs,
            rate_unit,
            reply,
        })
        .await?
    }

    pub async fn reconfigure(&self, electrical: ElectricalConfig) -> ChargingResult<()> {
        self.request(|reply| ConnectorCommand::Reconfigure { electrical, reply })
            .await?
    }

    pub async fn reset(&self) -> ChargingResult<Vec<i32>> {
        self.request(|reply| ConnectorCommand::Reset { reply }).await
    }

    pub async fn tick(&self) -> ChargingResult<EffectiveLimit> {
        self.request(|reply| ConnectorCommand::Tick { reply }).await
    }

    /// Ask the worker to exit after the commands already queued.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(ConnectorCommand::Shutdown).await;
    }
}

/// Timer sleep until `next`, kept within `MIN_WAKE..=MAX_IDLE`. A transition
/// already behind `now` wakes the worker after `MIN_WAKE`.
fn wake_after(now: DateTime<Utc>, next: Option<DateTime<Utc>>) -> Duration {
    match next {
        Some(at) => (at - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .clamp(MIN_WAKE, MAX_IDLE),
        None => MAX_IDLE,
    }
}

struct ConnectorWorker {
    state: ConnectorPowerState,
    settings: WorkerSettings,
    clock: SharedClock,
    events: SharedEventBus,
    snapshot_tx: watch::Sender<ConnectorSnapshot>,
    connector_label: String,
}

/// Start the worker task of one connector.
pub fn spawn_connector(
    connector_id: u32,
    electrical: ElectricalConfig,
    settings: WorkerSettings,
    clock: SharedClock,
    events: SharedEventBus,
    shutdown: ShutdownSignal,
) -> ChargingResult<(ConnectorHandle, JoinHandle<()>)> {
    let state = ConnectorPowerState::new(connector_id, electrical, settings.rules, clock.now())?;
    let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
    let (sender, inbox) = mpsc::channel(settings.inbox_capacity.max(1));

    let worker = ConnectorWorker {
        state,
        settings,
        clock,
        events,
        snapshot_tx,
        connector_label: connector_id.to_string(),
    };
    worker.record_limit_gauge();
    let join = tokio::spawn(worker.run(inbox, shutdown));

    Ok((
        ConnectorHandle {
            connector_id,
            sender,
            snapshot: snapshot_rx,
        },
        join,
    ))
}

impl ConnectorWorker {
    fn connector_id(&self) -> u32 {
        self.state.connector_id()
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<ConnectorCommand>, shutdown: ShutdownSignal) {
        info!(
            station_id = %self.settings.station_id,
            connector_id = self.connector_id(),
            physical_limit_w = self.state.physical_limit_w(),
            mode = ?self.settings.recompute,
            "Connector worker started"
        );

        loop {
            let wake = self.next_wake();
            tokio::select! {
                cmd = inbox.recv() => match cmd {
                    Some(ConnectorCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                _ = tokio::time::sleep(wake) => {
                    let now = self.clock.now();
                    self.refresh(now);
                    self.publish_snapshot();
                }
                _ = shutdown.notified().wait() => break,
            }
        }

        info!(connector_id = self.connector_id(), "Connector worker stopped");
    }

    fn next_wake(&self) -> Duration {
        match self.settings.recompute {
            RecomputeMode::Poll => self.settings.poll_interval,
            RecomputeMode::NextTransition => {
                let now = self.clock.now();
                wake_after(now, self.state.next_transition(now))
            }
        }
    }

    fn handle(&mut self, cmd: ConnectorCommand) {
        let now = self.clock.now();
        // bring the state up to date before applying the command
        self.refresh(now);
        let before = self.state.effective_limit();

        match cmd {
            ConnectorCommand::SetProfile {
                payload,
                target_connector,
                reply,
            } => {
                let result = self.state.set_profile(&payload, target_connector, now);
                self.report_set(&payload, &result, now);
                self.settle(before, now);
                let _ = reply.send(result);
            }
            ConnectorCommand::CheckProfile {
                payload,
                target_connector,
                reply,
            } => {
                let result = self.state.check_profile(&payload, target_connector, now);
                if let Err(e) = &result {
                    debug!(
                        connector_id = self.connector_id(),
                        profile_id = payload.charging_profile_id,
                        reason = e.reason_code(),
                        "Profile would be rejected"
                    );
                }
                self.settle(before, now);
                let _ = reply.send(result);
            }
            ConnectorCommand::RestoreProfiles {
                profile_id,
                displaced,
                reply,
            } => {
                let restored = self.state.restore_profiles(profile_id, displaced, now);
                self.report_cleared(&[profile_id], "rollback", now);
                self.settle(before, now);
                let _ = reply.send(restored);
            }
            ConnectorCommand::ClearProfiles { criteria, reply } => {
                let outcome = self.state.clear_profiles(&criteria, now);
                self.report_cleared(&outcome.cleared_ids, "request", now);
                self.settle(before, now);
                let _ = reply.send(outcome);
            }
            ConnectorCommand::StartTransaction {
                transaction_id,
                reply,
            } => {
                let result = self.state.start_transaction(transaction_id, now);
                match &result {
                    Ok(bound) => self.publish(Event::TransactionStarted(TransactionStartedEvent {
                        station_id: self.settings.station_id.clone(),
                        connector_id: self.connector_id(),
                        transaction_id,
                        bound_profiles: bound.clone(),
                        timestamp: now,
                    })),
                    Err(e) => warn!(connector_id = self.connector_id(), transaction_id, error = %e, "StartTransaction refused"),
                }
                self.settle(before, now);
                let _ = reply.send(result);
            }
            ConnectorCommand::StopTransaction { reply } => {
                let stopped = self.state.stop_transaction(now);
                if let Some(stopped) = &stopped {
                    self.publish(Event::TransactionStopped(TransactionStoppedEvent {
                        station_id: self.settings.station_id.clone(),
                        connector_id: self.connector_id(),
                        transaction_id: stopped.transaction_id,
                        duration_secs: (stopped.stopped_at - stopped.started_at).num_seconds(),
                        timestamp: now,
                    }));
                    self.report_cleared(&stopped.purged_profiles, "transaction_stopped", now);
                } else {
                    debug!(connector_id = self.connector_id(), "StopTransaction while idle");
                }
                self.settle(before, now);
                let _ = reply.send(stopped);
            }
            ConnectorCommand::CompositeSchedule {
                duration_secs,
                rate_unit,
                reply,
            } => {
                let result = composite::composite_schedule(&self.state, now, duration_secs, rate_unit);
                self.settle(before, now);
                let _ = reply.send(result);
            }
            ConnectorCommand::Reconfigure { electrical, reply } => {
                let result = self.state.reconfigure(electrical, now);
                if let Err(e) = &result {
                    warn!(connector_id = self.connector_id(), error = %e, "Reconfiguration refused");
                }
                self.settle(before, now);
                let _ = reply.send(result);
            }
            ConnectorCommand::Reset { reply } => {
                let cleared = self.state.reset(now);
                self.report_cleared(&cleared, "reset", now);
                self.settle(before, now);
                let _ = reply.send(cleared);
            }
            ConnectorCommand::Tick { reply } => {
                self.settle(before, now);
                let _ = reply.send(self.state.effective_limit());
            }
            ConnectorCommand::Shutdown => self.settle(before, now),
        }
    }

    /// Announce a limit change and publish the snapshot; runs before the
    /// reply so callers observe the new state.
    fn settle(&self, before: EffectiveLimit, now: DateTime<Utc>) {
        self.report_limit_change(before, now);
        self.publish_snapshot();
    }

    /// Recompute at `now`, announcing expired profiles and limit changes.
    fn refresh(&mut self, now: DateTime<Utc>) {
        let recomputed = self.state.recompute(now);
        self.report_cleared(&recomputed.pruned, "expired", now);
        self.report_limit_change(recomputed.previous, now);
    }

    fn report_set(
        &self,
        payload: &ChargingProfilePayload,
        result: &ChargingResult<SetOutcome>,
        now: DateTime<Utc>,
    ) {
        match result {
            Ok(outcome) => {
                metrics::counter!(
                    "charging_profiles_set_total",
                    "purpose" => format!("{:?}", payload.charging_profile_purpose)
                )
                .increment(1);
                if let Some(stored) = self
                    .state
                    .store()
                    .iter()
                    .find(|s| s.id() == payload.charging_profile_id)
                {
                    self.publish(Event::ProfileInstalled(ProfileInstalledEvent {
                        station_id: self.settings.station_id.clone(),
                        connector_id: self.connector_id(),
                        profile_id: stored.id(),
                        purpose: stored.purpose(),
                        stack_level: stored.stack_level(),
                        replaced: outcome.replaced.clone(),
                        timestamp: now,
                    }));
                }
            }
            Err(e) => {
                warn!(
                    connector_id = self.connector_id(),
                    profile_id = payload.charging_profile_id,
                    reason = e.reason_code(),
                    error = %e,
                    "SetChargingProfile rejected"
                );
                metrics::counter!("charging_profiles_rejected_total", "reason" => e.reason_code())
                    .increment(1);
                self.publish(Event::ProfileRejected(ProfileRejectedEvent {
                    station_id: self.settings.station_id.clone(),
                    connector_id: self.connector_id(),
                    profile_id: payload.charging_profile_id,
                    reason: e.reason_code().to_string(),
                    message: e.to_string(),
                    timestamp: now,
                }));
            }
        }
    }

    fn report_cleared(&self, ids: &[i32], cause: &'static str, now: DateTime<Utc>) {
        if ids.is_empty() {
            return;
        }
        metrics::counter!("charging_profiles_cleared_total", "cause" => cause)
            .increment(ids.len() as u64);
        self.publish(Event::ProfilesCleared(ProfilesClearedEvent {
            station_id: self.settings.station_id.clone(),
            connector_id: self.connector_id(),
            profile_ids: ids.to_vec(),
            cause: cause.to_string(),
            timestamp: now,
        }));
    }

    fn report_limit_change(&self, previous: EffectiveLimit, now: DateTime<Utc>) {
        let current = self.state.effective_limit();
        if previous == current {
            return;
        }
        self.record_limit_gauge();
        self.publish(Event::EffectiveLimitChanged(EffectiveLimitChangedEvent {
            station_id: self.settings.station_id.clone(),
            connector_id: self.connector_id(),
            previous_limit_w: previous.limit_w,
            limit_w: current.limit_w,
            source: current.source,
            timestamp: now,
        }));
    }

    fn record_limit_gauge(&self) {
        metrics::gauge!("connector_effective_limit_watts", "connector" => self.connector_label.clone())
            .set(self.state.effective_limit().limit_w);
    }

    fn publish(&self, event: Event) {
        self.events.publish(event);
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.state.snapshot());
    }
}
