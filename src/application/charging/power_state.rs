//! Connector power state
//!
//! Owns the profile store and transaction tracker of one connector and
//! derives the effective limit from them:
//!
//! ```text
//! limit_w = min(physical_limit_w, resolved profile limit)
//! source  = resolved purpose if it is strictly below the physical limit,
//!           Physical otherwise
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::profile_store::{
    ClearCriteria, ClearOutcome, ProfileStore, SetContext, SetOutcome, SmartChargingRules,
    StoredProfile,
};
use super::resolver::{self, ResolvedLimit};
use super::transaction::{StoppedTransaction, TransactionLifecycleTracker};
use crate::domain::{
    ActiveTransaction, ChargingProfile, ChargingProfilePurpose, ChargingState, EffectiveLimit,
    ElectricalConfig, LimitSource, RateUnit,
};
use crate::shared::{ChargingProfilePayload, ChargingResult};

/// Combine the physical ceiling with the resolved profile limit.
pub fn combine(physical_limit_w: f64, resolved: Option<&ResolvedLimit>) -> EffectiveLimit {
    match resolved {
        Some(r) if r.limit_w < physical_limit_w => EffectiveLimit {
            limit_w: r.limit_w,
            source: LimitSource::from(r.purpose),
        },
        _ => EffectiveLimit::physical(physical_limit_w),
    }
}

/// Outcome of a recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct Recomputed {
    pub previous: EffectiveLimit,
    pub current: EffectiveLimit,
    /// Profiles dropped because they expired
    pub pruned: Vec<i32>,
}

impl Recomputed {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Read-only view of an installed profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub id: i32,
    pub purpose: ChargingProfilePurpose,
    pub stack_level: u32,
    pub kind: &'static str,
    pub target_connector: u32,
    pub transaction_id: Option<i32>,
    pub rate_unit: RateUnit,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    /// Limit this profile would impose right now, in W
    pub active_limit_w: Option<f64>,
}

/// Copy of a connector's state as published to readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorSnapshot {
    pub connector_id: u32,
    pub electrical: ElectricalConfig,
    pub physical_limit_w: f64,
    pub effective_limit: EffectiveLimit,
    pub resolved: Option<ResolvedLimit>,
    pub state: ChargingState,
    pub active_transaction: Option<ActiveTransaction>,
    pub profiles: Vec<ProfileSummary>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConnectorPowerState {
    connector_id: u32,
    electrical: ElectricalConfig,
    physical_limit_w: f64,
    store: ProfileStore,
    tracker: TransactionLifecycleTracker,
    resolved: Option<ResolvedLimit>,
    effective: EffectiveLimit,
    computed_at: DateTime<Utc>,
}

impl ConnectorPowerState {
    pub fn new(
        connector_id: u32,
        electrical: ElectricalConfig,
        rules: SmartChargingRules,
        now: DateTime<Utc>,
    ) -> ChargingResult<Self> {
        let physical_limit_w = electrical.physical_limit_w()?;
        Ok(Self {
            connector_id,
            electrical,
            physical_limit_w,
            store: ProfileStore::new(connector_id, rules),
            tracker: TransactionLifecycleTracker::new(connector_id),
            resolved: None,
            effective: EffectiveLimit::physical(physical_limit_w),
            computed_at: now,
        })
    }

    pub fn connector_id(&self) -> u32 {
        self.connector_id
    }

    pub fn electrical(&self) -> &ElectricalConfig {
        &self.electrical
    }

    pub fn physical_limit_w(&self) -> f64 {
        self.physical_limit_w
    }

    /// Effective limit as of the last recomputation.
    pub fn effective_limit(&self) -> EffectiveLimit {
        self.effective
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn state(&self) -> ChargingState {
        self.tracker.state()
    }

    pub fn active_transaction(&self) -> Option<&ActiveTransaction> {
        self.tracker.active()
    }

    /// Normalize, validate and store a profile addressed to `target_connector`
    /// (0 for station-wide), then recompute.
    pub fn set_profile(
        &mut self,
        payload: &ChargingProfilePayload,
        target_connector: u32,
        now: DateTime<Utc>,
    ) -> ChargingResult<SetOutcome> {
        let profile = ChargingProfile::from_payload(payload, &self.electrical)?;
        let outcome = self.store.set(
            profile,
            SetContext {
                target_connector,
                active: self.tracker.active(),
                now,
            },
        )?;
        self.recompute(now);
        Ok(outcome)
    }

    /// Dry run of [`set_profile`](Self::set_profile): same normalization and
    /// acceptance rules, no state change.
    pub fn check_profile(
        &self,
        payload: &ChargingProfilePayload,
        target_connector: u32,
        now: DateTime<Utc>,
    ) -> ChargingResult<Vec<i32>> {
        let profile = ChargingProfile::from_payload(payload, &self.electrical)?;
        self.store.check(
            &profile,
            SetContext {
                target_connector,
                active: self.tracker.active(),
                now,
            },
        )
    }

    /// Roll back a station-wide install of `profile_id`, then recompute.
    pub fn restore_profiles(
        &mut self,
        profile_id: i32,
        displaced: Vec<StoredProfile>,
        now: DateTime<Utc>,
    ) -> Vec<i32> {
        let restored = self.store.restore(profile_id, displaced);
        self.recompute(now);
        restored
    }

    pub fn clear_profiles(&mut self, criteria: &ClearCriteria, now: DateTime<Utc>) -> ClearOutcome {
        let outcome = self.store.clear(criteria);
        self.recompute(now);
        outcome
    }

    pub fn start_transaction(&mut self, transaction_id: i32, now: DateTime<Utc>) -> ChargingResult<Vec<i32>> {
        let bound = self.tracker.on_start(&mut self.store, transaction_id, now)?;
        self.recompute(now);
        Ok(bound)
    }

    pub fn stop_transaction(&mut self, now: DateTime<Utc>) -> Option<StoppedTransaction> {
        let stopped = self.tracker.on_stop(&mut self.store, now);
        if stopped.is_some() {
            self.recompute(now);
        }
        stopped
    }

    /// Swap the electrical configuration. Installed profiles keep the Watt
    /// values they were normalized to.
    pub fn reconfigure(&mut self, electrical: ElectricalConfig, now: DateTime<Utc>) -> ChargingResult<()> {
        let physical_limit_w = electrical.physical_limit_w()?;
        info!(
            connector_id = self.connector_id,
            voltage = electrical.voltage,
            phases = electrical.phases,
            physical_limit_w,
            "Connector reconfigured"
        );
        self.electrical = electrical;
        self.physical_limit_w = physical_limit_w;
        self.recompute(now);
        Ok(())
    }

    /// Disconnect: drop every profile and the transaction, keep the
    /// electrical configuration.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Vec<i32> {
        let cleared = self.store.reset();
        self.tracker.reset();
        warn!(connector_id = self.connector_id, cleared = ?cleared, "Connector state reset");
        self.recompute(now);
        cleared
    }

    /// Prune expired profiles and re-derive the effective limit at `now`.
    pub fn recompute(&mut self, now: DateTime<Utc>) -> Recomputed {
        let pruned = self.store.prune_expired(now);
        if !pruned.is_empty() {
            debug!(connector_id = self.connector_id, pruned = ?pruned, "Expired profiles pruned");
        }

        let previous = self.effective;
        self.resolved = resolver::resolve(&self.store, self.tracker.active(), now);
        self.effective = combine(self.physical_limit_w, self.resolved.as_ref());
        self.computed_at = now;

        if previous != self.effective {
            info!(
                connector_id = self.connector_id,
                limit_w = self.effective.limit_w,
                source = %self.effective.source,
                previous_limit_w = previous.limit_w,
                "Effective limit changed"
            );
        }

        Recomputed {
            previous,
            current: self.effective,
            pruned,
        }
    }

    /// Effective limit the connector would have at `at`, assuming no commands
    /// arrive in between. Does not modify state.
    pub fn limit_at(&self, at: DateTime<Utc>) -> EffectiveLimit {
        let resolved = resolver::resolve(&self.store, self.tracker.active(), at);
        combine(self.physical_limit_w, resolved.as_ref())
    }

    /// Earliest instant after `now` at which the effective limit may change.
    pub fn next_transition(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let active = self.tracker.active();
        self.store
            .iter()
            .filter(|s| s.is_eligible(active))
            .filter_map(|s| s.next_transition(now))
            .min()
    }

    pub fn snapshot(&self) -> ConnectorSnapshot {
        let now = self.computed_at;
        let profiles = self
            .store
            .get()
            .into_iter()
            .map(|s| ProfileSummary {
                id: s.id(),
                purpose: s.purpose(),
                stack_level: s.stack_level(),
                kind: s.profile.kind.as_str(),
                target_connector: s.target_connector,
                transaction_id: s.bound_transaction.or(s.profile.transaction_id),
                rate_unit: s.profile.schedule.rate_unit,
                valid_from: s.profile.valid_from,
                valid_to: s.profile.valid_to,
                active_limit_w: s.active_limit(now),
            })
            .collect();

        ConnectorSnapshot {
            connector_id: self.connector_id,
            electrical: self.electrical,
            physical_limit_w: self.physical_limit_w,
            effective_limit: self.effective,
            resolved: self.resolved,
            state: self.tracker.state(),
            active_transaction: self.tracker.active().copied(),
            profiles,
            computed_at: self.computed_at,
        }
    }
}
