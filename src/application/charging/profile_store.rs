//! Per-connector collection of installed charging profiles.
//!
//! The store enforces the conflict rules (replacement by id and by
//! purpose/stack level, TxProfile binding) and keeps insertion order so the
//! resolver can break ties in favour of the most recent profile.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::charging_profile::schedule;
use crate::domain::{ActiveTransaction, ChargingProfile, ChargingProfilePurpose, ProfileKind};
use crate::shared::{ChargingError, ChargingResult};

/// What to do with a TxProfile received while no transaction is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxProfilePolicy {
    /// Reject with `NoActiveTransaction`
    #[default]
    Reject,
    /// Keep it pending and bind it to the next transaction that starts
    NextTransaction,
}

/// Acceptance rules shared by all connectors of a station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartChargingRules {
    pub tx_profile_without_transaction: TxProfilePolicy,
    /// ChargeProfileMaxStackLevel
    pub max_stack_level: u32,
    /// ChargingScheduleMaxPeriods
    pub max_schedule_periods: usize,
    /// MaxChargingProfilesInstalled
    pub max_installed_profiles: usize,
}

impl Default for SmartChargingRules {
    fn default() -> Self {
        Self {
            tx_profile_without_transaction: TxProfilePolicy::Reject,
            max_stack_level: 10,
            max_schedule_periods: 24,
            max_installed_profiles: 16,
        }
    }
}

/// A profile as held by the store, with the bookkeeping needed to evaluate it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredProfile {
    pub profile: ChargingProfile,
    /// Connector id the CSMS addressed; 0 for a station-wide copy
    pub target_connector: u32,
    pub installed_at: DateTime<Utc>,
    /// Transaction a TxProfile applies to; `None` while pending
    pub bound_transaction: Option<i32>,
    /// Schedule start of a Relative profile
    pub relative_anchor: Option<DateTime<Utc>>,
    seq: u64,
}

impl StoredProfile {
    pub fn id(&self) -> i32 {
        self.profile.id
    }

    pub fn purpose(&self) -> ChargingProfilePurpose {
        self.profile.purpose
    }

    pub fn stack_level(&self) -> u32 {
        self.profile.stack_level
    }

    /// Insertion order within the store; larger is more recent.
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    pub fn active_limit(&self, now: DateTime<Utc>) -> Option<f64> {
        schedule::active_limit(&self.profile, now, self.relative_anchor)
    }

    pub fn next_transition(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        schedule::next_transition(&self.profile, now, self.relative_anchor)
    }

    /// Whether the profile can never apply again after `now`. A Relative
    /// schedule ends `duration` after its anchor.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.profile.is_expired_at(now) {
            return true;
        }
        match (self.profile.kind, self.relative_anchor, self.profile.schedule.duration_secs) {
            (ProfileKind::Relative, Some(anchor), Some(duration)) => {
                now > anchor + Duration::seconds(duration)
            }
            _ => false,
        }
    }

    /// Whether this profile may constrain the connector given its transaction.
    pub fn is_eligible(&self, active: Option<&ActiveTransaction>) -> bool {
        match self.profile.purpose {
            ChargingProfilePurpose::TxProfile => match (active, self.bound_transaction) {
                (Some(tx), Some(bound)) => tx.transaction_id == bound,
                _ => false,
            },
            _ => true,
        }
    }
}

/// Per-request inputs to [`ProfileStore::set`].
#[derive(Debug, Clone, Copy)]
pub struct SetContext<'a> {
    pub target_connector: u32,
    pub active: Option<&'a ActiveTransaction>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SetOutcome {
    /// Ids of the profiles this one displaced
    pub replaced: Vec<i32>,
    /// `false` when a TxProfile is waiting for the next transaction
    pub bound: bool,
    /// The displaced profiles themselves, for [`ProfileStore::restore`]
    #[serde(skip)]
    pub displaced: Vec<StoredProfile>,
}

/// Placement of a profile that passed every acceptance rule.
struct Admission {
    bound_transaction: Option<i32>,
    relative_anchor: Option<DateTime<Utc>>,
    replaced: Vec<i32>,
}

/// A new profile displaces one with the same id or the same purpose and
/// stack level.
fn displaces(new: &ChargingProfile, stored: &StoredProfile) -> bool {
    stored.id() == new.id
        || (stored.purpose() == new.purpose && stored.stack_level() == new.stack_level)
}

/// ClearChargingProfile criteria. Every criterion present must match; an
/// empty criteria set matches every profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCriteria {
    pub id: Option<i32>,
    pub connector_id: Option<u32>,
    pub purpose: Option<ChargingProfilePurpose>,
    pub stack_level: Option<u32>,
}

impl ClearCriteria {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: i32) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn matches(&self, stored: &StoredProfile) -> bool {
        self.id.map_or(true, |id| stored.id() == id)
            && self
                .connector_id
                .map_or(true, |c| stored.target_connector == c)
            && self.purpose.map_or(true, |p| stored.purpose() == p)
            && self.stack_level.map_or(true, |s| stored.stack_level() == s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearOutcome {
    pub cleared_count: usize,
    pub cleared_ids: Vec<i32>,
}

impl ClearOutcome {
    pub fn merge(&mut self, other: ClearOutcome) {
        self.cleared_count += other.cleared_count;
        self.cleared_ids.extend(other.cleared_ids);
    }
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    connector_id: u32,
    rules: SmartChargingRules,
    profiles: Vec<StoredProfile>,
    next_seq: u64,
}

impl ProfileStore {
    pub fn new(connector_id: u32, rules: SmartChargingRules) -> Self {
        Self {
            connector_id,
            rules,
            profiles: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn rules(&self) -> &SmartChargingRules {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Unordered view of the stored profiles.
    pub fn iter(&self) -> impl Iterator<Item = &StoredProfile> {
        self.profiles.iter()
    }

    /// Run every acceptance rule for `profile` without touching the store.
    /// Returns the ids [`set`](Self::set) would displace.
    pub fn check(&self, profile: &ChargingProfile, ctx: SetContext<'_>) -> ChargingResult<Vec<i32>> {
        self.admit(profile, ctx).map(|a| a.replaced)
    }

    /// Install `profile`, replacing any profile with the same id or the same
    /// purpose and stack level. Nothing changes when the profile is rejected.
    pub fn set(&mut self, profile: ChargingProfile, ctx: SetContext<'_>) -> ChargingResult<SetOutcome> {
        let Admission {
            bound_transaction,
            relative_anchor,
            replaced,
        } = self.admit(&profile, ctx)?;

        let (displaced, kept): (Vec<StoredProfile>, Vec<StoredProfile>) =
            std::mem::take(&mut self.profiles)
                .into_iter()
                .partition(|s| displaces(&profile, s));
        self.profiles = kept;

        let seq = self.next_seq;
        self.next_seq += 1;

        info!(
            connector_id = self.connector_id,
            profile_id = profile.id,
            purpose = %profile.purpose,
            stack_level = profile.stack_level,
            kind = profile.kind.as_str(),
            target_connector = ctx.target_connector,
            bound_transaction = ?bound_transaction,
            replaced = ?replaced,
            "Charging profile stored"
        );

        let bound = profile.purpose != ChargingProfilePurpose::TxProfile || bound_transaction.is_some();
        self.profiles.push(StoredProfile {
            profile,
            target_connector: ctx.target_connector,
            installed_at: ctx.now,
            bound_transaction,
            relative_anchor,
            seq,
        });

        Ok(SetOutcome {
            replaced,
            bound,
            displaced,
        })
    }

    /// Undo a station-wide install: drop the connector-0 copy of `profile_id`
    /// and put back the profiles it displaced, with their original insertion
    /// order. Returns the ids restored.
    pub fn restore(&mut self, profile_id: i32, displaced: Vec<StoredProfile>) -> Vec<i32> {
        self.remove_where(|s| s.id() == profile_id && s.target_connector == 0);
        let restored: Vec<i32> = displaced.iter().map(StoredProfile::id).collect();
        self.profiles.extend(displaced);
        if !restored.is_empty() {
            info!(
                connector_id = self.connector_id,
                profile_id,
                restored = ?restored,
                "Displaced charging profiles restored"
            );
        }
        restored
    }

    fn admit(&self, profile: &ChargingProfile, ctx: SetContext<'_>) -> ChargingResult<Admission> {
        self.check_limits(profile)?;

        let (bound_transaction, relative_anchor) = match profile.purpose {
            ChargingProfilePurpose::TxProfile => self.bind_on_set(profile, ctx)?,
            _ => (None, Some(ctx.now)),
        };

        let replaced: Vec<i32> = self
            .profiles
            .iter()
            .filter(|s| displaces(profile, s))
            .map(StoredProfile::id)
            .collect();

        if self.profiles.len() - replaced.len() >= self.rules.max_installed_profiles {
            return Err(ChargingError::InvalidProfile(format!(
                "connector {} already holds {} profiles",
                self.connector_id, self.rules.max_installed_profiles
            )));
        }

        Ok(Admission {
            bound_transaction,
            relative_anchor,
            replaced,
        })
    }

    fn check_limits(&self, profile: &ChargingProfile) -> ChargingResult<()> {
        if profile.stack_level > self.rules.max_stack_level {
            return Err(ChargingError::InvalidProfile(format!(
                "stackLevel {} exceeds maximum {}",
                profile.stack_level, self.rules.max_stack_level
            )));
        }
        if profile.schedule.periods.len() > self.rules.max_schedule_periods {
            return Err(ChargingError::InvalidProfile(format!(
                "schedule has {} periods, maximum is {}",
                profile.schedule.periods.len(),
                self.rules.max_schedule_periods
            )));
        }
        Ok(())
    }

    /// Transaction binding and Relative anchor of an incoming TxProfile.
    fn bind_on_set(
        &self,
        profile: &ChargingProfile,
        ctx: SetContext<'_>,
    ) -> ChargingResult<(Option<i32>, Option<DateTime<Utc>>)> {
        if ctx.target_connector == 0 {
            return Err(ChargingError::InvalidProfile(
                "TxProfile cannot target connector 0".into(),
            ));
        }

        match ctx.active {
            Some(tx) => match profile.transaction_id {
                Some(requested) if requested != tx.transaction_id => {
                    Err(ChargingError::TransactionMismatch {
                        connector_id: self.connector_id,
                        requested,
                        active: tx.transaction_id,
                    })
                }
                _ => Ok((Some(tx.transaction_id), Some(tx.started_at))),
            },
            None => match self.rules.tx_profile_without_transaction {
                TxProfilePolicy::Reject => Err(ChargingError::NoActiveTransaction(self.connector_id)),
                TxProfilePolicy::NextTransaction => Ok((None, None)),
            },
        }
    }

    /// Remove every profile matching `criteria`. Clearing nothing is not an error.
    pub fn clear(&mut self, criteria: &ClearCriteria) -> ClearOutcome {
        let outcome = self.remove_where(|s| criteria.matches(s));
        if outcome.cleared_count > 0 {
            info!(
                connector_id = self.connector_id,
                cleared = ?outcome.cleared_ids,
                "Charging profiles cleared"
            );
        } else {
            debug!(connector_id = self.connector_id, ?criteria, "No charging profile matched");
        }
        outcome
    }

    /// Profiles ordered by purpose precedence, then stack level (highest
    /// first), then insertion order.
    pub fn get(&self) -> Vec<&StoredProfile> {
        let mut ordered: Vec<&StoredProfile> = self.profiles.iter().collect();
        ordered.sort_by(|a, b| {
            a.purpose()
                .rank()
                .cmp(&b.purpose().rank())
                .then(b.stack_level().cmp(&a.stack_level()))
                .then(a.seq.cmp(&b.seq))
        });
        ordered
    }

    /// Drop the TxProfiles bound to `transaction_id`.
    pub fn purge_transaction(&mut self, transaction_id: i32) -> Vec<i32> {
        let outcome = self.remove_where(|s| {
            s.purpose() == ChargingProfilePurpose::TxProfile
                && s.bound_transaction == Some(transaction_id)
        });
        outcome.cleared_ids
    }

    /// Bind pending TxProfiles to the transaction that just started and anchor
    /// Relative ones at its start.
    pub fn bind_pending(&mut self, tx: &ActiveTransaction) -> Vec<i32> {
        let mut bound = Vec::new();
        for stored in self.profiles.iter_mut().filter(|s| {
            s.purpose() == ChargingProfilePurpose::TxProfile && s.bound_transaction.is_none()
        }) {
            if stored
                .profile
                .transaction_id
                .map_or(true, |id| id == tx.transaction_id)
            {
                stored.bound_transaction = Some(tx.transaction_id);
                if stored.profile.kind == ProfileKind::Relative {
                    stored.relative_anchor = Some(tx.started_at);
                }
                bound.push(stored.id());
            }
        }
        bound
    }

    /// Drop profiles that can never apply again.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> Vec<i32> {
        self.remove_where(|s| s.is_expired(now)).cleared_ids
    }

    pub fn reset(&mut self) -> Vec<i32> {
        self.remove_where(|_| true).cleared_ids
    }

    fn remove_where(&mut self, mut predicate: impl FnMut(&StoredProfile) -> bool) -> ClearOutcome {
        let mut outcome = ClearOutcome::default();
        self.profiles.retain(|s| {
            if predicate(s) {
                outcome.cleared_count += 1;
                outcome.cleared_ids.push(s.id());
                false
            } else {
                true
            }
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChargingSchedule, RateUnit, SchedulePeriod};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    fn profile(id: i32, purpose: ChargingProfilePurpose, stack_level: u32, limit_w: f64) -> ChargingProfile {
        ChargingProfile {
            id,
            stack_level,
            purpose,
            kind: ProfileKind::Relative,
            valid_from: None,
            valid_to: None,
            transaction_id: None,
            schedule: ChargingSchedule {
                duration_secs: None,
                rate_unit: RateUnit::W,
                min_charging_rate: None,
                periods: vec![SchedulePeriod {
                    start_offset_secs: 0,
                    limit_w,
                    requested_limit: limit_w,
                    number_phases: None,
                }],
            },
        }
    }

    fn ctx(active: Option<&ActiveTransaction>) -> SetContext<'_> {
        SetContext {
            target_connector: 1,
            active,
            now: now(),
        }
    }

    fn store() -> ProfileStore {
        ProfileStore::new(1, SmartChargingRules::default())
    }

    fn tx(id: i32) -> ActiveTransaction {
        ActiveTransaction {
            transaction_id: id,
            started_at: now(),
        }
    }

    #[test]
    fn same_purpose_and_stack_level_replaces() {
        let mut store = store();
        store
            .set(profile(1, ChargingProfilePurpose::TxDefaultProfile, 2, 7_000.0), ctx(None))
            .unwrap();
        let outcome = store
            .set(profile(2, ChargingProfilePurpose::TxDefaultProfile, 2, 5_000.0), ctx(None))
            .unwrap();
        assert_eq!(outcome.replaced, vec![1]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get()[0].id(), 2);
    }

    #[test]
    fn same_id_replaces_across_stack_levels() {
        let mut store = store();
        store
            .set(profile(5, ChargingProfilePurpose::TxDefaultProfile, 1, 7_000.0), ctx(None))
            .unwrap();
        store
            .set(profile(5, ChargingProfilePurpose::ChargePointMaxProfile, 0, 9_000.0), ctx(None))
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get()[0].purpose(), ChargingProfilePurpose::ChargePointMaxProfile);
    }

    #[test]
    fn tx_profile_without_transaction_rejected_by_default() {
        let mut store = store();
        let err = store
            .set(profile(1, ChargingProfilePurpose::TxProfile, 0, 7_000.0), ctx(None))
            .unwrap_err();
        assert_eq!(err, ChargingError::NoActiveTransaction(1));
        assert!(store.is_empty());
    }

    #[test]
    fn tx_profile_for_other_transaction_rejected() {
        let mut store = store();
        let active = tx(42);
        let mut p = profile(1, ChargingProfilePurpose::TxProfile, 0, 7_000.0);
        p.transaction_id = Some(41);
        let err = store.set(p, ctx(Some(&active))).unwrap_err();
        assert!(matches!(err, ChargingError::TransactionMismatch { requested: 41, active: 42, .. }));
    }

    #[test]
    fn tx_profile_binds_to_active_transaction() {
        let mut store = store();
        let active = tx(42);
        let outcome = store
            .set(profile(1, ChargingProfilePurpose::TxProfile, 0, 7_000.0), ctx(Some(&active)))
            .unwrap();
        assert!(outcome.bound);
        let stored = store.get()[0];
        assert_eq!(stored.bound_transaction, Some(42));
        assert!(stored.is_eligible(Some(&active)));
        assert!(!stored.is_eligible(Some(&tx(43))));
        assert!(!stored.is_eligible(None));
    }

    #[test]
    fn tx_profile_on_connector_zero_rejected() {
        let mut store = store();
        let active = tx(1);
        let ctx = SetContext {
            target_connector: 0,
            active: Some(&active),
            now: now(),
        };
        assert!(matches!(
            store.set(profile(1, ChargingProfilePurpose::TxProfile, 0, 7_000.0), ctx),
            Err(ChargingError::InvalidProfile(_))
        ));
    }

    #[test]
    fn pending_tx_profile_binds_on_next_transaction() {
        let rules = SmartChargingRules {
            tx_profile_without_transaction: TxProfilePolicy::NextTransaction,
            ..SmartChargingRules::default()
        };
        let mut store = ProfileStore::new(1, rules);
        let outcome = store
            .set(profile(9, ChargingProfilePurpose::TxProfile, 0, 4_000.0), ctx(None))
            .unwrap();
        assert!(!outcome.bound);
        assert!(!store.get()[0].is_eligible(None));

        let started = ActiveTransaction {
            transaction_id: 7,
            started_at: now() + Duration::minutes(5),
        };
        assert_eq!(store.bind_pending(&started), vec![9]);
        let stored = store.get()[0];
        assert_eq!(stored.bound_transaction, Some(7));
        assert_eq!(stored.relative_anchor, Some(started.started_at));
    }

    #[test]
    fn get_orders_by_precedence_then_stack_level() {
        let mut store = store();
        let active = tx(1);
        store
            .set(profile(1, ChargingProfilePurpose::ChargePointMaxProfile, 0, 1.0), ctx(None))
            .unwrap();
        store
            .set(profile(2, ChargingProfilePurpose::TxDefaultProfile, 1, 1.0), ctx(None))
            .unwrap();
        store
            .set(profile(3, ChargingProfilePurpose::TxDefaultProfile, 4, 1.0), ctx(None))
            .unwrap();
        store
            .set(profile(4, ChargingProfilePurpose::TxProfile, 0, 1.0), ctx(Some(&active)))
            .unwrap();

        let ids: Vec<i32> = store.get().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }

    #[test]
    fn clear_requires_every_present_criterion() {
        let mut store = store();
        store
            .set(profile(1, ChargingProfilePurpose::TxDefaultProfile, 0, 1.0), ctx(None))
            .unwrap();
        store
            .set(profile(2, ChargingProfilePurpose::TxDefaultProfile, 1, 1.0), ctx(None))
            .unwrap();
        store
            .set(profile(3, ChargingProfilePurpose::ChargePointMaxProfile, 1, 1.0), ctx(None))
            .unwrap();

        let criteria = ClearCriteria {
            purpose: Some(ChargingProfilePurpose::TxDefaultProfile),
            stack_level: Some(1),
            ..ClearCriteria::default()
        };
        let outcome = store.clear(&criteria);
        assert_eq!(outcome.cleared_ids, vec![2]);

        let again = store.clear(&criteria);
        assert_eq!(again.cleared_count, 0);

        let rest = store.clear(&ClearCriteria::all());
        assert_eq!(rest.cleared_count, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn connector_criterion_matches_the_addressed_connector() {
        let mut store = store();
        let station_wide = SetContext {
            target_connector: 0,
            ..ctx(None)
        };
        store
            .set(profile(1, ChargingProfilePurpose::ChargePointMaxProfile, 0, 1.0), station_wide)
            .unwrap();
        store
            .set(profile(2, ChargingProfilePurpose::TxDefaultProfile, 0, 1.0), ctx(None))
            .unwrap();

        let own = ClearCriteria {
            connector_id: Some(1),
            ..ClearCriteria::default()
        };
        assert_eq!(store.clear(&own).cleared_ids, vec![2]);

        let whole_station = ClearCriteria {
            connector_id: Some(0),
            ..ClearCriteria::default()
        };
        assert_eq!(store.clear(&whole_station).cleared_ids, vec![1]);
        assert!(store.is_empty());
    }

    #[test]
    fn purge_only_touches_bound_transaction() {
        let mut store = store();
        let active = tx(10);
        store
            .set(profile(1, ChargingProfilePurpose::TxProfile, 0, 1.0), ctx(Some(&active)))
            .unwrap();
        store
            .set(profile(2, ChargingProfilePurpose::TxDefaultProfile, 0, 1.0), ctx(None))
            .unwrap();
        assert!(store.purge_transaction(11).is_empty());
        assert_eq!(store.purge_transaction(10), vec![1]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn limits_are_enforced_before_mutation() {
        let rules = SmartChargingRules {
            max_stack_level: 2,
            max_installed_profiles: 2,
            ..SmartChargingRules::default()
        };
        let mut store = ProfileStore::new(1, rules);
        assert!(store
            .set(profile(1, ChargingProfilePurpose::TxDefaultProfile, 3, 1.0), ctx(None))
            .is_err());

        store
            .set(profile(1, ChargingProfilePurpose::TxDefaultProfile, 0, 1.0), ctx(None))
            .unwrap();
        store
            .set(profile(2, ChargingProfilePurpose::TxDefaultProfile, 1, 1.0), ctx(None))
            .unwrap();
        assert!(store
            .set(profile(3, ChargingProfilePurpose::TxDefaultProfile, 2, 1.0), ctx(None))
            .is_err());
        // replacing an existing one still fits
        assert!(store
            .set(profile(4, ChargingProfilePurpose::TxDefaultProfile, 1, 1.0), ctx(None))
            .is_ok());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn check_leaves_the_store_untouched() {
        let rules = SmartChargingRules {
            max_installed_profiles: 1,
            ..SmartChargingRules::default()
        };
        let mut store = ProfileStore::new(1, rules);
        store
            .set(profile(1, ChargingProfilePurpose::TxDefaultProfile, 0, 1.0), ctx(None))
            .unwrap();

        let same_slot = profile(2, ChargingProfilePurpose::TxDefaultProfile, 0, 2.0);
        assert_eq!(store.check(&same_slot, ctx(None)).unwrap(), vec![1]);
        let other_slot = profile(3, ChargingProfilePurpose::TxDefaultProfile, 1, 2.0);
        assert!(store.check(&other_slot, ctx(None)).is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get()[0].id(), 1);
    }

    #[test]
    fn restore_puts_displaced_profiles_back() {
        let mut store = store();
        store
            .set(profile(1, ChargingProfilePurpose::TxDefaultProfile, 0, 1.0), ctx(None))
            .unwrap();
        store
            .set(profile(2, ChargingProfilePurpose::TxDefaultProfile, 1, 1.0), ctx(None))
            .unwrap();

        let station_wide = SetContext {
            target_connector: 0,
            ..ctx(None)
        };
        let outcome = store
            .set(profile(9, ChargingProfilePurpose::TxDefaultProfile, 0, 5.0), station_wide)
            .unwrap();
        assert_eq!(outcome.replaced, vec![1]);
        assert_eq!(outcome.displaced.len(), 1);

        assert_eq!(store.restore(9, outcome.displaced), vec![1]);
        let ids: Vec<i32> = store.get().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![2, 1]);
        // original insertion order is kept
        assert_eq!(store.get()[1].sequence(), 0);
    }

    #[test]
    fn expired_profiles_are_pruned() {
        let mut store = store();
        let mut p = profile(1, ChargingProfilePurpose::TxDefaultProfile, 0, 1.0);
        p.valid_to = Some(now() + Duration::minutes(1));
        store.set(p, ctx(None)).unwrap();
        assert!(store.prune_expired(now()).is_empty());
        assert_eq!(store.prune_expired(now() + Duration::minutes(2)), vec![1]);
    }

    #[test]
    fn relative_profile_expires_after_its_duration() {
        let mut store = store();
        let mut p = profile(1, ChargingProfilePurpose::TxDefaultProfile, 0, 1.0);
        p.schedule.duration_secs = Some(120);
        store.set(p, ctx(None)).unwrap();
        assert!(store.prune_expired(now() + Duration::seconds(120)).is_empty());
        assert_eq!(store.prune_expired(now() + Duration::seconds(121)), vec![1]);
    }
}
