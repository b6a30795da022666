//! Notification events
//!
//! Defines all event types published by connector workers and meter samplers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChargingProfilePurpose, LimitSource};

/// Event types for notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// Effective limit of a connector moved
    EffectiveLimitChanged(EffectiveLimitChangedEvent),
    /// SetChargingProfile accepted
    ProfileInstalled(ProfileInstalledEvent),
    /// SetChargingProfile rejected
    ProfileRejected(ProfileRejectedEvent),
    /// Profiles removed by ClearChargingProfile, expiry or transaction end
    ProfilesCleared(ProfilesClearedEvent),
    /// Transaction started
    TransactionStarted(TransactionStartedEvent),
    /// Transaction stopped
    TransactionStopped(TransactionStoppedEvent),
    /// Meter values sampled
    MeterValuesSampled(MeterValuesEvent),
}

impl Event {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::EffectiveLimitChanged(_) => "effective_limit_changed",
            Event::ProfileInstalled(_) => "profile_installed",
            Event::ProfileRejected(_) => "profile_rejected",
            Event::ProfilesCleared(_) => "profiles_cleared",
            Event::TransactionStarted(_) => "transaction_started",
            Event::TransactionStopped(_) => "transaction_stopped",
            Event::MeterValuesSampled(_) => "meter_values_sampled",
        }
    }

    pub fn station_id(&self) -> &str {
        match self {
            Event::EffectiveLimitChanged(e) => &e.station_id,
            Event::ProfileInstalled(e) => &e.station_id,
            Event::ProfileRejected(e) => &e.station_id,
            Event::ProfilesCleared(e) => &e.station_id,
            Event::TransactionStarted(e) => &e.station_id,
            Event::TransactionStopped(e) => &e.station_id,
            Event::MeterValuesSampled(e) => &e.station_id,
        }
    }

    pub fn connector_id(&self) -> u32 {
        match self {
            Event::EffectiveLimitChanged(e) => e.connector_id,
            Event::ProfileInstalled(e) => e.connector_id,
            Event::ProfileRejected(e) => e.connector_id,
            Event::ProfilesCleared(e) => e.connector_id,
            Event::TransactionStarted(e) => e.connector_id,
            Event::TransactionStopped(e) => e.connector_id,
            Event::MeterValuesSampled(e) => e.connector_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveLimitChangedEvent {
    pub station_id: String,
    pub connector_id: u32,
    pub previous_limit_w: f64,
    pub limit_w: f64,
    pub source: LimitSource,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileInstalledEvent {
    pub station_id: String,
    pub connector_id: u32,
    pub profile_id: i32,
    pub purpose: ChargingProfilePurpose,
    pub stack_level: u32,
    pub replaced: Vec<i32>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRejectedEvent {
    pub station_id: String,
    pub connector_id: u32,
    pub profile_id: i32,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesClearedEvent {
    pub station_id: String,
    pub connector_id: u32,
    pub profile_ids: Vec<i32>,
    /// "request", "expired", "transaction_stopped" or "reset"
    pub cause: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStartedEvent {
    pub station_id: String,
    pub connector_id: u32,
    pub transaction_id: i32,
    pub bound_profiles: Vec<i32>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStoppedEvent {
    pub station_id: String,
    pub connector_id: u32,
    pub transaction_id: i32,
    pub duration_secs: i64,
    pub timestamp: DateTime<Utc>,
}

/// Meter values event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterValuesEvent {
    pub station_id: String,
    pub connector_id: u32,
    pub transaction_id: Option<i32>,
    /// Cumulative energy register in Wh
    pub energy_wh: f64,
    /// Energy delivered in the current transaction in Wh
    pub session_energy_wh: f64,
    /// Active import power in W
    pub power_w: f64,
    /// Per-phase current in A
    pub current_a: f64,
    /// Limit the power was capped by, in W
    pub offered_w: f64,
    pub soc: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper for sending events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}
