//! ChargingProfile domain entity
//!
//! Profiles are validated and normalized to Watts once, when they are
//! accepted (see [`super::ingest`]). Everything downstream works on these
//! types and never re-inspects the raw OCPP payload.

use chrono::{DateTime, Duration, Utc};
use rust_ocpp::v1_6::types::{
    ChargingProfilePurposeType, ChargingRateUnitType, RecurrencyKindType,
};
use serde::{Deserialize, Serialize};

use crate::domain::connector::LimitSource;

/// OCPP 1.6 charging profile purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargingProfilePurpose {
    ChargePointMaxProfile,
    TxDefaultProfile,
    TxProfile,
}

impl ChargingProfilePurpose {
    /// Resolution order, highest precedence first.
    pub const PRECEDENCE: [Self; 3] = [
        Self::TxProfile,
        Self::TxDefaultProfile,
        Self::ChargePointMaxProfile,
    ];

    /// Position in [`Self::PRECEDENCE`] (0 = highest).
    pub fn rank(&self) -> usize {
        match self {
            Self::TxProfile => 0,
            Self::TxDefaultProfile => 1,
            Self::ChargePointMaxProfile => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChargePointMaxProfile => "ChargePointMaxProfile",
            Self::TxDefaultProfile => "TxDefaultProfile",
            Self::TxProfile => "TxProfile",
        }
    }
}

impl std::fmt::Display for ChargingProfilePurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ChargingProfilePurposeType> for ChargingProfilePurpose {
    fn from(value: &ChargingProfilePurposeType) -> Self {
        match value {
            ChargingProfilePurposeType::ChargePointMaxProfile => Self::ChargePointMaxProfile,
            ChargingProfilePurposeType::TxDefaultProfile => Self::TxDefaultProfile,
            ChargingProfilePurposeType::TxProfile => Self::TxProfile,
        }
    }
}

impl From<ChargingProfilePurpose> for LimitSource {
    fn from(value: ChargingProfilePurpose) -> Self {
        match value {
            ChargingProfilePurpose::ChargePointMaxProfile => LimitSource::ChargePointMaxProfile,
            ChargingProfilePurpose::TxDefaultProfile => LimitSource::TxDefaultProfile,
            ChargingProfilePurpose::TxProfile => LimitSource::TxProfile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrencyKind {
    Daily,
    Weekly,
}

impl RecurrencyKind {
    pub fn cycle(&self) -> Duration {
        match self {
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::weeks(1),
        }
    }

    /// Anchor used when a recurring schedule has no `startSchedule`:
    /// midnight UTC for daily cycles, Monday midnight UTC for weekly ones.
    pub fn default_anchor(&self) -> DateTime<Utc> {
        let epoch = DateTime::<Utc>::default();
        match self {
            Self::Daily => epoch,
            // 1970-01-01 was a Thursday
            Self::Weekly => epoch + Duration::days(4),
        }
    }
}

impl From<&RecurrencyKindType> for RecurrencyKind {
    fn from(value: &RecurrencyKindType) -> Self {
        match value {
            RecurrencyKindType::Daily => Self::Daily,
            RecurrencyKindType::Weekly => Self::Weekly,
        }
    }
}

/// How the schedule start (`T0`) of a profile is determined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProfileKind {
    /// Starts at a fixed instant
    Absolute { start: DateTime<Utc> },
    /// Starts when the profile becomes active (transaction start or install time)
    Relative,
    /// Restarts every day or week, aligned to `anchor`
    Recurring {
        recurrency: RecurrencyKind,
        anchor: DateTime<Utc>,
    },
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absolute { .. } => "Absolute",
            Self::Relative => "Relative",
            Self::Recurring { .. } => "Recurring",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateUnit {
    A,
    W,
}

impl From<&ChargingRateUnitType> for RateUnit {
    fn from(value: &ChargingRateUnitType) -> Self {
        match value {
            ChargingRateUnitType::A => Self::A,
            ChargingRateUnitType::W => Self::W,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulePeriod {
    /// Offset from the schedule start, in seconds
    pub start_offset_secs: i64,
    /// Limit normalized to Watts at acceptance time
    pub limit_w: f64,
    /// Limit as submitted, in the schedule's rate unit
    pub requested_limit: f64,
    pub number_phases: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSchedule {
    /// Seconds; `None` means open-ended
    pub duration_secs: Option<i64>,
    /// Unit the CSMS used; limits are stored in W regardless
    pub rate_unit: RateUnit,
    pub min_charging_rate: Option<f64>,
    /// Strictly increasing `start_offset_secs`
    pub periods: Vec<SchedulePeriod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingProfile {
    pub id: i32,
    pub stack_level: u32,
    pub purpose: ChargingProfilePurpose,
    pub kind: ProfileKind,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    /// Only meaningful for TxProfile
    pub transaction_id: Option<i32>,
    pub schedule: ChargingSchedule,
}

impl ChargingProfile {
    /// Whether `now` lies within `[valid_from, valid_to]`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| now >= from)
            && self.valid_to.map_or(true, |to| now <= to)
    }

    /// Whether the profile can never apply again after `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.valid_to.map_or(false, |to| now > to) {
            return true;
        }
        match (self.kind, self.schedule.duration_secs) {
            (ProfileKind::Absolute { start }, Some(duration)) => {
                now > start + Duration::seconds(duration)
            }
            _ => false,
        }
    }
}
