//! Charging profile aggregate
//!
//! Contains the ChargingProfile entity, payload ingestion and the schedule
//! evaluator.

pub mod ingest;
pub mod model;
pub mod schedule;

pub use ingest::validate_payload;
pub use model::{
    ChargingProfile, ChargingProfilePurpose, ChargingSchedule, ProfileKind, RateUnit,
    RecurrencyKind, SchedulePeriod,
};
