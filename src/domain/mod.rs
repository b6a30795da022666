pub mod charging_profile;
pub mod connector;
pub mod units;

// Re-export commonly used types
pub use charging_profile::{
    ChargingProfile, ChargingProfilePurpose, ChargingSchedule, ProfileKind, RateUnit,
    RecurrencyKind, SchedulePeriod,
};
pub use connector::{ActiveTransaction, ChargingState, EffectiveLimit, ElectricalConfig, LimitSource};
