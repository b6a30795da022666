pub mod charging;
pub mod telemetry;

// Re-export key types for convenience
pub use charging::{
    ClearCriteria, ClearOutcome, ConnectorHandle, ConnectorPowerState, ConnectorSnapshot,
    ProfileStatus, SetChargingProfileResult, SharedStation, SmartChargingRules, Station,
    TxProfilePolicy, WorkerSettings,
};
pub use telemetry::{spawn_meter_sampler, MeterSampler, VehicleProfile};
