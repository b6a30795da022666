//! Telemetry: synthesized meter values driven by the effective limit.

pub mod meter;

pub use meter::{spawn_meter_sampler, MeterSample, MeterSampler, VehicleProfile};
