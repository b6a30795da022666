//! Connector aggregate
//!
//! Electrical configuration of a simulated EVSE connector and the derived
//! power-limit types published to telemetry and UI consumers.

pub mod model;

pub use model::{ActiveTransaction, ChargingState, EffectiveLimit, ElectricalConfig, LimitSource};
