//! Connector domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::units;
use crate::shared::{ChargingError, ChargingResult};

/// Physical configuration of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectricalConfig {
    /// Phase-to-neutral voltage (V)
    pub voltage: f64,
    /// Number of phases wired to the connector (1-3)
    pub phases: u8,
    /// Maximum current per phase (A)
    pub max_current_a: f64,
    /// Optional power cap of the EVSE (W), applied on top of the current limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_power_w: Option<f64>,
}

impl ElectricalConfig {
    pub fn new(voltage: f64, phases: u8, max_current_a: f64) -> Self {
        Self {
            voltage,
            phases,
            max_current_a,
            max_power_w: None,
        }
    }

    pub fn with_max_power(mut self, max_power_w: f64) -> Self {
        self.max_power_w = Some(max_power_w);
        self
    }

    /// The hard ceiling of the hardware in Watts.
    pub fn physical_limit_w(&self) -> ChargingResult<f64> {
        if !(self.max_current_a >= 0.0) {
            return Err(ChargingError::InvalidConfiguration(format!(
                "max current must be non-negative, got {}",
                self.max_current_a
            )));
        }
        let by_current = units::to_watts(self.max_current_a, self.voltage, self.phases)?;
        match self.max_power_w {
            Some(cap) if !(cap >= 0.0) => Err(ChargingError::InvalidConfiguration(format!(
                "max power must be non-negative, got {}",
                cap
            ))),
            Some(cap) => Ok(by_current.min(cap)),
            None => Ok(by_current),
        }
    }
}

/// Mechanism that currently binds the connector's power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitSource {
    Physical,
    ChargePointMaxProfile,
    TxDefaultProfile,
    TxProfile,
}

impl LimitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Physical => "Physical",
            Self::ChargePointMaxProfile => "ChargePointMaxProfile",
            Self::TxDefaultProfile => "TxDefaultProfile",
            Self::TxProfile => "TxProfile",
        }
    }
}

impl std::fmt::Display for LimitSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single authoritative limit of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveLimit {
    pub limit_w: f64,
    pub source: LimitSource,
}

impl EffectiveLimit {
    pub fn physical(limit_w: f64) -> Self {
        Self {
            limit_w,
            source: LimitSource::Physical,
        }
    }
}

/// Charging-profile applicability state of a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingState {
    /// No transaction; TxProfile not eligible
    Idle,
    /// Transaction running; TxProfile eligible
    Charging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTransaction {
    pub transaction_id: i32,
    pub started_at: DateTime<Utc>,
}
