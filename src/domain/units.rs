//! Unit conversion between Amps, Watts and kW for AC connectors.
//!
//! `watts = amps × voltage × phases`. Voltage is the phase-to-neutral value
//! the connector is configured with.

use crate::shared::{ChargingError, ChargingResult};

/// Convert a per-phase current to total power.
pub fn to_watts(amps: f64, voltage: f64, phases: u8) -> ChargingResult<f64> {
    check_electrical(voltage, phases)?;
    Ok(amps * voltage * f64::from(phases))
}

/// Convert total power to a per-phase current.
pub fn to_amps(watts: f64, voltage: f64, phases: u8) -> ChargingResult<f64> {
    check_electrical(voltage, phases)?;
    Ok(watts / (voltage * f64::from(phases)))
}

pub fn watts_to_kw(watts: f64) -> f64 {
    watts / 1000.0
}

pub fn kw_to_watts(kw: f64) -> f64 {
    kw * 1000.0
}

fn check_electrical(voltage: f64, phases: u8) -> ChargingResult<()> {
    if !(voltage > 0.0) || !voltage.is_finite() {
        return Err(ChargingError::InvalidConfiguration(format!(
            "voltage must be positive, got {}",
            voltage
        )));
    }
    if !(1..=3).contains(&phases) {
        return Err(ChargingError::InvalidConfiguration(format!(
            "phase count must be 1, 2 or 3, got {}",
            phases
        )));
    }
    Ok(())
}
