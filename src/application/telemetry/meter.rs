//! Meter value synthesis
//!
//! Turns the published connector snapshot into MeterValues: the power drawn
//! is the effective limit, capped by what the vehicle accepts and tapered as
//! the battery fills; energy is integrated over the sample interval.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::application::charging::{ConnectorHandle, ConnectorSnapshot};
use crate::domain::units;
use crate::notifications::{Event, MeterValuesEvent, SharedEventBus};
use crate::shared::{SharedClock, ShutdownSignal};

/// SoC above which the vehicle starts reducing its intake.
const TAPER_START_SOC: f64 = 80.0;
/// Fraction of the available power still accepted at 100 % SoC.
const TAPER_FLOOR: f64 = 0.1;

/// Simulated vehicle attached to a connector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleProfile {
    /// On-board charger limit in W
    pub max_power_w: f64,
    pub battery_capacity_wh: f64,
    /// SoC at plug-in, in percent
    pub initial_soc: f64,
    /// Relative downward noise applied to the drawn power (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for VehicleProfile {
    fn default() -> Self {
        Self {
            max_power_w: 11_000.0,
            battery_capacity_wh: 60_000.0,
            initial_soc: 20.0,
            jitter: 0.02,
        }
    }
}

/// One sampled set of meter values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterSample {
    pub connector_id: u32,
    pub transaction_id: Option<i32>,
    pub power_w: f64,
    pub current_a: f64,
    pub offered_w: f64,
    pub energy_wh: f64,
    pub session_energy_wh: f64,
    pub soc: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MeterSampler {
    connector_id: u32,
    vehicle: VehicleProfile,
    /// Energy register, never reset
    energy_wh: f64,
    session_energy_wh: f64,
    soc: f64,
    transaction_id: Option<i32>,
    last_sample: Option<DateTime<Utc>>,
}

impl MeterSampler {
    pub fn new(connector_id: u32, vehicle: VehicleProfile) -> Self {
        Self {
            connector_id,
            vehicle,
            energy_wh: 0.0,
            session_energy_wh: 0.0,
            soc: vehicle.initial_soc.clamp(0.0, 100.0),
            transaction_id: None,
            last_sample: None,
        }
    }

    pub fn with_initial_energy(mut self, energy_wh: f64) -> Self {
        self.energy_wh = energy_wh.max(0.0);
        self
    }

    pub fn energy_wh(&self) -> f64 {
        self.energy_wh
    }

    pub fn soc(&self) -> f64 {
        self.soc
    }

    /// Power the vehicle draws given the offered limit, before noise.
    pub fn demand_w(&self, offered_w: f64) -> f64 {
        let taper = if self.soc <= TAPER_START_SOC {
            1.0
        } else {
            let progress = (self.soc - TAPER_START_SOC) / (100.0 - TAPER_START_SOC);
            1.0 - progress * (1.0 - TAPER_FLOOR)
        };
        if self.soc >= 100.0 {
            return 0.0;
        }
        offered_w.min(self.vehicle.max_power_w).max(0.0) * taper
    }

    /// Produce a sample for `snapshot` at `now`, integrating energy since the
    /// previous sample.
    pub fn sample(&mut self, snapshot: &ConnectorSnapshot, now: DateTime<Utc>, rng: &mut impl Rng) -> MeterSample {
        let transaction_id = snapshot.active_transaction.map(|tx| tx.transaction_id);
        if transaction_id != self.transaction_id {
            if transaction_id.is_some() {
                debug!(connector_id = self.connector_id, ?transaction_id, soc = self.soc, "Vehicle session started");
                self.session_energy_wh = 0.0;
                self.soc = self.vehicle.initial_soc.clamp(0.0, 100.0);
            }
            self.transaction_id = transaction_id;
        }

        let offered_w = snapshot.effective_limit.limit_w;
        let power_w = if transaction_id.is_some() {
            let noise = if self.vehicle.jitter > 0.0 {
                rng.gen_range(0.0..=self.vehicle.jitter.min(1.0))
            } else {
                0.0
            };
            self.demand_w(offered_w) * (1.0 - noise)
        } else {
            0.0
        };

        let elapsed_h = self
            .last_sample
            .map(|last| (now - last).num_milliseconds().max(0) as f64 / 3_600_000.0)
            .unwrap_or(0.0);
        self.last_sample = Some(now);

        let delivered_wh = power_w * elapsed_h;
        self.energy_wh += delivered_wh;
        if transaction_id.is_some() {
            self.session_energy_wh += delivered_wh;
            if self.vehicle.battery_capacity_wh > 0.0 {
                self.soc = (self.soc + delivered_wh / self.vehicle.battery_capacity_wh * 100.0).min(100.0);
            }
        }

        let electrical = &snapshot.electrical;
        let current_a = units::to_amps(power_w, electrical.voltage, electrical.phases).unwrap_or(0.0);

        trace!(
            connector_id = self.connector_id,
            power_w,
            offered_w,
            energy_wh = self.energy_wh,
            soc = self.soc,
            "Meter sample"
        );

        MeterSample {
            connector_id: self.connector_id,
            transaction_id,
            power_w,
            current_a,
            offered_w,
            energy_wh: self.energy_wh,
            session_energy_wh: self.session_energy_wh,
            soc: transaction_id.map(|_| self.soc),
            timestamp: now,
        }
    }
}

/// Sample `handle` every `interval` and publish the result as
/// `MeterValuesSampled` until shutdown.
pub fn spawn_meter_sampler(
    station_id: String,
    handle: ConnectorHandle,
    mut sampler: MeterSampler,
    interval: Duration,
    clock: SharedClock,
    events: SharedEventBus,
    shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let connector_id = handle.connector_id();
        info!(connector_id, interval_ms = interval.as_millis() as u64, "📈 Meter sampler started");

        let mut ticker = tokio::time::interval(interval);
        let mut rng = StdRng::from_entropy();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = handle.snapshot();
                    let sample = sampler.sample(&snapshot, clock.now(), &mut rng);
                    events.publish(Event::MeterValuesSampled(MeterValuesEvent {
                        station_id: station_id.clone(),
                        connector_id,
                        transaction_id: sample.transaction_id,
                        energy_wh: sample.energy_wh,
                        session_energy_wh: sample.session_energy_wh,
                        power_w: sample.power_w,
                        current_a: sample.current_a,
                        offered_w: sample.offered_w,
                        soc: sample.soc,
                        timestamp: sample.timestamp,
                    }));
                }
                _ = shutdown.notified().wait() => {
                    break;
                }
            }
        }

        info!(connector_id, "📈 Meter sampler stopped");
    })
}
