//! Composite schedule: the effective limit of a connector projected over a
//! window, sampled at every instant where it may change.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::power_state::ConnectorPowerState;
use crate::domain::{units, LimitSource, RateUnit};
use crate::shared::{ChargingError, ChargingResult};

/// Upper bound on sampled transitions within one window.
const MAX_SAMPLES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositePeriod {
    /// Seconds from `schedule_start`
    pub start_period_secs: i64,
    /// In the schedule's rate unit
    pub limit: f64,
    pub source: LimitSource,
    pub number_phases: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeSchedule {
    pub connector_id: u32,
    pub schedule_start: DateTime<Utc>,
    pub duration_secs: i64,
    pub rate_unit: RateUnit,
    pub periods: Vec<CompositePeriod>,
}

/// Project `state` over `[now, now + duration_secs)` in `rate_unit` (W when
/// not given).
pub fn composite_schedule(
    state: &ConnectorPowerState,
    now: DateTime<Utc>,
    duration_secs: i64,
    rate_unit: Option<RateUnit>,
) -> ChargingResult<CompositeSchedule> {
    if duration_secs <= 0 {
        return Err(ChargingError::InvalidProfile(format!(
            "composite schedule duration must be positive, got {}",
            duration_secs
        )));
    }

    let rate_unit = rate_unit.unwrap_or(RateUnit::W);
    let electrical = state.electrical();
    let end = now + Duration::seconds(duration_secs);

    let mut periods: Vec<CompositePeriod> = Vec::new();
    let mut at = now;
    for _ in 0..MAX_SAMPLES {
        let effective = state.limit_at(at);
        let limit = match rate_unit {
            RateUnit::W => effective.limit_w,
            RateUnit::A => units::to_amps(effective.limit_w, electrical.voltage, electrical.phases)?,
        };
        let period = CompositePeriod {
            start_period_secs: (at - now).num_seconds(),
            limit,
            source: effective.source,
            number_phases: Some(electrical.phases),
        };

        let (same_offset, same_value) = periods.last().map_or((false, false), |last| {
            (
                last.start_period_secs == period.start_period_secs,
                last.limit == period.limit && last.source == period.source,
            )
        });
        if same_offset {
            // sub-second transitions collapse onto the same offset
            periods.pop();
            periods.push(period);
        } else if !same_value {
            periods.push(period);
        }

        match state.next_transition(at) {
            Some(next) if next < end => at = next,
            _ => break,
        }
    }

    dedup_adjacent(&mut periods);

    Ok(CompositeSchedule {
        connector_id: state.connector_id(),
        schedule_start: now,
        duration_secs,
        rate_unit,
        periods,
    })
}

/// Overwriting a collapsed period can leave two equal neighbours behind.
fn dedup_adjacent(periods: &mut Vec<CompositePeriod>) {
    periods.dedup_by(|later, earlier| later.limit == earlier.limit && later.source == earlier.source);
}
