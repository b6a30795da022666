//! Validation and normalization of incoming charging profiles.
//!
//! A payload is checked in full before anything is converted, so a rejected
//! profile never leaves partial state behind.

use rust_ocpp::v1_6::types::ChargingProfileKindType;

use super::model::{
    ChargingProfile, ChargingProfilePurpose, ChargingSchedule, ProfileKind, RateUnit,
    RecurrencyKind, SchedulePeriod,
};
use crate::domain::connector::ElectricalConfig;
use crate::domain::units;
use crate::shared::{ChargingError, ChargingProfilePayload, ChargingResult};

fn invalid(reason: impl Into<String>) -> ChargingError {
    ChargingError::InvalidProfile(reason.into())
}

/// Structural checks that do not depend on the connector configuration.
pub fn validate_payload(payload: &ChargingProfilePayload) -> ChargingResult<()> {
    if payload.stack_level < 0 {
        return Err(invalid(format!(
            "stackLevel must be >= 0, got {}",
            payload.stack_level
        )));
    }

    let schedule = &payload.charging_schedule;

    match payload.charging_profile_kind {
        ChargingProfileKindType::Absolute if schedule.start_schedule.is_none() => {
            return Err(invalid("Absolute profile requires startSchedule"));
        }
        ChargingProfileKindType::Recurring if payload.recurrency_kind.is_none() => {
            return Err(invalid("Recurring profile requires recurrencyKind"));
        }
        _ => {}
    }

    if let (Some(from), Some(to)) = (payload.valid_from, payload.valid_to) {
        if from > to {
            return Err(invalid("validFrom is after validTo"));
        }
    }

    if let Some(duration) = schedule.duration {
        if duration < 0 {
            return Err(invalid(format!("duration must be >= 0, got {}", duration)));
        }
    }

    let mut previous: Option<i32> = None;
    for period in &schedule.charging_schedule_period {
        if period.start_period < 0 {
            return Err(invalid(format!(
                "startPeriod must be >= 0, got {}",
                period.start_period
            )));
        }
        if let Some(prev) = previous {
            if period.start_period <= prev {
                return Err(invalid(format!(
                    "startPeriod offsets must be strictly increasing ({} after {})",
                    period.start_period, prev
                )));
            }
        }
        previous = Some(period.start_period);

        if !(period.limit >= 0.0) || !period.limit.is_finite() {
            return Err(invalid(format!("limit must be >= 0, got {}", period.limit)));
        }
        if let Some(phases) = period.number_phases {
            if !(1..=3).contains(&phases) {
                return Err(invalid(format!(
                    "numberPhases must be 1, 2 or 3, got {}",
                    phases
                )));
            }
        }
    }

    Ok(())
}

impl ChargingProfile {
    /// Validate `payload` and normalize its limits to Watts using the
    /// connector configuration in force right now.
    pub fn from_payload(
        payload: &ChargingProfilePayload,
        electrical: &ElectricalConfig,
    ) -> ChargingResult<Self> {
        validate_payload(payload)?;

        let schedule = &payload.charging_schedule;
        let kind = match payload.charging_profile_kind {
            ChargingProfileKindType::Absolute => ProfileKind::Absolute {
                start: schedule
                    .start_schedule
                    .ok_or_else(|| invalid("Absolute profile requires startSchedule"))?,
            },
            ChargingProfileKindType::Relative => ProfileKind::Relative,
            ChargingProfileKindType::Recurring => {
                let recurrency = payload
                    .recurrency_kind
                    .as_ref()
                    .map(RecurrencyKind::from)
                    .ok_or_else(|| invalid("Recurring profile requires recurrencyKind"))?;
                ProfileKind::Recurring {
                    recurrency,
                    anchor: schedule
                        .start_schedule
                        .unwrap_or_else(|| recurrency.default_anchor()),
                }
            }
        };

        let rate_unit = RateUnit::from(&schedule.charging_rate_unit);
        let periods = schedule
            .charging_schedule_period
            .iter()
            .map(|period| {
                // validated to 1..=3 above
                let number_phases = period.number_phases.map(|p| p as u8);
                let limit_w = match rate_unit {
                    RateUnit::W => period.limit,
                    RateUnit::A => units::to_watts(
                        period.limit,
                        electrical.voltage,
                        number_phases.unwrap_or(electrical.phases),
                    )?,
                };
                Ok(SchedulePeriod {
                    start_offset_secs: i64::from(period.start_period),
                    limit_w,
                    requested_limit: period.limit,
                    number_phases,
                })
            })
            .collect::<ChargingResult<Vec<_>>>()?;

        Ok(Self {
            id: payload.charging_profile_id,
            stack_level: payload.stack_level as u32,
            purpose: ChargingProfilePurpose::from(&payload.charging_profile_purpose),
            kind,
            valid_from: payload.valid_from,
            valid_to: payload.valid_to,
            transaction_id: payload.transaction_id,
            schedule: ChargingSchedule {
                duration_secs: schedule.duration.map(i64::from),
                rate_unit,
                min_charging_rate: schedule.min_charging_rate,
                periods,
            },
        })
    }
}
