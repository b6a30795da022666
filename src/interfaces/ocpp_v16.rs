//! OCPP 1.6 smart-charging adapter
//!
//! Parses OCPP-J frames sent by the CSMS, routes the smart-charging actions to
//! the [`Station`](crate::application::Station) and serializes the
//! `rust_ocpp::v1_6` responses. Other actions are answered with a
//! `NotImplemented` CallError.

use chrono::{DateTime, Utc};
use rust_ocpp::v1_6::messages::clear_charging_profile::{
    ClearChargingProfileRequest, ClearChargingProfileResponse,
};
use rust_ocpp::v1_6::messages::get_composite_schedule::GetCompositeScheduleRequest;
use rust_ocpp::v1_6::messages::set_charging_profile::SetChargingProfileResponse;
use rust_ocpp::v1_6::types::{
    ChargingProfileStatus, ChargingRateUnitType, ClearChargingProfileStatus,
    GetCompositeScheduleStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::frame::OcppFrame;
use crate::application::charging::{ClearCriteria, CompositeSchedule, SharedStation, StoppedTransaction};
use crate::domain::{ChargingProfilePurpose, RateUnit};
use crate::shared::{
    ChargingResult, ChargingSchedulePayload, ChargingSchedulePeriodPayload,
    SetChargingProfilePayload,
};

#[derive(Debug, Error, PartialEq)]
pub enum AdapterError {
    #[error("Action not supported: {0}")]
    UnsupportedAction(String),

    #[error("Malformed payload: {0}")]
    FormationViolation(String),

    #[error("Property constraint violated: {0}")]
    PropertyConstraintViolation(String),

    #[error("Failed to serialize response: {0}")]
    Internal(String),
}

impl AdapterError {
    /// OCPP-J `errorCode` reported in the CallError.
    pub fn ocpp_error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedAction(_) => "NotImplemented",
            Self::FormationViolation(_) => "FormationViolation",
            Self::PropertyConstraintViolation(_) => "PropertyConstraintViolation",
            Self::Internal(_) => "InternalError",
        }
    }
}

/// `GetCompositeSchedule.conf` carrying `f64` limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCompositeScheduleReply {
    pub status: GetCompositeScheduleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charging_schedule: Option<ChargingSchedulePayload>,
}

impl GetCompositeScheduleReply {
    fn rejected() -> Self {
        Self {
            status: GetCompositeScheduleStatus::Rejected,
            connector_id: None,
            schedule_start: None,
            charging_schedule: None,
        }
    }
}

impl From<CompositeSchedule> for GetCompositeScheduleReply {
    fn from(schedule: CompositeSchedule) -> Self {
        let charging_rate_unit = match schedule.rate_unit {
            RateUnit::A => ChargingRateUnitType::A,
            RateUnit::W => ChargingRateUnitType::W,
        };
        let periods = schedule
            .periods
            .iter()
            .map(|p| ChargingSchedulePeriodPayload {
                start_period: p.start_period_secs as i32,
                limit: p.limit,
                number_phases: p.number_phases.map(i32::from),
            })
            .collect();

        Self {
            status: GetCompositeScheduleStatus::Accepted,
            connector_id: Some(schedule.connector_id as i32),
            schedule_start: Some(schedule.schedule_start),
            charging_schedule: Some(ChargingSchedulePayload {
                duration: Some(schedule.duration_secs as i32),
                start_schedule: Some(schedule.schedule_start),
                charging_rate_unit,
                charging_schedule_period: periods,
                min_charging_rate: None,
            }),
        }
    }
}

/// Smart-charging side of the charge point's OCPP 1.6 endpoint.
pub struct OcppV16Adapter {
    station: SharedStation,
}

impl OcppV16Adapter {
    pub fn new(station: SharedStation) -> Self {
        Self { station }
    }

    pub fn station(&self) -> &SharedStation {
        &self.station
    }

    /// Handle one raw OCPP-J message; returns the frame to send back, if any.
    pub async fn handle(&self, text: &str) -> Option<String> {
        let frame = match OcppFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(station_id = self.station.station_id(), error = %e, raw = text, "Failed to parse OCPP message");
                return None;
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                let response = match self.dispatch(&action, payload).await {
                    Ok(payload) => OcppFrame::CallResult {
                        unique_id,
                        payload,
                    },
                    Err(e) => {
                        warn!(action = action.as_str(), error = %e, "Call failed");
                        OcppFrame::error_response(unique_id, e.ocpp_error_code(), e.to_string())
                    }
                };
                Some(response.serialize())
            }
            OcppFrame::CallResult { unique_id, .. } => {
                debug!(message_id = unique_id.as_str(), "Ignoring CallResult");
                None
            }
            OcppFrame::CallError {
                unique_id,
                error_code,
                ..
            } => {
                warn!(message_id = unique_id.as_str(), error_code = error_code.as_str(), "Received CallError");
                None
            }
        }
    }

    /// Route a Call payload by action name.
    pub async fn dispatch(&self, action: &str, payload: Value) -> Result<Value, AdapterError> {
        info!(station_id = self.station.station_id(), action, "Received Call");
        match action {
            "SetChargingProfile" => to_value(&self.handle_set_charging_profile(payload).await?),
            "ClearChargingProfile" => to_value(&self.handle_clear_charging_profile(payload).await?),
            "GetCompositeSchedule" => to_value(&self.handle_get_composite_schedule(payload).await?),
            other => Err(AdapterError::UnsupportedAction(other.to_string())),
        }
    }

    pub async fn handle_set_charging_profile(
        &self,
        payload: Value,
    ) -> Result<SetChargingProfileResponse, AdapterError> {
        let req: SetChargingProfilePayload = parse(payload)?;
        let connector_id = connector_id(req.connector_id)?;

        let result = self
            .station
            .set_charging_profile(connector_id, req.cs_charging_profiles)
            .await;

        let status = if result.is_accepted() {
            ChargingProfileStatus::Accepted
        } else {
            if let Some(reason) = &result.reason {
                info!(connector_id, reason = reason.reason_code(), error = %reason, "SetChargingProfile rejected");
            }
            ChargingProfileStatus::Rejected
        };
        Ok(SetChargingProfileResponse { status })
    }

    pub async fn handle_clear_charging_profile(
        &self,
        payload: Value,
    ) -> Result<ClearChargingProfileResponse, AdapterError> {
        let req: ClearChargingProfileRequest = parse(payload)?;
        let connector_id = req.connector_id.map(connector_id).transpose()?;
        let stack_level = match req.stack_level {
            Some(level) if level < 0 => {
                return Err(AdapterError::PropertyConstraintViolation(format!(
                    "stackLevel must be non-negative, got {}",
                    level
                )))
            }
            level => level.map(|l| l as u32),
        };

        let criteria = ClearCriteria {
            id: req.id,
            connector_id,
            purpose: req.charging_profile_purpose.as_ref().map(ChargingProfilePurpose::from),
            stack_level,
        };
        let outcome = self.station.clear_charging_profile(criteria).await;

        let status = if outcome.cleared_count > 0 {
            ClearChargingProfileStatus::Accepted
        } else {
            ClearChargingProfileStatus::Unknown
        };
        Ok(ClearChargingProfileResponse { status })
    }

    pub async fn handle_get_composite_schedule(
        &self,
        payload: Value,
    ) -> Result<GetCompositeScheduleReply, AdapterError> {
        let req: GetCompositeScheduleRequest = parse(payload)?;
        let connector_id = connector_id(req.connector_id)?;
        let rate_unit = req.charging_rate_unit.as_ref().map(RateUnit::from);

        match self
            .station
            .composite_schedule(connector_id, i64::from(req.duration), rate_unit)
            .await
        {
            Ok(schedule) => Ok(schedule.into()),
            Err(e) => {
                info!(connector_id, error = %e, "GetCompositeSchedule rejected");
                Ok(GetCompositeScheduleReply::rejected())
            }
        }
    }

    /// Central system confirmed StartTransaction for `connector_id`.
    pub async fn on_transaction_started(
        &self,
        connector_id: u32,
        transaction_id: i32,
    ) -> ChargingResult<Vec<i32>> {
        self.station.start_transaction(connector_id, transaction_id).await
    }

    /// StopTransaction sent for `connector_id`.
    pub async fn on_transaction_stopped(
        &self,
        connector_id: u32,
    ) -> ChargingResult<Option<StoppedTransaction>> {
        self.station.stop_transaction(connector_id).await
    }
}

fn parse<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, AdapterError> {
    serde_json::from_value(payload).map_err(|e| AdapterError::FormationViolation(e.to_string()))
}

fn to_value<T: Serialize>(response: &T) -> Result<Value, AdapterError> {
    serde_json::to_value(response).map_err(|e| AdapterError::Internal(e.to_string()))
}

fn connector_id(raw: i32) -> Result<u32, AdapterError> {
    u32::try_from(raw).map_err(|_| {
        AdapterError::PropertyConstraintViolation(format!(
            "connectorId must be non-negative, got {}",
            raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::charging::{Station, WorkerSettings};
    use crate::domain::ElectricalConfig;
    use crate::notifications::create_event_bus;
    use crate::shared::{ManualClock, ShutdownSignal};
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    async fn adapter() -> OcppV16Adapter {
        let station = Station::shared(
            WorkerSettings::default(),
            ManualClock::shared(t0()),
            create_event_bus(),
            ShutdownSignal::new(),
        );
        station
            .add_connector(1, ElectricalConfig::new(230.0, 3, 32.0))
            .unwrap();
        OcppV16Adapter::new(station)
    }

    fn default_profile(id: i32, limit_a: f64) -> Value {
        json!({
            "chargingProfileId": id,
            "stackLevel": 0,
            "chargingProfilePurpose": "TxDefaultProfile",
            "chargingProfileKind": "Relative",
            "chargingSchedule": {
                "chargingRateUnit": "A",
                "chargingSchedulePeriod": [{ "startPeriod": 0, "limit": limit_a }]
            }
        })
    }

    #[tokio::test]
    async fn set_then_clear_over_frames() {
        let adapter = adapter().await;
        let call = json!([2, "m-1", "SetChargingProfile", {
            "connectorId": 1,
            "csChargingProfiles": default_profile(5, 16.0)
        }]);

        let reply = adapter.handle(&call.to_string()).await.unwrap();
        assert_eq!(reply, r#"[3,"m-1",{"status":"Accepted"}]"#);
        assert_eq!(adapter.station().effective_limit(1).unwrap().limit_w, 11_040.0);

        let clear = json!([2, "m-2", "ClearChargingProfile", { "id": 5 }]);
        let reply = adapter.handle(&clear.to_string()).await.unwrap();
        assert_eq!(reply, r#"[3,"m-2",{"status":"Accepted"}]"#);

        let reply = adapter.handle(&clear.to_string()).await.unwrap();
        assert_eq!(reply, r#"[3,"m-2",{"status":"Unknown"}]"#);
        adapter.station().shutdown().await;
    }

    #[tokio::test]
    async fn tx_profile_without_transaction_is_rejected() {
        let adapter = adapter().await;
        let mut profile = default_profile(9, 10.0);
        profile["chargingProfilePurpose"] = json!("TxProfile");

        let response = adapter
            .handle_set_charging_profile(json!({ "connectorId": 1, "csChargingProfiles": profile }))
            .await
            .unwrap();
        assert_eq!(response.status, ChargingProfileStatus::Rejected);
        adapter.station().shutdown().await;
    }

    #[tokio::test]
    async fn composite_schedule_reply_uses_requested_unit() {
        let adapter = adapter().await;
        adapter
            .handle_set_charging_profile(json!({ "connectorId": 1, "csChargingProfiles": default_profile(5, 16.0) }))
            .await
            .unwrap();

        let reply = adapter
            .handle_get_composite_schedule(json!({ "connectorId": 1, "duration": 600, "chargingRateUnit": "A" }))
            .await
            .unwrap();
        assert_eq!(reply.status, GetCompositeScheduleStatus::Accepted);
        assert_eq!(reply.connector_id, Some(1));
        let schedule = reply.charging_schedule.unwrap();
        assert_eq!(schedule.duration, Some(600));
        assert_eq!(schedule.charging_schedule_period.len(), 1);
        assert!((schedule.charging_schedule_period[0].limit - 16.0).abs() < 1e-9);

        let rejected = adapter
            .handle_get_composite_schedule(json!({ "connectorId": 7, "duration": 600 }))
            .await
            .unwrap();
        assert_eq!(rejected.status, GetCompositeScheduleStatus::Rejected);
        assert!(rejected.charging_schedule.is_none());
        adapter.station().shutdown().await;
    }

    #[tokio::test]
    async fn malformed_and_unknown_calls_produce_call_errors() {
        let adapter = adapter().await;

        let reply = adapter
            .handle(r#"[2,"m-3","SetChargingProfile",{"connectorId":"one"}]"#)
            .await
            .unwrap();
        assert!(reply.starts_with(r#"[4,"m-3","FormationViolation""#));

        let reply = adapter.handle(r#"[2,"m-4","Reset",{"type":"Soft"}]"#).await.unwrap();
        assert!(reply.starts_with(r#"[4,"m-4","NotImplemented""#));

        let err = adapter
            .dispatch("ClearChargingProfile", json!({ "connectorId": -1 }))
            .await
            .unwrap_err();
        assert_eq!(err.ocpp_error_code(), "PropertyConstraintViolation");

        assert!(adapter.handle(r#"[3,"m-5",{}]"#).await.is_none());
        assert!(adapter.handle("not json").await.is_none());
        adapter.station().shutdown().await;
    }

    #[tokio::test]
    async fn transaction_hooks_drive_the_connector() {
        let adapter = adapter().await;
        adapter.on_transaction_started(1, 42).await.unwrap();
        let snapshot = adapter.station().connector_state(1).unwrap();
        assert_eq!(snapshot.active_transaction.map(|tx| tx.transaction_id), Some(42));

        let stopped = adapter.on_transaction_stopped(1).await.unwrap().unwrap();
        assert_eq!(stopped.transaction_id, 42);
        adapter.station().shutdown().await;
    }
}
