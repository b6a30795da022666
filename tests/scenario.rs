//! End-to-end scenarios over the station, its connector workers and the
//! OCPP 1.6 adapter, driven by a manual clock.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use cp_simulator::application::charging::{ClearCriteria, Station, WorkerSettings};
use cp_simulator::domain::{ChargingProfilePurpose, ElectricalConfig, LimitSource, RateUnit};
use cp_simulator::notifications::{create_event_bus, Event};
use cp_simulator::shared::{
    ChargingError, ChargingProfilePayload, ChargingSchedulePayload,
    ChargingSchedulePeriodPayload, ManualClock, ShutdownSignal,
};
use cp_simulator::{OcppV16Adapter, SharedStation};
use rust_ocpp::v1_6::types::{
    ChargingProfileKindType, ChargingProfilePurposeType, ChargingRateUnitType,
};
use serde_json::json;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
}

fn station_22kw(clock: Arc<ManualClock>) -> SharedStation {
    let station = Station::shared(
        WorkerSettings::default(),
        clock,
        create_event_bus(),
        ShutdownSignal::new(),
    );
    station
        .add_connector(1, ElectricalConfig::new(230.0, 3, 32.0))
        .unwrap();
    station
}

fn amps_profile(
    id: i32,
    purpose: ChargingProfilePurposeType,
    stack_level: i32,
    periods: &[(i32, f64)],
    duration: Option<i32>,
) -> ChargingProfilePayload {
    ChargingProfilePayload {
        charging_profile_id: id,
        transaction_id: None,
        stack_level,
        charging_profile_purpose: purpose,
        charging_profile_kind: ChargingProfileKindType::Relative,
        recurrency_kind: None,
        valid_from: None,
        valid_to: None,
        charging_schedule: ChargingSchedulePayload {
            duration,
            start_schedule: None,
            charging_rate_unit: ChargingRateUnitType::A,
            charging_schedule_period: periods
                .iter()
                .map(|&(start_period, limit)| ChargingSchedulePeriodPayload {
                    start_period,
                    limit,
                    number_phases: None,
                })
                .collect(),
            min_charging_rate: None,
        },
    }
}

#[tokio::test]
async fn twenty_two_kw_connector_follows_default_and_tx_profiles() {
    let station = Station::shared(
        WorkerSettings::default(),
        ManualClock::shared(t0()),
        create_event_bus(),
        ShutdownSignal::new(),
    );
    station
        .add_connector(1, ElectricalConfig::new(230.0, 3, 32.0).with_max_power(22_000.0))
        .unwrap();

    let limit = station.effective_limit(1).unwrap();
    assert_eq!(limit.limit_w, 22_000.0);
    assert_eq!(limit.source, LimitSource::Physical);

    let result = station
        .set_charging_profile(
            1,
            amps_profile(1, ChargingProfilePurposeType::TxDefaultProfile, 0, &[(0, 16.0)], None),
        )
        .await;
    assert!(result.is_accepted());
    let limit = station.effective_limit(1).unwrap();
    assert_eq!(limit.limit_w, 11_040.0);
    assert_eq!(limit.source, LimitSource::TxDefaultProfile);

    station.start_transaction(1, 100).await.unwrap();
    let result = station
        .set_charging_profile(
            1,
            amps_profile(2, ChargingProfilePurposeType::TxProfile, 0, &[(0, 32.0)], None),
        )
        .await;
    assert!(result.is_accepted());

    // 32 A is 22 080 W: the 22 kW hardware cap is what binds
    let limit = station.effective_limit(1).unwrap();
    assert_eq!(limit.limit_w, 22_000.0);
    assert_eq!(limit.source, LimitSource::Physical);

    let stopped = station.stop_transaction(1).await.unwrap().unwrap();
    assert_eq!(stopped.transaction_id, 100);
    assert_eq!(stopped.purged_profiles, vec![2]);

    let limit = station.effective_limit(1).unwrap();
    assert_eq!(limit.limit_w, 11_040.0);
    assert_eq!(limit.source, LimitSource::TxDefaultProfile);

    station.shutdown().await;
}

#[tokio::test]
async fn tx_profile_overrides_lower_tx_default() {
    let clock = ManualClock::shared(t0());
    let station = station_22kw(clock);

    station
        .set_charging_profile(
            1,
            amps_profile(1, ChargingProfilePurposeType::TxDefaultProfile, 5, &[(0, 6.0)], None),
        )
        .await;
    station.start_transaction(1, 7).await.unwrap();
    station
        .set_charging_profile(
            1,
            amps_profile(2, ChargingProfilePurposeType::TxProfile, 0, &[(0, 20.0)], None),
        )
        .await;

    let limit = station.effective_limit(1).unwrap();
    assert_eq!(limit.limit_w, 13_800.0);
    assert_eq!(limit.source, LimitSource::TxProfile);
    station.shutdown().await;
}

#[tokio::test]
async fn tx_profile_takes_precedence_over_charge_point_max() {
    let clock = ManualClock::shared(t0());
    let station = station_22kw(clock);
    station.start_transaction(1, 7).await.unwrap();

    station
        .set_charging_profile(
            1,
            amps_profile(1, ChargingProfilePurposeType::TxProfile, 0, &[(0, 25.0)], None),
        )
        .await;
    station
        .set_charging_profile(
            0,
            amps_profile(9, ChargingProfilePurposeType::ChargePointMaxProfile, 0, &[(0, 10.0)], None),
        )
        .await;

    // the first purpose with an active period decides: 25 A x 230 V x 3
    let limit = station.effective_limit(1).unwrap();
    assert_eq!(limit.limit_w, 17_250.0);
    assert_eq!(limit.source, LimitSource::TxProfile);

    // once the transaction ends the station-wide ChargePointMaxProfile applies
    station.stop_transaction(1).await.unwrap();
    let limit = station.effective_limit(1).unwrap();
    assert_eq!(limit.limit_w, 6_900.0);
    assert_eq!(limit.source, LimitSource::ChargePointMaxProfile);
    station.shutdown().await;
}

#[tokio::test]
async fn stop_transaction_leaves_no_tx_profile_behind() {
    let clock = ManualClock::shared(t0());
    let station = station_22kw(clock);
    station.start_transaction(1, 7).await.unwrap();
    for (id, level) in [(1, 0), (2, 1), (3, 2)] {
        let result = station
            .set_charging_profile(
                1,
                amps_profile(id, ChargingProfilePurposeType::TxProfile, level, &[(0, 10.0)], None),
            )
            .await;
        assert!(result.is_accepted());
    }
    station
        .set_charging_profile(
            1,
            amps_profile(4, ChargingProfilePurposeType::TxDefaultProfile, 0, &[(0, 16.0)], None),
        )
        .await;

    station.stop_transaction(1).await.unwrap();

    let snapshot = station.connector_state(1).unwrap();
    assert!(snapshot
        .profiles
        .iter()
        .all(|p| p.purpose != ChargingProfilePurpose::TxProfile));
    assert_eq!(snapshot.profiles.len(), 1);
    station.shutdown().await;
}

#[tokio::test]
async fn clearing_twice_is_idempotent() {
    let clock = ManualClock::shared(t0());
    let station = station_22kw(clock);
    station
        .set_charging_profile(
            1,
            amps_profile(1, ChargingProfilePurposeType::TxDefaultProfile, 0, &[(0, 16.0)], None),
        )
        .await;

    let criteria = ClearCriteria {
        connector_id: Some(1),
        ..ClearCriteria::default()
    };
    let first = station.clear_charging_profile(criteria).await;
    assert_eq!(first.cleared_count, 1);
    let second = station.clear_charging_profile(criteria).await;
    assert_eq!(second.cleared_count, 0);
    assert!(second.cleared_ids.is_empty());

    assert_eq!(station.effective_limit(1).unwrap().source, LimitSource::Physical);
    station.shutdown().await;
}

#[tokio::test]
async fn schedule_periods_advance_with_the_clock() {
    let clock = ManualClock::shared(t0());
    let station = station_22kw(clock.clone());
    station
        .set_charging_profile(
            1,
            amps_profile(
                1,
                ChargingProfilePurposeType::TxDefaultProfile,
                0,
                &[(0, 10.0), (60, 20.0)],
                Some(120),
            ),
        )
        .await;
    let mut events = station.subscribe_connector(1);

    clock.advance(Duration::seconds(30));
    station.tick().await;
    assert_eq!(station.effective_limit(1).unwrap().limit_w, 6_900.0);

    clock.advance(Duration::seconds(60));
    station.tick().await;
    assert_eq!(station.effective_limit(1).unwrap().limit_w, 13_800.0);

    clock.advance(Duration::seconds(60));
    station.tick().await;
    let limit = station.effective_limit(1).unwrap();
    assert_eq!(limit.limit_w, 22_080.0);
    assert_eq!(limit.source, LimitSource::Physical);
    assert!(station.connector_state(1).unwrap().profiles.is_empty());

    let mut saw_expiry = false;
    while let Some(msg) = events.try_recv() {
        if let Event::ProfilesCleared(e) = &msg.event {
            if e.cause == "expired" && e.profile_ids == vec![1] {
                saw_expiry = true;
            }
        }
    }
    assert!(saw_expiry);
    station.shutdown().await;
}

#[tokio::test]
async fn composite_schedule_reflects_upcoming_transitions() {
    let clock = ManualClock::shared(t0());
    let station = station_22kw(clock);
    station
        .set_charging_profile(
            1,
            amps_profile(
                1,
                ChargingProfilePurposeType::TxDefaultProfile,
                0,
                &[(0, 10.0), (60, 20.0)],
                Some(120),
            ),
        )
        .await;

    let schedule = station
        .composite_schedule(1, 300, Some(RateUnit::A))
        .await
        .unwrap();
    assert_eq!(schedule.schedule_start, t0());
    let offsets: Vec<i64> = schedule.periods.iter().map(|p| p.start_period_secs).collect();
    assert_eq!(offsets, vec![0, 60, 120]);
    assert!((schedule.periods[0].limit - 10.0).abs() < 1e-9);
    assert!((schedule.periods[1].limit - 20.0).abs() < 1e-9);
    assert!((schedule.periods[2].limit - 32.0).abs() < 1e-9);
    assert_eq!(schedule.periods[2].source, LimitSource::Physical);

    assert!(matches!(
        station.composite_schedule(1, 0, None).await,
        Err(ChargingError::InvalidProfile(_))
    ));
    station.shutdown().await;
}

#[tokio::test]
async fn rejected_profile_keeps_previous_limit() {
    let clock = ManualClock::shared(t0());
    let station = station_22kw(clock);
    station
        .set_charging_profile(
            1,
            amps_profile(1, ChargingProfilePurposeType::TxDefaultProfile, 0, &[(0, 16.0)], None),
        )
        .await;

    let bad = amps_profile(
        2,
        ChargingProfilePurposeType::TxDefaultProfile,
        1,
        &[(0, 8.0), (0, 4.0)],
        None,
    );
    let result = station.set_charging_profile(1, bad).await;
    assert!(!result.is_accepted());
    assert!(matches!(result.reason, Some(ChargingError::InvalidProfile(_))));

    let tx = amps_profile(3, ChargingProfilePurposeType::TxProfile, 0, &[(0, 8.0)], None);
    let result = station.set_charging_profile(1, tx).await;
    assert_eq!(result.reason, Some(ChargingError::NoActiveTransaction(1)));

    assert_eq!(station.effective_limit(1).unwrap().limit_w, 11_040.0);
    station.shutdown().await;
}

#[tokio::test]
async fn ocpp_session_round_trip() {
    let clock = ManualClock::shared(t0());
    let adapter = OcppV16Adapter::new(station_22kw(clock));

    let set = json!([2, "1", "SetChargingProfile", {
        "connectorId": 1,
        "csChargingProfiles": {
            "chargingProfileId": 10,
            "stackLevel": 0,
            "chargingProfilePurpose": "TxDefaultProfile",
            "chargingProfileKind": "Absolute",
            "chargingSchedule": {
                "startSchedule": "2026-04-01T09:00:00Z",
                "chargingRateUnit": "W",
                "chargingSchedulePeriod": [{ "startPeriod": 0, "limit": 7400.0 }]
            }
        }
    }]);
    let reply = adapter.handle(&set.to_string()).await.unwrap();
    assert_eq!(reply, r#"[3,"1",{"status":"Accepted"}]"#);

    let get = json!([2, "2", "GetCompositeSchedule", { "connectorId": 1, "duration": 3600 }]);
    let reply: serde_json::Value =
        serde_json::from_str(&adapter.handle(&get.to_string()).await.unwrap()).unwrap();
    assert_eq!(reply[2]["status"], "Accepted");
    assert_eq!(reply[2]["chargingSchedule"]["chargingRateUnit"], "W");
    assert_eq!(
        reply[2]["chargingSchedule"]["chargingSchedulePeriod"][0]["limit"],
        7400.0
    );

    let clear = json!([2, "3", "ClearChargingProfile", { "chargingProfilePurpose": "TxDefaultProfile" }]);
    let reply = adapter.handle(&clear.to_string()).await.unwrap();
    assert_eq!(reply, r#"[3,"3",{"status":"Accepted"}]"#);

    adapter.station().shutdown().await;
}
