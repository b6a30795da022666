//! Schedule evaluation: which period of a profile applies at a given instant.
//!
//! Elapsed time is measured in milliseconds. A schedule with `duration` is
//! still active at exactly `T0 + duration` and expired one millisecond later;
//! the same inclusive rule applies to `validTo`.

use chrono::{DateTime, Duration, Utc};

use super::model::{ChargingProfile, ProfileKind};

const EPSILON: Duration = Duration::milliseconds(1);

/// Schedule start (`T0`) of `profile` as seen at `now`.
///
/// `relative_anchor` is the instant a Relative profile became active; it is
/// ignored for the other kinds. Returns `None` for a Relative profile that
/// has not been activated yet.
pub fn schedule_anchor(
    profile: &ChargingProfile,
    now: DateTime<Utc>,
    relative_anchor: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match profile.kind {
        ProfileKind::Absolute { start } => Some(start),
        ProfileKind::Relative => relative_anchor,
        ProfileKind::Recurring { recurrency, anchor } => {
            let cycle_ms = recurrency.cycle().num_milliseconds();
            let since_ms = (now - anchor).num_milliseconds();
            let cycles = since_ms.div_euclid(cycle_ms);
            Some(anchor + Duration::milliseconds(cycles * cycle_ms))
        }
    }
}

/// Limit in Watts that `profile` imposes at `now`, if any.
pub fn active_limit(
    profile: &ChargingProfile,
    now: DateTime<Utc>,
    relative_anchor: Option<DateTime<Utc>>,
) -> Option<f64> {
    if !profile.is_valid_at(now) {
        return None;
    }

    let t0 = schedule_anchor(profile, now, relative_anchor)?;
    let elapsed_ms = (now - t0).num_milliseconds();
    if elapsed_ms < 0 {
        return None;
    }
    if let Some(duration) = profile.schedule.duration_secs {
        if elapsed_ms > duration * 1000 {
            return None;
        }
    }

    profile
        .schedule
        .periods
        .iter()
        .rev()
        .find(|period| period.start_offset_secs * 1000 <= elapsed_ms)
        .map(|period| period.limit_w)
}

/// Earliest instant strictly after `now` at which the value returned by
/// [`active_limit`] may change.
pub fn next_transition(
    profile: &ChargingProfile,
    now: DateTime<Utc>,
    relative_anchor: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let mut candidates: Vec<DateTime<Utc>> = Vec::new();

    if let Some(from) = profile.valid_from {
        candidates.push(from);
    }
    if let Some(to) = profile.valid_to {
        candidates.push(to + EPSILON);
    }

    if let Some(t0) = schedule_anchor(profile, now, relative_anchor) {
        push_cycle_boundaries(profile, t0, &mut candidates);
        if let ProfileKind::Recurring { recurrency, .. } = profile.kind {
            let next_cycle = t0 + recurrency.cycle();
            candidates.push(next_cycle);
            push_cycle_boundaries(profile, next_cycle, &mut candidates);
        }
    }

    candidates.into_iter().filter(|at| *at > now).min()
}

fn push_cycle_boundaries(
    profile: &ChargingProfile,
    t0: DateTime<Utc>,
    candidates: &mut Vec<DateTime<Utc>>,
) {
    candidates.extend(
        profile
            .schedule
            .periods
            .iter()
            .map(|period| t0 + Duration::seconds(period.start_offset_secs)),
    );
    if let Some(duration) = profile.schedule.duration_secs {
        candidates.push(t0 + Duration::seconds(duration) + EPSILON);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::charging_profile::model::{
        ChargingProfilePurpose, ChargingSchedule, RateUnit, RecurrencyKind, SchedulePeriod,
    };
    use crate::domain::units::to_watts;
    use chrono::TimeZone;

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, h, m, s).unwrap()
    }

    fn amps(a: f64) -> f64 {
        to_watts(a, 230.0, 3).unwrap()
    }

    fn profile(kind: ProfileKind, periods: &[(i64, f64)], duration: Option<i64>) -> ChargingProfile {
        ChargingProfile {
            id: 1,
            stack_level: 0,
            purpose: ChargingProfilePurpose::TxProfile,
            kind,
            valid_from: None,
            valid_to: None,
            transaction_id: None,
            schedule: ChargingSchedule {
                duration_secs: duration,
                rate_unit: RateUnit::A,
                min_charging_rate: None,
                periods: periods
                    .iter()
                    .map(|(offset, a)| SchedulePeriod {
                        start_offset_secs: *offset,
                        limit_w: amps(*a),
                        requested_limit: *a,
                        number_phases: None,
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn period_selection_and_expiry() {
        let start = t(10, 0, 0);
        let p = profile(
            ProfileKind::Absolute { start },
            &[(0, 10.0), (60, 20.0)],
            Some(120),
        );

        assert_eq!(active_limit(&p, start + Duration::seconds(30), None), Some(amps(10.0)));
        assert_eq!(active_limit(&p, start + Duration::seconds(90), None), Some(amps(20.0)));
        assert_eq!(active_limit(&p, start + Duration::seconds(120), None), Some(amps(20.0)));
        assert_eq!(active_limit(&p, start + Duration::seconds(150), None), None);
    }

    #[test]
    fn not_started_yet() {
        let start = t(10, 0, 0);
        let p = profile(ProfileKind::Absolute { start }, &[(0, 10.0)], None);
        assert_eq!(active_limit(&p, start - Duration::seconds(1), None), None);
        assert_eq!(active_limit(&p, start, None), Some(amps(10.0)));
    }

    #[test]
    fn first_period_with_offset() {
        let start = t(10, 0, 0);
        let p = profile(ProfileKind::Absolute { start }, &[(300, 16.0)], None);
        assert_eq!(active_limit(&p, start + Duration::seconds(299), None), None);
        assert_eq!(active_limit(&p, start + Duration::seconds(300), None), Some(amps(16.0)));
    }

    #[test]
    fn empty_periods_yield_nothing() {
        let p = profile(ProfileKind::Absolute { start: t(0, 0, 0) }, &[], None);
        assert_eq!(active_limit(&p, t(1, 0, 0), None), None);
        assert_eq!(next_transition(&p, t(1, 0, 0), None), None);
    }

    #[test]
    fn identical_offsets_last_wins() {
        let p = profile(
            ProfileKind::Absolute { start: t(0, 0, 0) },
            &[(0, 10.0), (0, 12.0)],
            None,
        );
        assert_eq!(active_limit(&p, t(0, 0, 5), None), Some(amps(12.0)));
    }

    #[test]
    fn relative_needs_anchor() {
        let p = profile(ProfileKind::Relative, &[(0, 10.0), (60, 6.0)], None);
        assert_eq!(active_limit(&p, t(12, 0, 0), None), None);
        let anchor = Some(t(12, 0, 0));
        assert_eq!(active_limit(&p, t(12, 0, 59), anchor), Some(amps(10.0)));
        assert_eq!(active_limit(&p, t(12, 1, 0), anchor), Some(amps(6.0)));
    }

    #[test]
    fn validity_window_bounds_evaluation() {
        let mut p = profile(ProfileKind::Absolute { start: t(0, 0, 0) }, &[(0, 10.0)], None);
        p.valid_from = Some(t(8, 0, 0));
        p.valid_to = Some(t(9, 0, 0));
        assert_eq!(active_limit(&p, t(7, 59, 59), None), None);
        assert_eq!(active_limit(&p, t(8, 30, 0), None), Some(amps(10.0)));
        assert_eq!(active_limit(&p, t(9, 0, 1), None), None);
    }

    #[test]
    fn daily_recurrence_uses_most_recent_occurrence() {
        // every day from 18:00 for two hours: 10 A, then 6 A after one hour
        let anchor = Utc.with_ymd_and_hms(2026, 1, 1, 18, 0, 0).unwrap();
        let p = profile(
            ProfileKind::Recurring {
                recurrency: RecurrencyKind::Daily,
                anchor,
            },
            &[(0, 10.0), (3600, 6.0)],
            Some(7200),
        );

        assert_eq!(active_limit(&p, t(18, 30, 0), None), Some(amps(10.0)));
        assert_eq!(active_limit(&p, t(19, 30, 0), None), Some(amps(6.0)));
        // between cycles
        assert_eq!(active_limit(&p, t(21, 0, 0), None), None);
        assert_eq!(active_limit(&p, t(9, 0, 0), None), None);
        assert_eq!(schedule_anchor(&p, t(9, 0, 0), None), Some(Utc.with_ymd_and_hms(2026, 5, 3, 18, 0, 0).unwrap()));
    }

    #[test]
    fn recurrence_before_anchor_date_still_cycles() {
        let anchor = Utc.with_ymd_and_hms(2026, 6, 1, 6, 0, 0).unwrap();
        let p = profile(
            ProfileKind::Recurring {
                recurrency: RecurrencyKind::Daily,
                anchor,
            },
            &[(0, 8.0)],
            Some(3600),
        );
        assert_eq!(active_limit(&p, t(6, 15, 0), None), Some(amps(8.0)));
    }

    #[test]
    fn weekly_recurrence() {
        // Monday 2026-05-04 08:00
        let anchor = t(8, 0, 0);
        let p = profile(
            ProfileKind::Recurring {
                recurrency: RecurrencyKind::Weekly,
                anchor,
            },
            &[(0, 16.0)],
            Some(3600),
        );
        let next_monday = anchor + Duration::weeks(1) + Duration::minutes(10);
        let tuesday = anchor + Duration::days(1) + Duration::minutes(10);
        assert_eq!(active_limit(&p, next_monday, None), Some(amps(16.0)));
        assert_eq!(active_limit(&p, tuesday, None), None);
    }

    #[test]
    fn next_transition_walks_period_boundaries() {
        let start = t(10, 0, 0);
        let p = profile(
            ProfileKind::Absolute { start },
            &[(0, 10.0), (60, 20.0)],
            Some(120),
        );

        assert_eq!(next_transition(&p, start - Duration::seconds(5), None), Some(start));
        assert_eq!(next_transition(&p, start, None), Some(start + Duration::seconds(60)));
        assert_eq!(
            next_transition(&p, start + Duration::seconds(60), None),
            Some(start + Duration::seconds(120) + EPSILON)
        );
        assert_eq!(next_transition(&p, start + Duration::seconds(121), None), None);
    }

    #[test]
    fn next_transition_of_recurring_profile_reaches_next_cycle() {
        let anchor = Utc.with_ymd_and_hms(2026, 1, 1, 18, 0, 0).unwrap();
        let p = profile(
            ProfileKind::Recurring {
                recurrency: RecurrencyKind::Daily,
                anchor,
            },
            &[(0, 10.0)],
            Some(3600),
        );
        assert_eq!(next_transition(&p, t(20, 0, 0), None), Some(t(18, 0, 0) + Duration::days(1)));
    }

    #[test]
    fn next_transition_includes_validity_edges() {
        let mut p = profile(ProfileKind::Absolute { start: t(0, 0, 0) }, &[(0, 10.0)], None);
        p.valid_from = Some(t(8, 0, 0));
        p.valid_to = Some(t(9, 0, 0));
        assert_eq!(next_transition(&p, t(7, 0, 0), None), Some(t(8, 0, 0)));
        assert_eq!(next_transition(&p, t(8, 0, 0), None), Some(t(9, 0, 0) + EPSILON));
    }
}
