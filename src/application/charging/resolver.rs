//! Effective profile resolution.
//!
//! Purposes are walked in precedence order; the first purpose with at least
//! one profile in an active period decides. Within a purpose the highest
//! stack level wins and equal stack levels go to the most recent insertion.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::profile_store::{ProfileStore, StoredProfile};
use crate::domain::{ActiveTransaction, ChargingProfilePurpose};

/// The profile limit that currently constrains a connector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedLimit {
    pub limit_w: f64,
    pub purpose: ChargingProfilePurpose,
    pub profile_id: i32,
    pub stack_level: u32,
}

/// `None` means no profile constrains the connector at `now`.
pub fn resolve(
    store: &ProfileStore,
    active: Option<&ActiveTransaction>,
    now: DateTime<Utc>,
) -> Option<ResolvedLimit> {
    ChargingProfilePurpose::PRECEDENCE
        .iter()
        .find_map(|purpose| resolve_purpose(store, *purpose, active, now))
}

fn resolve_purpose(
    store: &ProfileStore,
    purpose: ChargingProfilePurpose,
    active: Option<&ActiveTransaction>,
    now: DateTime<Utc>,
) -> Option<ResolvedLimit> {
    store
        .iter()
        .filter(|s| s.purpose() == purpose && s.is_eligible(active))
        .filter_map(|s| s.active_limit(now).map(|limit_w| (s, limit_w)))
        .max_by_key(|(s, _)| (s.stack_level(), s.sequence()))
        .map(|(s, limit_w): (&StoredProfile, f64)| ResolvedLimit {
            limit_w,
            purpose,
            profile_id: s.id(),
            stack_level: s.stack_level(),
        })
}
