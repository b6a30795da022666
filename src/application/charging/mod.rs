//! Smart charging: profile store, resolution, connector power state and the
//! per-connector workers that drive them.

pub mod composite;
pub mod power_state;
pub mod profile_store;
pub mod resolver;
pub mod station;
pub mod transaction;
pub mod worker;

pub use composite::{composite_schedule, CompositePeriod, CompositeSchedule};
pub use power_state::{ConnectorPowerState, ConnectorSnapshot, ProfileSummary, Recomputed};
pub use profile_store::{
    ClearCriteria, ClearOutcome, ProfileStore, SetContext, SetOutcome, SmartChargingRules,
    StoredProfile, TxProfilePolicy,
};
pub use resolver::{resolve, ResolvedLimit};
pub use station::{ProfileStatus, SetChargingProfileResult, SharedStation, Station};
pub use transaction::{StoppedTransaction, TransactionLifecycleTracker};
pub use worker::{spawn_connector, ConnectorCommand, ConnectorHandle, RecomputeMode, WorkerSettings};
