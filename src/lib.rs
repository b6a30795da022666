//! # OCPP Charge Point Simulator
//!
//! Simulated OCPP 1.6 charge point with a smart-charging engine: charging
//! profiles received from the CSMS are stored per connector, stacked by
//! purpose and level, and turned into the effective power limit each
//! connector may draw.
//!
//! ## Architecture
//!
//! - **domain**: Charging profiles, schedule evaluation, connector electrics
//! - **application**: Profile store, resolver, connector workers, station, meter sampling
//! - **interfaces**: OCPP-J framing and the OCPP 1.6 smart-charging actions
//! - **notifications**: Event bus for limit, profile and transaction changes
//! - **runtime**: Simulator bootstrap, tracing and metrics
//! - **config**: TOML configuration

pub mod application;
pub mod config;
pub mod domain;
pub mod interfaces;
pub mod notifications;
pub mod runtime;
pub mod shared;

pub use config::{default_config_path, AppConfig};

pub use application::{ConnectorHandle, SharedStation, Station};
pub use interfaces::OcppV16Adapter;
pub use runtime::{init_tracing, SimulatorHandle, SimulatorOptions};

pub use notifications::{create_event_bus, Event, EventBus, EventFilter, SharedEventBus};
