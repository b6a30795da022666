//! Application configuration (TOML)
//!
//! Default location: `~/.config/ocpp-cp-simulator/config.toml`, overridable
//! with the `CP_SIM_CONFIG` environment variable.
//!
//! ```toml
//! [station]
//! id = "SIM-CP-001"
//!
//! [[station.connectors]]
//! id = 1
//! voltage = 230.0
//! phases = 3
//! max_current_a = 32.0
//!
//! [smart_charging]
//! tx_profile_without_transaction = "reject"
//! max_stack_level = 10
//! recompute = "next_transition"
//!
//! [telemetry]
//! sample_interval_ms = 10000
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//!
//! [metrics]
//! enabled = false
//! listen = "127.0.0.1:9464"
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::charging::{RecomputeMode, SmartChargingRules, WorkerSettings};
use crate::application::telemetry::VehicleProfile;
use crate::domain::ElectricalConfig;
use crate::shared::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CP_SIM_CONFIG";

const APP_DIR: &str = "ocpp-cp-simulator";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub station: StationConfig,
    pub smart_charging: SmartChargingConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Charge point identity presented to the CSMS
    pub id: String,
    pub connectors: Vec<ConnectorConfig>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            id: "SIM-CP-001".to_string(),
            connectors: vec![ConnectorConfig::default()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub id: u32,
    #[serde(default = "default_voltage")]
    pub voltage: f64,
    #[serde(default = "default_phases")]
    pub phases: u8,
    pub max_current_a: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_power_w: Option<f64>,
}

fn default_voltage() -> f64 {
    230.0
}

fn default_phases() -> u8 {
    3
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            id: 1,
            voltage: default_voltage(),
            phases: default_phases(),
            max_current_a: 32.0,
            max_power_w: None,
        }
    }
}

impl ConnectorConfig {
    pub fn electrical(&self) -> ElectricalConfig {
        ElectricalConfig {
            voltage: self.voltage,
            phases: self.phases,
            max_current_a: self.max_current_a,
            max_power_w: self.max_power_w,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartChargingConfig {
    #[serde(flatten)]
    pub rules: SmartChargingRules,
    pub recompute: RecomputeMode,
    /// Only used with `recompute = "poll"`
    pub poll_interval_ms: u64,
    pub inbox_capacity: usize,
}

impl Default for SmartChargingConfig {
    fn default() -> Self {
        let worker = WorkerSettings::default();
        Self {
            rules: worker.rules,
            recompute: worker.recompute,
            poll_interval_ms: worker.poll_interval.as_millis() as u64,
            inbox_capacity: worker.inbox_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// MeterValues sampling period; 0 disables sampling
    pub sample_interval_ms: u64,
    pub vehicle: VehicleProfile,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 10_000,
            vehicle: VehicleProfile::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "cp_simulator=debug"
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Prometheus scrape endpoint
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:9464".to_string(),
        }
    }
}

impl MetricsConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("metrics.listen '{}': {}", self.listen, e)))
    }
}

impl AppConfig {
    /// Read and validate the config at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the config to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.station.id.trim().is_empty() {
            return Err(ConfigError::Invalid("station.id must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for connector in &self.station.connectors {
            if connector.id == 0 {
                return Err(ConfigError::Invalid(
                    "connector id 0 addresses the whole station".into(),
                ));
            }
            if !seen.insert(connector.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate connector id {}",
                    connector.id
                )));
            }
            connector
                .electrical()
                .physical_limit_w()
                .map_err(|e| ConfigError::Invalid(format!("connector {}: {}", connector.id, e)))?;
        }

        if self.smart_charging.recompute == RecomputeMode::Poll
            && self.smart_charging.poll_interval_ms == 0
        {
            return Err(ConfigError::Invalid(
                "smart_charging.poll_interval_ms must be positive in poll mode".into(),
            ));
        }
        if self.smart_charging.rules.max_schedule_periods == 0 {
            return Err(ConfigError::Invalid(
                "smart_charging.max_schedule_periods must be positive".into(),
            ));
        }

        match self.logging.format.to_lowercase().as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "logging.format must be 'pretty' or 'json', got '{}'",
                    other
                )))
            }
        }

        if self.metrics.enabled {
            self.metrics.listen_addr()?;
        }
        Ok(())
    }

    /// Settings handed to every connector worker.
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            station_id: self.station.id.clone(),
            rules: self.smart_charging.rules,
            recompute: self.smart_charging.recompute,
            poll_interval: Duration::from_millis(self.smart_charging.poll_interval_ms.max(1)),
            inbox_capacity: self.smart_charging.inbox_capacity.max(1),
        }
    }

    /// `None` when sampling is disabled.
    pub fn sample_interval(&self) -> Option<Duration> {
        match self.telemetry.sample_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// `$CP_SIM_CONFIG`, else `~/.config/ocpp-cp-simulator/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}
