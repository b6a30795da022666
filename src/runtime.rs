//! Simulator runtime
//!
//! [`SimulatorHandle`] wires the station, its connector workers, the meter
//! samplers and the optional Prometheus exporter from an [`AppConfig`], and
//! owns their shutdown.

use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::charging::{SharedStation, Station};
use crate::application::telemetry::{spawn_meter_sampler, MeterSampler};
use crate::config::{AppConfig, LoggingConfig};
use crate::interfaces::OcppV16Adapter;
use crate::notifications::{create_event_bus, SharedEventBus};
use crate::shared::{
    listen_for_shutdown_signals, ChargingError, ConfigError, SharedClock, ShutdownSignal,
    SystemClock,
};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start connector: {0}")]
    Connector(#[from] ChargingError),

    #[error("Failed to start metrics exporter: {0}")]
    Metrics(String),
}

pub struct SimulatorOptions {
    pub config: AppConfig,
    /// Time source; the system clock unless a test injects one
    pub clock: SharedClock,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Handle to a running simulator.
pub struct SimulatorHandle {
    pub config: AppConfig,
    station: SharedStation,
    events: SharedEventBus,
    shutdown: ShutdownSignal,
    samplers: Vec<JoinHandle<()>>,
}

impl SimulatorHandle {
    /// Start the simulator:
    /// 1. Install the Prometheus exporter (if enabled)
    /// 2. Start one worker per configured connector
    /// 3. Start the meter samplers
    pub async fn start(opts: SimulatorOptions) -> Result<Self, RuntimeError> {
        let config = opts.config;
        config.validate()?;

        info!(station_id = %config.station.id, "Starting charge point simulator...");

        if config.metrics.enabled {
            install_metrics_exporter(&config)?;
        }

        let events = create_event_bus();
        let shutdown = ShutdownSignal::new();
        let station = Station::shared(
            config.worker_settings(),
            opts.clock.clone(),
            events.clone(),
            shutdown.clone(),
        );

        for connector in &config.station.connectors {
            if let Err(e) = station.add_connector(connector.id, connector.electrical()) {
                station.shutdown().await;
                return Err(e.into());
            }
        }

        let mut samplers = Vec::new();
        if let Some(interval) = config.sample_interval() {
            for handle in station.handles() {
                let sampler = MeterSampler::new(handle.connector_id(), config.telemetry.vehicle);
                samplers.push(spawn_meter_sampler(
                    config.station.id.clone(),
                    handle,
                    sampler,
                    interval,
                    opts.clock.clone(),
                    events.clone(),
                    shutdown.clone(),
                ));
            }
        }

        info!(
            station_id = %config.station.id,
            connectors = config.station.connectors.len(),
            samplers = samplers.len(),
            "🚀 Simulator started"
        );

        Ok(Self {
            config,
            station,
            events,
            shutdown,
            samplers,
        })
    }

    pub fn station(&self) -> &SharedStation {
        &self.station
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// OCPP 1.6 front end bound to this station.
    pub fn ocpp_adapter(&self) -> OcppV16Adapter {
        OcppV16Adapter::new(self.station.clone())
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Trigger shutdown on SIGINT / SIGTERM.
    pub fn install_signal_handler(&self) {
        tokio::spawn(listen_for_shutdown_signals(self.shutdown.clone()));
    }

    /// Block until shutdown is triggered, then stop everything.
    pub async fn wait(self) {
        self.shutdown.wait().await;
        self.stop().await;
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down simulator...");
        self.shutdown.trigger();
        self.stop().await;
    }

    async fn stop(self) {
        self.station.shutdown().await;
        for sampler in self.samplers {
            if let Err(e) = sampler.await {
                error!("Meter sampler task panicked: {}", e);
            }
        }
        info!("👋 Simulator shutdown complete");
    }
}

/// The global metrics recorder can be installed once per process; later
/// starts reuse the first result.
fn install_metrics_exporter(config: &AppConfig) -> Result<(), RuntimeError> {
    static EXPORTER: OnceLock<Result<(), String>> = OnceLock::new();

    let addr = config.metrics.listen_addr()?;
    EXPORTER
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map(|()| info!(%addr, "📊 Prometheus exporter listening"))
                .map_err(|e| e.to_string())
        })
        .clone()
        .map_err(RuntimeError::Metrics)
}

/// Initialize tracing from the logging config. `RUST_LOG` takes precedence
/// over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    let result = match config.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}
