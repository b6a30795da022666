//! OCPP Charge Point Simulator: CLI runner
//!
//! ```sh
//! # Run with default config (~/.config/ocpp-cp-simulator/config.toml)
//! cp-simulator
//!
//! # Custom config path
//! cp-simulator --config ./station.toml
//!
//! # Install a SetChargingProfile.req payload at startup
//! cp-simulator --profile ./profile.json
//!
//! # Validate config without starting
//! cp-simulator --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};

use cp_simulator::config::AppConfig;
use cp_simulator::runtime::{init_tracing, SimulatorHandle, SimulatorOptions};
use cp_simulator::shared::SetChargingProfilePayload;
use cp_simulator::{Event, EventFilter};

#[derive(Parser, Debug)]
#[command(
    name = "cp-simulator",
    version,
    about = "Simulated OCPP 1.6 charge point with smart charging",
    long_about = "Runs a simulated charge point whose connectors follow the charging \
                  profiles installed on them.\n\n\
                  Default config: ~/.config/ocpp-cp-simulator/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "CP_SIM_CONFIG")]
    config: Option<PathBuf>,

    /// Override the station identity.
    #[arg(long)]
    station_id: Option<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// SetChargingProfile.req payload (JSON) to install once started.
    #[arg(long)]
    profile: Vec<PathBuf>,

    /// Validate the configuration file and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(cp_simulator::default_config_path);

    let (mut config, load_error) = match AppConfig::load_or_default(&config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config.logging);

    if let Some(e) = load_error {
        if cli.check {
            return Err(e.into());
        }
        error!("Failed to load config from {}: {}", config_path.display(), e);
        error!("Using default configuration.");
    } else {
        info!("Configuration loaded from {}", config_path.display());
    }
    if let Some(id) = cli.station_id {
        info!("CLI override: station_id = {}", id);
        config.station.id = id;
    }

    if cli.check {
        config.validate()?;
        println!("✅ Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   Station     : {}", config.station.id);
        for connector in &config.station.connectors {
            println!(
                "   Connector {} : {} V x {} phase(s), {} A",
                connector.id, connector.voltage, connector.phases, connector.max_current_a
            );
        }
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    let handle = SimulatorHandle::start(SimulatorOptions {
        config,
        ..SimulatorOptions::default()
    })
    .await?;
    handle.install_signal_handler();

    let mut events = handle.events().subscribe_filtered(
        EventFilter::all().of_types(&["effective_limit_changed", "profile_rejected"]),
    );
    tokio::spawn(async move {
        while let Some(msg) = events.recv().await {
            match &msg.event {
                Event::EffectiveLimitChanged(e) => info!(
                    connector_id = e.connector_id,
                    limit_w = e.limit_w,
                    source = e.source.as_str(),
                    "Effective limit changed"
                ),
                Event::ProfileRejected(e) => warn!(
                    connector_id = e.connector_id,
                    profile_id = e.profile_id,
                    reason = e.reason.as_str(),
                    "Profile rejected"
                ),
                _ => {}
            }
        }
    });

    let station = handle.station().clone();
    for path in &cli.profile {
        let text = std::fs::read_to_string(path)?;
        let req: SetChargingProfilePayload = serde_json::from_str(&text)?;
        let connector_id = u32::try_from(req.connector_id)?;
        let result = station
            .set_charging_profile(connector_id, req.cs_charging_profiles)
            .await;
        info!(
            profile = %path.display(),
            status = ?result.status,
            "SetChargingProfile from file"
        );
    }

    info!("🚀 Press Ctrl+C to shutdown gracefully.");
    handle.wait().await;

    Ok(())
}
