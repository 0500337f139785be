//! Zenoh bridge for vcontrold.
//!
//! Polls a vcontrold daemon through `vclient` and publishes the readings
//! to Zenoh.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use vcontrol_bridge::{BridgeArgs, BridgeConfig, BridgeError, BridgeRunner};
use vcontrol_common::LoggingConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse();

    // A missing default file means "defaults plus environment".
    let (mut config, loaded_from_file) = match BridgeConfig::load_from_file(&args.config) {
        Ok(config) => (config, true),
        Err(BridgeError::ConfigNotFound { .. }) if args.uses_default_config() => {
            (BridgeConfig::default(), false)
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to load config from {:?}", args.config));
        }
    };

    config.apply_env_overrides(|key| std::env::var(key).ok());

    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    vcontrol_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    if loaded_from_file {
        info!("Loaded configuration from {:?}", args.config);
    } else {
        info!("No configuration file; using defaults and environment");
    }

    config.validate().context("Invalid configuration")?;

    info!(
        vcontrold = %format!("{}:{}", config.vclient.host, config.vclient.port),
        bus = %config.bus.endpoint(),
        base_topic = %config.bus.base_topic,
        "Configuration ready"
    );

    BridgeRunner::from_config(config).run().await
}
