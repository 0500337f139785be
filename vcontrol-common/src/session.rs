use zenoh::Session;

use crate::config::BusConfig;
use crate::error::{Error, Result};

/// Build the Zenoh configuration for a bus connection.
///
/// The router at `host:port` becomes the single connect endpoint. When a
/// user is set, user/password authentication is enabled on the transport.
pub fn zenoh_config(config: &BusConfig) -> Result<zenoh::Config> {
    let mut zenoh_config = zenoh::Config::default();

    let mode_str = match config.mode.as_str() {
        "client" | "peer" | "router" => format!("\"{}\"", config.mode),
        other => {
            return Err(Error::Config(format!(
                "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
                other
            )));
        }
    };

    zenoh_config
        .insert_json5("mode", &mode_str)
        .map_err(|e| Error::Config(format!("Failed to set mode: {}", e)))?;

    let endpoints_json = serde_json::to_string(&[config.endpoint()])?;
    zenoh_config
        .insert_json5("connect/endpoints", &endpoints_json)
        .map_err(|e| Error::Config(format!("Failed to set connect endpoints: {}", e)))?;

    if config.has_credentials() {
        zenoh_config
            .insert_json5(
                "transport/auth/usrpwd/user",
                &serde_json::to_string(&config.user)?,
            )
            .map_err(|e| Error::Config(format!("Failed to set user: {}", e)))?;
        zenoh_config
            .insert_json5(
                "transport/auth/usrpwd/password",
                &serde_json::to_string(&config.password)?,
            )
            .map_err(|e| Error::Config(format!("Failed to set password: {}", e)))?;
    }

    Ok(zenoh_config)
}

/// Open a Zenoh session to the configured router.
pub async fn connect(config: &BusConfig) -> Result<Session> {
    let zenoh_config = zenoh_config(config)?;

    tracing::debug!(
        mode = %config.mode,
        endpoint = %config.endpoint(),
        auth = config.has_credentials(),
        "Opening Zenoh session"
    );

    let session = zenoh::open(zenoh_config).await?;

    tracing::debug!(zid = %session.zid(), "Zenoh session opened");

    Ok(session)
}
