//! Bridge runner for lifecycle management.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{BusClient, TelemetryBus};
use crate::commands::InboundCommandHandler;
use crate::config::BridgeConfig;
use crate::health::HealthState;
use crate::http::HttpServer;
use crate::poller::PollingLoop;
use crate::vclient::{CommandExecutor, CommandRunner};
use crate::zenoh_client::ZenohClient;

/// Wires the runner, the bus, the polling loop, the control topic and the
/// health endpoints together, and tears them down on shutdown.
///
/// Handles:
/// - Health endpoint serving (optional)
/// - Control topic subscription
/// - The polling loop
/// - Graceful shutdown on Ctrl+C or SIGTERM
pub struct BridgeRunner<C: BusClient> {
    config: BridgeConfig,
    bus: Arc<TelemetryBus<C>>,
    executor: Arc<dyn CommandExecutor>,
    health: Arc<HealthState>,
    cancel: CancellationToken,
}

impl BridgeRunner<ZenohClient> {
    /// Production runner: Zenoh bus and the real `vclient` process.
    pub fn from_config(config: BridgeConfig) -> Self {
        let executor = Arc::new(CommandRunner::new(&config.vclient));
        Self::new(config, ZenohClient::new(), executor)
    }
}

impl<C: BusClient> BridgeRunner<C> {
    pub fn new(config: BridgeConfig, client: C, executor: Arc<dyn CommandExecutor>) -> Self {
        let bus = Arc::new(TelemetryBus::new(config.bus.clone(), client));

        Self {
            config,
            bus,
            executor,
            health: Arc::new(HealthState::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn health(&self) -> Arc<HealthState> {
        self.health.clone()
    }

    pub fn bus(&self) -> Arc<TelemetryBus<C>> {
        self.bus.clone()
    }

    /// Token that stops the bridge when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until Ctrl+C or SIGTERM.
    pub async fn run(self) -> anyhow::Result<()> {
        let cancel = self.cancel.clone();
        let signals = tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            cancel.cancel();
        });

        let result = self.run_until_cancelled().await;
        signals.abort();
        result
    }

    /// Run until the cancellation token fires.
    ///
    /// Fails only when the polling loop refuses to start.
    pub async fn run_until_cancelled(self) -> anyhow::Result<()> {
        info!(version = %env!("CARGO_PKG_VERSION"), "Starting vcontrol bridge");

        if !self.bus.is_configured() {
            warn!("Bus not configured (bus.host / bus.base_topic); readings will not be published");
        }

        let http_task = if self.config.http.enabled {
            let server = HttpServer::new(self.health.clone(), self.config.http.listen);
            let shutdown = self.cancel.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = server.run(shutdown).await {
                    error!(error = %e, "HTTP server failed");
                }
            }))
        } else {
            None
        };

        let commands = InboundCommandHandler::new(self.executor.clone(), self.cancel.clone());
        commands.start(&self.bus).await;

        let poller = Arc::new(PollingLoop::new(
            self.executor.clone(),
            self.bus.clone(),
            self.health.clone(),
            &self.config.vclient,
        ));
        let poll_task = tokio::spawn(poller.run(self.cancel.clone()));

        info!("Bridge running. Press Ctrl+C to stop.");

        let result = match poll_task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(error = %e, "Polling loop failed to start");
                Err(anyhow::Error::from(e))
            }
            Err(e) => Err(anyhow::anyhow!("Polling task failed: {}", e)),
        };

        // The loop also ends on its own after a configuration error.
        self.cancel.cancel();

        commands.stop(&self.bus).await;

        if let Some(task) = http_task {
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }

        self.bus.close().await;

        info!("vcontrol bridge stopped");
        result
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        },
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::testing::{MemoryClient, ScriptedExecutor};

    #[tokio::test]
    async fn test_missing_commands_fails_fast() {
        let mut config = BridgeConfig::default();
        config.http.enabled = false;

        let runner = BridgeRunner::new(
            config,
            MemoryClient::new(),
            Arc::new(ScriptedExecutor::new()),
        );

        let err = tokio::time::timeout(Duration::from_secs(5), runner.run_until_cancelled())
            .await
            .expect("runner did not stop")
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BridgeError>(),
            Some(BridgeError::ConfigValidation(_))
        ));
    }
}
