//! Periodic vclient polling and reading publication.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vcontrol_common::{Format, Reading, encode, exit_code, format_value, sanitize_subtopic};

use crate::bus::{BusClient, TelemetryBus};
use crate::config::VclientConfig;
use crate::error::{BridgeError, Cancelled, Result};
use crate::health::HealthState;
use crate::vclient::CommandExecutor;

/// Why a single iteration did not complete.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("poll cancelled")]
    Cancelled,
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl From<Cancelled> for PollError {
    fn from(_: Cancelled) -> Self {
        PollError::Cancelled
    }
}

/// Counts from one completed iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub readings: usize,
    pub published: usize,
    pub exit_code: i32,
}

/// Queries the configured commands on an interval and publishes each
/// reading under `base_topic/<command>`.
pub struct PollingLoop<C: BusClient> {
    executor: Arc<dyn CommandExecutor>,
    bus: Arc<TelemetryBus<C>>,
    health: Arc<HealthState>,
    commands: Vec<String>,
    poll_interval: Duration,
    publish_value_only: bool,
    format: Format,
}

impl<C: BusClient> PollingLoop<C> {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        bus: Arc<TelemetryBus<C>>,
        health: Arc<HealthState>,
        config: &VclientConfig,
    ) -> Self {
        Self {
            executor,
            bus,
            health,
            commands: config.commands.clone(),
            poll_interval: config.poll_interval(),
            publish_value_only: config.publish_value_only,
            format: config.payload_format,
        }
    }

    /// Run until `cancel` fires.
    ///
    /// Returns an error only when there is nothing to poll. Each iteration
    /// runs in its own task: errors and panics are logged, recorded in the
    /// health state, and retried after the next interval.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        if self.commands.iter().all(|c| c.trim().is_empty()) {
            return Err(BridgeError::validation("no vclient commands configured"));
        }

        info!(
            commands = %self.commands.join(","),
            interval_secs = self.poll_interval.as_secs(),
            value_only = self.publish_value_only,
            "Starting polling loop"
        );

        while !cancel.is_cancelled() {
            let iteration = {
                let poller = self.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { poller.run_once(&cancel).await })
            };

            match iteration.await {
                Ok(Ok(summary)) => debug!(
                    readings = summary.readings,
                    published = summary.published,
                    exit_code = summary.exit_code,
                    "Poll complete"
                ),
                Ok(Err(PollError::Cancelled)) => break,
                Ok(Err(PollError::Bridge(e))) => {
                    error!(error = %e, "Poll iteration failed");
                    self.health
                        .report_failure(exit_code::START_FAILED, Some(&e.to_string()));
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    error!(error = %e, "Poll iteration panicked");
                    self.health.report_failure(
                        exit_code::START_FAILED,
                        Some(&format!("poll iteration panicked: {}", e)),
                    );
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Polling loop stopped");
        Ok(())
    }

    /// Query once, publish the readings and record the outcome.
    pub async fn run_once(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<PollSummary, PollError> {
        let result = self.executor.query(&self.commands, cancel).await?;
        let mut published = 0;

        for reading in &result.readings {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }

            let subtopic = sanitize_subtopic(reading.command_name());
            if subtopic.is_empty() {
                debug!(command = ?reading.command, "Dropping reading without usable command name");
                continue;
            }

            let Some(payload) = self.payload(reading)? else {
                debug!(subtopic = %subtopic, "Reading has no value; skipping");
                continue;
            };

            if self.bus.publish_to(&subtopic, payload, cancel).await {
                published += 1;
            } else {
                debug!(subtopic = %subtopic, "Reading not published");
            }
        }

        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        let code = result.exit_code;
        let stderr = result.stderr.trim();
        if !stderr.is_empty() {
            warn!(exit_code = code, stderr = %stderr, "vclient reported errors");
        }

        if result.is_success() {
            self.health.report_success(code, Some(stderr));
        } else {
            let message = if stderr.is_empty() {
                format!("vclient exited with code {}", code)
            } else {
                stderr.to_string()
            };
            self.health.report_failure(code, Some(&message));
        }

        Ok(PollSummary {
            readings: result.readings.len(),
            published,
            exit_code: code,
        })
    }

    /// Payload for one reading, or `None` when value-only mode has nothing
    /// to send.
    fn payload(&self, reading: &Reading) -> Result<Option<Vec<u8>>> {
        if self.publish_value_only {
            return Ok(format_value(reading).map(String::into_bytes));
        }

        Ok(Some(encode(reading, self.format)?))
    }
}
