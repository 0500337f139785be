//! Ad-hoc command batches received on `base_topic/commands`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vcontrol_common::{COMMANDS_SUBTOPIC, QueryResult};

use crate::bus::{
    BusClient, DEFAULT_UNSUBSCRIBE_TIMEOUT, MessageHandler, TelemetryBus, message_handler,
};
use crate::vclient::CommandExecutor;

/// Split a control payload into commands: comma separated, trimmed,
/// blanks dropped.
///
/// # Example
/// ```
/// use vcontrol_bridge::commands::parse_command_batch;
///
/// assert_eq!(parse_command_batch(" getTempA, ,getTempB "), vec!["getTempA", "getTempB"]);
/// assert!(parse_command_batch(" , ").is_empty());
/// ```
pub fn parse_command_batch(payload: &str) -> Vec<String> {
    payload
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Runs command batches from the control topic through the shared runner.
///
/// Replies are logged only; the health state is left to the polling loop.
pub struct InboundCommandHandler {
    executor: Arc<dyn CommandExecutor>,
    cancel: CancellationToken,
    handler: MessageHandler,
}

impl InboundCommandHandler {
    pub fn new(executor: Arc<dyn CommandExecutor>, cancel: CancellationToken) -> Self {
        let handler = {
            let executor = executor.clone();
            let cancel = cancel.clone();
            message_handler(move |topic, payload| {
                let executor = executor.clone();
                let cancel = cancel.clone();
                async move {
                    run_batch(executor.as_ref(), &topic, &payload, &cancel).await;
                    Ok(())
                }
            })
        };

        Self {
            executor,
            cancel,
            handler,
        }
    }

    /// Handle one control message.
    ///
    /// Returns the query result, or `None` when the batch was empty or the
    /// run was cancelled.
    pub async fn handle_message(&self, topic: &str, payload: &str) -> Option<QueryResult> {
        run_batch(self.executor.as_ref(), topic, payload, &self.cancel).await
    }

    /// Subscribe to the control topic. Returns whether the subscription is live.
    pub async fn start<C: BusClient>(&self, bus: &TelemetryBus<C>) -> bool {
        if !bus.is_configured() {
            info!("Bus not configured; inbound commands disabled");
            return false;
        }

        let subscribed = bus
            .subscribe(COMMANDS_SUBTOPIC, self.handler.clone(), &self.cancel)
            .await;

        if subscribed {
            info!(
                topic = %bus.build_topic(COMMANDS_SUBTOPIC),
                "Listening for inbound commands"
            );
        } else {
            warn!("Failed to subscribe to the commands topic");
        }

        subscribed
    }

    /// Drop the control topic subscription.
    pub async fn stop<C: BusClient>(&self, bus: &TelemetryBus<C>) {
        bus.unsubscribe(COMMANDS_SUBTOPIC, &self.handler, DEFAULT_UNSUBSCRIBE_TIMEOUT)
            .await;
    }
}

async fn run_batch(
    executor: &dyn CommandExecutor,
    topic: &str,
    payload: &str,
    cancel: &CancellationToken,
) -> Option<QueryResult> {
    let commands = parse_command_batch(payload);
    if commands.is_empty() {
        info!(topic = %topic, "Ignoring empty command batch");
        return None;
    }

    info!(topic = %topic, commands = %commands.join(","), "Running inbound commands");

    let result = match executor.query(&commands, cancel).await {
        Ok(result) => result,
        Err(_) => {
            debug!(topic = %topic, "Inbound commands cancelled");
            return None;
        }
    };

    for reading in &result.readings {
        info!(
            command = %reading.command_name(),
            value = ?reading.value,
            raw = ?reading.raw,
            error = ?reading.error,
            "Command reply"
        );
    }

    let stderr = result.stderr.trim();
    if !stderr.is_empty() {
        warn!(topic = %topic, stderr = %stderr, "vclient reported errors");
    }
    if !result.is_success() {
        warn!(topic = %topic, exit_code = result.exit_code, "vclient exited with non-zero code");
    }

    Some(result)
}
