//! `vclient` process runner.
//!
//! Every invocation goes through one [`ExecutionGate`], so the polling loop
//! and inbound command batches never talk to vcontrold at the same time.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use vcontrol_common::{ProcessResult, QueryResult, decode_output, exit_code};

use crate::config::VclientConfig;
use crate::error::Cancelled;
use crate::gate::{ExecutionGate, GateError};

/// Something that can answer a batch of vclient commands.
///
/// Implemented by [`CommandRunner`]; tests substitute scripted fakes.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the commands and decode the readings.
    async fn query(
        &self,
        commands: &[String],
        cancel: &CancellationToken,
    ) -> Result<QueryResult, Cancelled>;
}

/// Runs `vclient` against one vcontrold instance.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    program_args: Vec<String>,
    host: String,
    port: u16,
    gate: ExecutionGate,
}

impl CommandRunner {
    pub fn new(config: &VclientConfig) -> Self {
        Self {
            program: config.program.clone(),
            program_args: config.program_args.clone(),
            host: config.host.clone(),
            port: config.port,
            gate: ExecutionGate::new(config.gate_timeout()),
        }
    }

    /// Replace the gate timeout.
    pub fn with_gate_timeout(mut self, timeout: Duration) -> Self {
        self.gate = ExecutionGate::new(timeout);
        self
    }

    /// The gate shared by every clone of this runner.
    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }

    /// Arguments passed to the program for a comma-joined command string.
    pub fn arguments(&self, command: &str) -> Vec<String> {
        let mut args = self.program_args.clone();
        args.extend([
            "--json-long".to_string(),
            "-h".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "-c".to_string(),
            command.to_string(),
        ]);
        args
    }

    /// Run one batch of commands.
    ///
    /// Blank entries are dropped; an empty batch succeeds without spawning.
    /// Failures are reported through the exit code (see
    /// [`vcontrol_common::exit_code`]); only cancellation is an `Err`.
    pub async fn run(
        &self,
        commands: &[String],
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, Cancelled> {
        let commands: Vec<&str> = commands
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();

        if commands.is_empty() {
            return Ok(ProcessResult::empty());
        }

        let joined = commands.join(",");

        let _permit = match self.gate.acquire(cancel).await {
            Ok(permit) => permit,
            Err(GateError::Cancelled) => return Err(Cancelled),
            Err(e @ GateError::Timeout(_)) => {
                debug!(commands = %joined, "vclient gate busy");
                return Ok(ProcessResult::failure(
                    exit_code::GATE_TIMEOUT,
                    e.to_string(),
                ));
            }
        };

        self.spawn_and_wait(&joined, cancel).await
    }

    /// Run a batch and decode its output.
    pub async fn query(
        &self,
        commands: &[String],
        cancel: &CancellationToken,
    ) -> Result<QueryResult, Cancelled> {
        let result = self.run(commands, cancel).await?;
        Ok(decode_output(result))
    }

    async fn spawn_and_wait(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, Cancelled> {
        let child = Command::new(&self.program)
            .args(self.arguments(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                error!(
                    program = %self.program,
                    command = %command,
                    error = %e,
                    "Failed to start vclient"
                );
                return Ok(ProcessResult::failure(
                    exit_code::START_FAILED,
                    format!("failed to start {}: {}", self.program, e),
                ));
            }
        };

        debug!(
            program = %self.program,
            pid = ?child.id(),
            command = %command,
            "vclient started"
        );

        // Dropping the wait future on cancellation drops the child, which
        // kills it (kill_on_drop).
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(command = %command, "vclient cancelled");
                return Err(Cancelled);
            }
            output = child.wait_with_output() => output,
        };

        match output {
            Ok(output) => {
                let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let code = match output.status.code() {
                    Some(code) => code,
                    None => {
                        warn!(command = %command, status = %output.status, "vclient killed");
                        if !stderr.is_empty() {
                            stderr.push('\n');
                        }
                        stderr.push_str(&format!("vclient terminated by {}", output.status));
                        exit_code::SIGNALLED
                    }
                };

                Ok(ProcessResult {
                    stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                    stderr,
                    exit_code: code,
                })
            }
            Err(e) => {
                error!(
                    program = %self.program,
                    command = %command,
                    error = %e,
                    "Failed to wait for vclient"
                );
                Ok(ProcessResult::failure(exit_code::START_FAILED, e.to_string()))
            }
        }
    }
}

#[async_trait]
impl CommandExecutor for CommandRunner {
    async fn query(
        &self,
        commands: &[String],
        cancel: &CancellationToken,
    ) -> Result<QueryResult, Cancelled> {
        CommandRunner::query(self, commands, cancel).await
    }
}
