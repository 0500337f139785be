use serde::{Deserialize, Serialize};

/// Exit codes reported by the command runner.
///
/// Zero and positive values come from `vclient` itself. Negative values are
/// produced by the bridge and never by the tool.
pub mod exit_code {
    /// The tool ran and reported success.
    pub const SUCCESS: i32 = 0;
    /// The process could not be started, or an iteration failed unexpectedly.
    pub const START_FAILED: i32 = -1;
    /// Standard output was not a JSON array of readings.
    pub const DECODE_FAILED: i32 = -2;
    /// Another invocation held the execution gate for too long.
    pub const GATE_TIMEOUT: i32 = -3;
    /// The process was killed by a signal and has no exit code.
    pub const SIGNALLED: i32 = -4;
}

/// One decoded result for a single `vclient` command.
///
/// Every field is optional: missing, `null` and unknown fields in the
/// tool's output are tolerated rather than treated as decode errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Command name as echoed by the tool (e.g. "getTempA").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Numeric value, when the command produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    /// Raw textual answer from the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,

    /// Per-command error reported by the tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reading {
    /// Create a reading for a command with a numeric value.
    pub fn with_value(command: impl Into<String>, value: f64) -> Self {
        Self {
            command: Some(command.into()),
            value: Some(value),
            ..Default::default()
        }
    }

    /// Command name, or the empty string when the tool omitted it.
    pub fn command_name(&self) -> &str {
        self.command.as_deref().unwrap_or_default()
    }
}

/// Outcome of one completed external invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessResult {
    /// Successful result with empty output (nothing was spawned).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result for a failure produced by the bridge rather than the tool.
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == exit_code::SUCCESS
    }
}

/// Decoded outcome of a query: readings plus the diagnostics of the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub readings: Vec<Reading>,
    pub stderr: String,
    pub exit_code: i32,
}

impl QueryResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == exit_code::SUCCESS
    }
}

/// Decode the tool's standard output into a [`QueryResult`].
///
/// Blank output yields no readings and keeps the process's exit code. A
/// decode failure yields no readings and [`exit_code::DECODE_FAILED`], unless
/// the process already failed, in which case its own code is kept. The
/// decode error is appended to stderr either way.
pub fn decode_output(result: ProcessResult) -> QueryResult {
    let ProcessResult {
        stdout,
        stderr,
        exit_code: code,
    } = result;

    let stdout = stdout.trim();
    if stdout.is_empty() {
        return QueryResult {
            readings: Vec::new(),
            stderr,
            exit_code: code,
        };
    }

    match serde_json::from_str::<Vec<Reading>>(stdout) {
        Ok(readings) => QueryResult {
            readings,
            stderr,
            exit_code: code,
        },
        Err(e) => {
            let message = format!("failed to decode vclient output: {}", e);
            let stderr = if stderr.trim().is_empty() {
                message
            } else {
                format!("{}\n{}", stderr, message)
            };
            let code = if code == exit_code::SUCCESS {
                exit_code::DECODE_FAILED
            } else {
                code
            };

            QueryResult {
                readings: Vec::new(),
                stderr,
                exit_code: code,
            }
        }
    }
}
