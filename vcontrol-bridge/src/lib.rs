//! Zenoh bridge for vcontrold heating controllers.
//!
//! Runs `vclient` on an interval, publishes every reading under its own
//! key, and runs ad-hoc command batches received on a control key. All
//! `vclient` invocations share one exclusive gate.
//!
//! # Key Expressions
//!
//! ```text
//! <base_topic>/<command>     one reading (JSON/CBOR object, or the bare value)
//! <base_topic>/commands      comma-separated command batch (inbound)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use vcontrol_bridge::{BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::load_from_file("vcontrol.json5")?;
//!     BridgeRunner::from_config(config).run().await
//! }
//! ```

pub mod args;
pub mod bus;
pub mod commands;
pub mod config;
pub mod error;
pub mod gate;
pub mod health;
pub mod http;
pub mod poller;
pub mod runner;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod vclient;
pub mod zenoh_client;

pub use args::BridgeArgs;
pub use bus::{BusClient, MessageHandler, TelemetryBus, message_handler};
pub use commands::{InboundCommandHandler, parse_command_batch};
pub use config::{BridgeConfig, HttpConfig, VclientConfig};
pub use error::{BridgeError, Cancelled, Result};
pub use gate::{ExecutionGate, GateError, GatePermit};
pub use health::{HealthSnapshot, HealthState, HealthStatus};
pub use http::HttpServer;
pub use poller::{PollError, PollSummary, PollingLoop};
pub use runner::BridgeRunner;
pub use vclient::{CommandExecutor, CommandRunner};
pub use zenoh_client::ZenohClient;
