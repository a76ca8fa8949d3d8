//! Idempotent single-node cluster bootstrap for a Raspberry Pi.
//!
//! Runs an ordered sequence of [`Step`]s: mount external storage, install
//! K3s, wait for the node, install Argo CD, wait for it, then apply the root
//! "app of apps" Application. Every step checks whether its effect already
//! holds, so re-running on a provisioned host changes nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pi_bootstrap::{preflight, steps, BootstrapConfig, Orchestrator, RunContext, SystemHost, WaitPolicy};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BootstrapConfig::with_defaults();
//!     let mut ctx = RunContext::new(config, Arc::new(SystemHost::new()));
//!     preflight::run(&mut ctx)?;
//!
//!     let orchestrator = Orchestrator::new(WaitPolicy::from(&ctx.config.readiness));
//!     let result = orchestrator.run(&ctx, &steps::bring_up_sequence()).await;
//!     std::process::exit(i32::from(result.exit_code()));
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod kubectl;
pub mod manifest;
pub mod mounts;
pub mod orchestrator;
pub mod preflight;
pub mod step;
pub mod steps;
pub mod ui;
pub mod wait;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BootstrapConfig;
pub use context::{HostFacts, ResourceWarning, RunContext};
pub use error::{BootstrapError, FailureKind, Result};
pub use host::{CommandOutput, Host, HostCommand, SystemHost};
pub use orchestrator::{Orchestrator, RunResult, RunState};
pub use step::{Step, StepRecord, StepResult};
pub use wait::WaitPolicy;
