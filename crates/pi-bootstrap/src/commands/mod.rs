//! CLI subcommands.

pub mod down;
pub mod status;
pub mod up;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use pi_bootstrap::config::BootstrapConfig;
use pi_bootstrap::context::RunContext;
use pi_bootstrap::host::SystemHost;
use pi_bootstrap::orchestrator::{Orchestrator, RunResult};
use pi_bootstrap::wait::WaitPolicy;

use pi_bootstrap::ui;

/// Options shared by every subcommand.
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub json: bool,
    pub timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub cancel: CancellationToken,
}

impl GlobalOptions {
    /// Load the config file, apply flag overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns the underlying `BootstrapError::Config` if loading or
    /// validation fails.
    pub fn load_config(&self) -> Result<BootstrapConfig> {
        let mut config = BootstrapConfig::load(self.config.as_deref())?;
        if let Some(secs) = self.timeout_secs {
            config.readiness.timeout_secs = secs;
        }
        if let Some(secs) = self.poll_interval_secs {
            config.readiness.poll_interval_secs = secs;
        }
        config.validate()?;
        debug!(?config, "Effective configuration");
        Ok(config)
    }

    /// Run context against the local machine.
    #[must_use]
    pub fn context(&self, config: BootstrapConfig) -> RunContext {
        RunContext::new(config, Arc::new(SystemHost::new()))
    }

    /// Orchestrator using the configured readiness policy and the
    /// process-wide cancellation token.
    #[must_use]
    pub fn orchestrator(&self, ctx: &RunContext) -> Orchestrator {
        Orchestrator::new(WaitPolicy::from(&ctx.config.readiness))
            .with_cancellation(self.cancel.clone())
    }

    /// Print a run result as JSON or as a human summary.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn report(&self, title: &str, total_steps: usize, result: &RunResult) -> Result<()> {
        if self.json {
            let json = serde_json::to_string_pretty(result).context("serialize run result")?;
            println!("{json}");
        } else {
            ui::print_run_summary(title, total_steps, result);
        }
        Ok(())
    }
}
