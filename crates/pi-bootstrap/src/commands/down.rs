//! `down`: remove what `up` installed.

use anyhow::Result;
use clap::Args;
use tracing::info;

use pi_bootstrap::{steps, ui};

use super::GlobalOptions;

/// Delete the root application, Argo CD and K3s, then unmount storage.
///
/// The fstab entry is kept.
#[derive(Args, Debug, Default)]
pub struct DownCommand {}

impl DownCommand {
    /// Run the teardown sequence. Returns the exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub async fn run(&self, opts: &GlobalOptions) -> Result<u8> {
        let config = opts.load_config()?;
        let ctx = opts.context(config);
        if !opts.json {
            ui::print_section("🧹 Raspberry Pi Teardown");
        }

        let sequence = steps::teardown_sequence();
        info!(host = %ctx.hostname, steps = sequence.len(), "Starting teardown");
        let result = opts.orchestrator(&ctx).run(&ctx, &sequence).await;

        opts.report("Teardown", sequence.len(), &result)?;
        Ok(result.exit_code())
    }
}
