//! `up`: bring the host to a running K3s + Argo CD cluster.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use pi_bootstrap::{preflight, steps, ui, BootstrapError};

use super::GlobalOptions;

/// Provision storage, K3s, Argo CD and the root application.
#[derive(Args, Debug, Default)]
pub struct UpCommand {
    /// Root Application manifest to apply.
    #[arg(long, value_name = "FILE", env = "PI_BOOTSTRAP_ROOT_MANIFEST")]
    root_manifest: Option<PathBuf>,

    /// Skip the fstab entry for the storage mount.
    #[arg(long)]
    no_persist_mount: bool,
}

impl UpCommand {
    /// Run preflight and the bring-up sequence. Returns the exit code.
    ///
    /// # Errors
    ///
    /// Returns an error for configuration or prerequisite failures, which
    /// stop the command before any step runs.
    pub async fn run(&self, opts: &GlobalOptions) -> Result<u8> {
        let mut config = opts.load_config()?;
        if let Some(path) = &self.root_manifest {
            // Resolved once, against the invocation directory.
            config.gitops.root_manifest = std::path::absolute(path).map_err(|e| {
                BootstrapError::Config(format!("cannot resolve {}: {e}", path.display()))
            })?;
        }
        if self.no_persist_mount {
            config.storage.persist_mount = false;
        }

        let mut ctx = opts.context(config);
        if !opts.json {
            ui::print_section("🥧 Raspberry Pi Bootstrap");
            ui::print_info("Checking prerequisites");
        }
        let checks = preflight::collect(&mut ctx);
        if !opts.json {
            for check in &checks {
                ui::print_check_result(check);
            }
        }
        preflight::ensure_passed(&checks)?;

        let sequence = steps::bring_up_sequence();
        info!(host = %ctx.hostname, steps = sequence.len(), "Starting bring-up");
        let result = opts.orchestrator(&ctx).run(&ctx, &sequence).await;

        opts.report("Bring-up", sequence.len(), &result)?;
        Ok(result.exit_code())
    }
}
