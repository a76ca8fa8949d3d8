//! K3s installation, readiness and removal.

use tracing::{debug, info};

use crate::context::RunContext;
use crate::error::{BootstrapError, Result};
use crate::host::HostCommand;
use crate::step::Step;

const K3S_BINARY: &str = "k3s";
const INSTALL_SCRIPT_NAME: &str = "k3s-install.sh";

fn binary_present(ctx: &RunContext) -> bool {
    ctx.host().find_program(K3S_BINARY).is_some()
}

fn service_active(ctx: &RunContext) -> Result<bool> {
    let command = HostCommand::new("systemctl").args([
        "is-active",
        "--quiet",
        ctx.config.runtime.service_name.as_str(),
    ]);
    Ok(ctx.host().run(&command)?.success())
}

/// Installs K3s, or starts its service if the binary is already present.
pub struct InstallRuntime;

impl InstallRuntime {
    fn install(ctx: &RunContext) -> Result<()> {
        let runtime = &ctx.config.runtime;
        let host = ctx.host();
        // Mode 0700, removed on drop.
        let workdir = tempfile::Builder::new()
            .prefix("pi-bootstrap-")
            .tempdir()
            .map_err(|e| {
                BootstrapError::fault("Failed to create installer directory", e.to_string())
            })?;
        let script = workdir.path().join(INSTALL_SCRIPT_NAME);

        info!(url = %runtime.install_url, version = %runtime.version, "Downloading K3s installer");
        let download = HostCommand::new("curl")
            .args(["-sfL", runtime.install_url.as_str(), "-o"])
            .arg(script.to_string_lossy());
        host.run(&download)?.check("Download K3s installer")?;

        let mut install = HostCommand::new("sh")
            .arg(script.to_string_lossy())
            .args(runtime.install_args.iter().cloned())
            .env("INSTALL_K3S_VERSION", runtime.version.as_str());
        if let Some(data_dir) = ctx.config.k3s_data_dir() {
            install = install.arg("--data-dir").arg(data_dir.to_string_lossy());
        }

        info!(command = %install, "Running K3s installer");
        host.run(&install)?.check("K3s installer")?;
        drop(workdir);
        Ok(())
    }
}

impl Step for InstallRuntime {
    fn name(&self) -> &'static str {
        "install-runtime"
    }

    fn description(&self) -> &'static str {
        "Install K3s"
    }

    fn check_precondition(&self, ctx: &RunContext) -> Result<bool> {
        Ok(binary_present(ctx) && service_active(ctx)?)
    }

    fn execute(&self, ctx: &RunContext) -> Result<()> {
        if binary_present(ctx) {
            let service = ctx.config.runtime.service_name.as_str();
            info!(service, "K3s installed but inactive; starting service");
            let start = HostCommand::new("systemctl").args(["start", service]);
            ctx.host().run(&start)?.check("systemctl start")?;
            return Ok(());
        }
        Self::install(ctx)
    }

    fn check_postcondition(&self, ctx: &RunContext) -> Result<bool> {
        Ok(service_active(ctx)? && ctx.host().path_exists(&ctx.config.runtime.kubeconfig))
    }
}

/// Waits for every node to report Ready.
pub struct WaitClusterReady;

impl Step for WaitClusterReady {
    fn name(&self) -> &'static str {
        "wait-cluster-ready"
    }

    fn description(&self) -> &'static str {
        "Wait for Kubernetes nodes"
    }

    fn check_precondition(&self, ctx: &RunContext) -> Result<bool> {
        ctx.kubectl().nodes_ready()
    }

    fn execute(&self, _ctx: &RunContext) -> Result<()> {
        debug!("Nothing to execute; polling node readiness");
        Ok(())
    }
}

/// Removes K3s with its uninstall script.
pub struct UninstallRuntime;

impl Step for UninstallRuntime {
    fn name(&self) -> &'static str {
        "uninstall-runtime"
    }

    fn description(&self) -> &'static str {
        "Uninstall K3s"
    }

    fn check_precondition(&self, ctx: &RunContext) -> Result<bool> {
        Ok(!binary_present(ctx))
    }

    fn execute(&self, ctx: &RunContext) -> Result<()> {
        let script = &ctx.config.runtime.uninstall_script;
        if !ctx.host().path_exists(script) {
            return Err(BootstrapError::MissingRequiredResource {
                resource: script.display().to_string(),
                detail: "K3s uninstall script not found".into(),
            });
        }
        let command = HostCommand::new("sh").arg(script.to_string_lossy());
        info!(command = %command, "Uninstalling K3s");
        ctx.host().run(&command)?.check("K3s uninstall")?;
        Ok(())
    }
}
