//! Argo CD installation and the root "app of apps" Application.

use tracing::info;

use crate::context::RunContext;
use crate::error::Result;
use crate::manifest::RootApplication;
use crate::step::Step;

const APPLICATION_RESOURCE: &str = "applications.argoproj.io";

fn root_application(ctx: &RunContext) -> Result<RootApplication> {
    RootApplication::load(ctx.host(), &ctx.config.gitops.root_manifest)
}

fn root_application_exists(ctx: &RunContext, app: &RootApplication) -> Result<bool> {
    let namespace = app.namespace_or(&ctx.config.gitops.namespace);
    ctx.kubectl()
        .exists(APPLICATION_RESOURCE, &app.name, Some(namespace))
}

/// Installs Argo CD from its upstream manifest.
pub struct InstallGitOpsController;

impl Step for InstallGitOpsController {
    fn name(&self) -> &'static str {
        "install-gitops-controller"
    }

    fn description(&self) -> &'static str {
        "Install Argo CD"
    }

    fn check_precondition(&self, ctx: &RunContext) -> Result<bool> {
        let gitops = &ctx.config.gitops;
        ctx.kubectl()
            .exists("deployment", &gitops.server_deployment, Some(gitops.namespace.as_str()))
    }

    fn execute(&self, ctx: &RunContext) -> Result<()> {
        let gitops = &ctx.config.gitops;
        let kubectl = ctx.kubectl();

        kubectl.ensure_namespace(&gitops.namespace)?;

        info!(manifest = %gitops.manifest_url, namespace = %gitops.namespace, "Applying Argo CD manifest");
        // Argo CD's CRDs exceed the client-side last-applied annotation limit.
        kubectl.run_checked(&[
            "apply",
            "--server-side",
            "--force-conflicts",
            "-n",
            gitops.namespace.as_str(),
            "-f",
            gitops.manifest_url.as_str(),
        ])?;
        Ok(())
    }
}

/// Waits for the Argo CD server deployment to finish rolling out.
pub struct WaitGitOpsReady;

impl Step for WaitGitOpsReady {
    fn name(&self) -> &'static str {
        "wait-gitops-ready"
    }

    fn description(&self) -> &'static str {
        "Wait for Argo CD"
    }

    fn check_precondition(&self, ctx: &RunContext) -> Result<bool> {
        let gitops = &ctx.config.gitops;
        ctx.kubectl()
            .rollout_complete(&gitops.namespace, &gitops.server_deployment)
    }

    fn execute(&self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }
}

/// Applies the root Application, handing the rest of the cluster to Argo CD.
pub struct ApplyRootApplication;

impl Step for ApplyRootApplication {
    fn name(&self) -> &'static str {
        "apply-root-application"
    }

    fn description(&self) -> &'static str {
        "Apply root application"
    }

    fn check_precondition(&self, ctx: &RunContext) -> Result<bool> {
        let app = root_application(ctx)?;
        root_application_exists(ctx, &app)
    }

    fn execute(&self, ctx: &RunContext) -> Result<()> {
        let app = root_application(ctx)?;
        let namespace = app.namespace_or(&ctx.config.gitops.namespace);
        info!(application = %app.name, namespace, path = %app.path.display(), "Applying root application");
        ctx.kubectl()
            .run_with_stdin(&["apply", "-n", namespace, "-f", "-"], &app.content)
    }
}

/// Deletes the root Application.
pub struct DeleteRootApplication;

impl Step for DeleteRootApplication {
    fn name(&self) -> &'static str {
        "delete-root-application"
    }

    fn description(&self) -> &'static str {
        "Delete root application"
    }

    fn check_precondition(&self, ctx: &RunContext) -> Result<bool> {
        if !ctx.kubectl().is_available() {
            return Ok(true);
        }
        let app = root_application(ctx)?;
        let namespace = app.namespace_or(&ctx.config.gitops.namespace);
        Ok(!ctx
            .kubectl()
            .exists_checked(APPLICATION_RESOURCE, &app.name, Some(namespace))?)
    }

    fn execute(&self, ctx: &RunContext) -> Result<()> {
        let app = root_application(ctx)?;
        let namespace = app.namespace_or(&ctx.config.gitops.namespace);
        info!(application = %app.name, namespace, "Deleting root application");
        ctx.kubectl().run_with_stdin(
            &["delete", "-n", namespace, "--ignore-not-found", "-f", "-"],
            &app.content,
        )
    }
}

/// Removes Argo CD by deleting its namespace.
pub struct UninstallGitOpsController;

impl Step for UninstallGitOpsController {
    fn name(&self) -> &'static str {
        "uninstall-gitops-controller"
    }

    fn description(&self) -> &'static str {
        "Uninstall Argo CD"
    }

    fn check_precondition(&self, ctx: &RunContext) -> Result<bool> {
        Ok(!ctx
            .kubectl()
            .exists_checked("namespace", &ctx.config.gitops.namespace, None)?)
    }

    fn execute(&self, ctx: &RunContext) -> Result<()> {
        let namespace = ctx.config.gitops.namespace.as_str();
        info!(namespace, "Deleting Argo CD namespace");
        ctx.kubectl().run_checked(&[
            "delete",
            "namespace",
            namespace,
            "--ignore-not-found",
            "--wait=false",
        ])?;
        Ok(())
    }
}
