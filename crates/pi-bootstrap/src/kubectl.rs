//! Typed kubectl invocations.
//!
//! Every call passes `--kubeconfig` explicitly; the operator's ambient
//! context is never consulted.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::host::{CommandOutput, Host, HostCommand};

/// Upper bound for a single polling query unless overridden.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// kubectl's reply when a CRD (e.g. Argo CD's `Application`) is not installed.
const UNKNOWN_RESOURCE_TYPE: &str = "the server doesn't have a resource type";

/// Lists `<node>=<Ready status>` one per line.
const NODE_READY_JSONPATH: &str = r#"jsonpath={range .items[*]}{.metadata.name}={.status.conditions[?(@.type=="Ready")].status}{"\n"}{end}"#;

/// kubectl bound to one host and kubeconfig.
pub struct Kubectl<'a> {
    host: &'a dyn Host,
    program: &'a str,
    kubeconfig: &'a Path,
    request_timeout: Duration,
}

impl<'a> Kubectl<'a> {
    #[must_use]
    pub fn new(host: &'a dyn Host, program: &'a str, kubeconfig: &'a Path) -> Self {
        Self {
            host,
            program,
            kubeconfig,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bound each polling query, so a hung API server costs at most this
    /// much per check.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Whether kubectl and the kubeconfig are both present.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.host.find_program(self.program).is_some() && self.host.path_exists(self.kubeconfig)
    }

    fn command<I, S>(&self, args: I) -> HostCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HostCommand::new(self.program)
            .arg("--kubeconfig")
            .arg(self.kubeconfig.to_string_lossy())
            .args(args)
    }

    /// Run kubectl with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns an error only if kubectl could not be started.
    pub fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.host.run(&self.command(args.iter().copied()))
    }

    /// Run a read-only query bounded by the request timeout.
    fn query(&self, args: &[&str]) -> Result<CommandOutput> {
        let timeout = format!(
            "--request-timeout={}s",
            self.request_timeout.as_secs().max(1)
        );
        self.host.run(&self.command(args.iter().copied()).arg(timeout))
    }

    fn get_args<'b>(kind: &'b str, name: &'b str, namespace: Option<&'b str>) -> Vec<&'b str> {
        let mut args = vec!["get", kind, name, "--ignore-not-found", "-o", "name"];
        if let Some(ns) = namespace {
            args.extend(["-n", ns]);
        }
        args
    }

    /// Run kubectl and require a zero exit.
    ///
    /// # Errors
    ///
    /// Returns an unexpected fault with kubectl's stderr on failure.
    pub fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let context = format!("kubectl {}", args.join(" "));
        self.run(args)?.check(&context)
    }

    /// Pipe a manifest into `kubectl apply -f -`.
    ///
    /// # Errors
    ///
    /// Returns an unexpected fault if the apply fails.
    pub fn apply_stdin(&self, yaml: &str) -> Result<()> {
        self.run_with_stdin(&["apply", "-f", "-"], yaml)
    }

    /// Run kubectl with `input` on stdin and require a zero exit.
    ///
    /// # Errors
    ///
    /// Returns an unexpected fault with kubectl's stderr on failure.
    pub fn run_with_stdin(&self, args: &[&str], input: &str) -> Result<()> {
        let context = format!("kubectl {}", args.join(" "));
        let command = self.command(args.iter().copied()).stdin(input);
        self.host.run(&command)?.check(&context)?;
        Ok(())
    }

    /// Create a namespace if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an unexpected fault if kubectl fails.
    pub fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        debug!(namespace, "Ensuring namespace exists");
        let generated = self.run_checked(&[
            "create",
            "namespace",
            namespace,
            "--dry-run=client",
            "-o",
            "yaml",
        ])?;
        self.apply_stdin(&generated.stdout)
    }

    /// Whether a named object exists. An unreachable API or unknown kind
    /// counts as "does not exist", which keeps bring-up polling.
    ///
    /// # Errors
    ///
    /// Returns an error only if kubectl could not be started.
    pub fn exists(&self, kind: &str, name: &str, namespace: Option<&str>) -> Result<bool> {
        if !self.is_available() {
            debug!(kind, name, "kubectl unavailable; treating object as absent");
            return Ok(false);
        }
        let out = self.query(&Self::get_args(kind, name, namespace))?;
        Ok(out.success() && !out.stdout.trim().is_empty())
    }

    /// Like [`exists`](Self::exists), but a failed query is an error rather
    /// than "absent". Used where absence lets a step be skipped.
    ///
    /// Missing kubectl or kubeconfig still counts as absent: the cluster is
    /// gone. So does an unknown resource type, as the CRD is gone too.
    ///
    /// # Errors
    ///
    /// Returns an unexpected fault with kubectl's stderr if the query fails.
    pub fn exists_checked(&self, kind: &str, name: &str, namespace: Option<&str>) -> Result<bool> {
        if !self.is_available() {
            debug!(kind, name, "kubectl unavailable; treating object as absent");
            return Ok(false);
        }
        let args = Self::get_args(kind, name, namespace);
        let out = self.query(&args)?;
        if !out.success() && out.stderr.contains(UNKNOWN_RESOURCE_TYPE) {
            debug!(kind, "Resource type not installed; treating object as absent");
            return Ok(false);
        }
        let out = out.check(&format!("kubectl {}", args.join(" ")))?;
        Ok(!out.stdout.trim().is_empty())
    }

    /// Whether every node in the cluster is Ready.
    ///
    /// # Errors
    ///
    /// Returns an error only if kubectl could not be started.
    pub fn nodes_ready(&self) -> Result<bool> {
        if !self.is_available() {
            return Ok(false);
        }
        let out = self.query(&["get", "nodes", "-o", NODE_READY_JSONPATH])?;
        Ok(out.success() && all_nodes_ready(&out.stdout))
    }

    /// Whether a deployment has finished rolling out.
    ///
    /// # Errors
    ///
    /// Returns an error only if kubectl could not be started.
    pub fn rollout_complete(&self, namespace: &str, deployment: &str) -> Result<bool> {
        if !self.is_available() {
            return Ok(false);
        }
        let target = format!("deployment/{deployment}");
        let out = self.query(&[
            "rollout",
            "status",
            target.as_str(),
            "-n",
            namespace,
            "--timeout=1s",
        ])?;
        Ok(out.success())
    }
}

/// True when at least one node is listed and every node reports `True`.
#[must_use]
pub fn all_nodes_ready(output: &str) -> bool {
    let mut seen = false;
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        seen = true;
        let status = line.rsplit_once('=').map_or("", |(_, s)| s);
        if status != "True" {
            return false;
        }
    }
    seen
}
