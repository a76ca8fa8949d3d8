//! Per-invocation run context.

use std::sync::Arc;

use serde::Serialize;

use crate::config::BootstrapConfig;
use crate::host::Host;
use crate::kubectl::Kubectl;

/// Facts gathered about the host during preflight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostFacts {
    pub total_memory_bytes: u64,
    /// Free space on the mounted storage (`None` if unknown or not mounted yet).
    pub available_disk_bytes: Option<u64>,
    pub storage_device_present: bool,
    pub storage_mounted: bool,
}

/// A non-fatal resource shortfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceWarning {
    pub resource: String,
    pub detail: String,
}

/// Everything a step needs. Owned by one run and dropped at exit.
pub struct RunContext {
    pub hostname: String,
    pub config: BootstrapConfig,
    pub facts: HostFacts,
    pub warnings: Vec<ResourceWarning>,
    host: Arc<dyn Host>,
}

impl RunContext {
    #[must_use]
    pub fn new(config: BootstrapConfig, host: Arc<dyn Host>) -> Self {
        Self {
            hostname: host.hostname(),
            config,
            facts: HostFacts::default(),
            warnings: Vec::new(),
            host,
        }
    }

    #[must_use]
    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    /// kubectl bound to the configured kubeconfig, with queries bounded by
    /// the poll interval.
    #[must_use]
    pub fn kubectl(&self) -> Kubectl<'_> {
        Kubectl::new(
            self.host.as_ref(),
            &self.config.gitops.kubectl,
            &self.config.runtime.kubeconfig,
        )
        .with_request_timeout(self.config.readiness.poll_interval())
    }

    pub fn warn(&mut self, resource: impl Into<String>, detail: impl Into<String>) {
        self.warnings.push(ResourceWarning {
            resource: resource.into(),
            detail: detail.into(),
        });
    }
}
