//! Bootstrap configuration types.
//!
//! Everything a run needs is fixed at program start: device paths, versions,
//! manifest locations and readiness timing. Values come from built-in
//! defaults, an optional TOML file and finally CLI/env overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BootstrapError, Result};

/// Default poll interval for readiness checks, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default readiness ceiling, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// External storage (USB SSD) settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Block device holding cluster data (e.g., "/dev/sda1").
    pub device: PathBuf,
    /// Where the device is mounted.
    pub mount_point: PathBuf,
    /// Filesystem type passed to `mount -t` and written to fstab.
    pub fs_type: String,
    /// Whether to persist the mount in fstab.
    pub persist_mount: bool,
    /// fstab location.
    pub fstab_path: PathBuf,
    /// Live mount table.
    pub mounts_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            device: "/dev/sda1".into(),
            mount_point: "/mnt/ssd".into(),
            fs_type: "ext4".into(),
            persist_mount: true,
            fstab_path: "/etc/fstab".into(),
            mounts_path: "/proc/mounts".into(),
        }
    }
}

/// K3s runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// K3s release (e.g., "v1.30.4+k3s1"), exported as `INSTALL_K3S_VERSION`.
    pub version: String,
    /// Installer script URL.
    pub install_url: String,
    /// Extra arguments passed to the K3s server.
    pub install_args: Vec<String>,
    /// Keep K3s data under the storage mount point.
    pub data_on_storage: bool,
    /// Kubeconfig written by K3s.
    pub kubeconfig: PathBuf,
    /// systemd unit name.
    pub service_name: String,
    /// Uninstall script dropped by the K3s installer.
    pub uninstall_script: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: "v1.30.4+k3s1".into(),
            install_url: "https://get.k3s.io".into(),
            install_args: vec!["--write-kubeconfig-mode".into(), "644".into()],
            data_on_storage: true,
            kubeconfig: "/etc/rancher/k3s/k3s.yaml".into(),
            service_name: "k3s".into(),
            uninstall_script: "/usr/local/bin/k3s-uninstall.sh".into(),
        }
    }
}

/// Argo CD and root application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitOpsConfig {
    /// Namespace Argo CD is installed into.
    pub namespace: String,
    /// Upstream install manifest.
    pub manifest_url: String,
    /// Deployment whose rollout marks Argo CD as ready.
    pub server_deployment: String,
    /// Root "app of apps" Application descriptor. A relative path in a
    /// config file is taken relative to that file.
    pub root_manifest: PathBuf,
    /// kubectl binary name or path.
    pub kubectl: String,
}

impl Default for GitOpsConfig {
    fn default() -> Self {
        Self {
            namespace: "argocd".into(),
            manifest_url:
                "https://raw.githubusercontent.com/argoproj/argo-cd/v2.12.3/manifests/install.yaml"
                    .into(),
            server_deployment: "argocd-server".into(),
            root_manifest: "/etc/pi-bootstrap/root-app.yaml".into(),
            kubectl: "kubectl".into(),
        }
    }
}

/// Readiness polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Seconds between postcondition checks.
    pub poll_interval_secs: u64,
    /// Seconds before a postcondition is declared timed out.
    pub timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ReadinessConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Host resource thresholds checked during preflight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceThresholds {
    /// Below this much RAM the run aborts.
    pub min_memory_mb: u64,
    /// Below this much RAM a warning is logged.
    pub warn_memory_mb: u64,
    /// Below this much free disk the run aborts.
    pub min_disk_mb: u64,
    /// Below this much free disk a warning is logged.
    pub warn_disk_mb: u64,
    /// Programs that must be on PATH before anything runs.
    pub required_tools: Vec<String>,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            min_memory_mb: 512,
            warn_memory_mb: 2048,
            min_disk_mb: 2048,
            warn_disk_mb: 16 * 1024,
            required_tools: vec![
                "sh".into(),
                "curl".into(),
                "mount".into(),
                "systemctl".into(),
            ],
        }
    }
}

/// Full bootstrap configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BootstrapConfig {
    pub storage: StorageConfig,
    pub runtime: RuntimeConfig,
    pub gitops: GitOpsConfig,
    pub readiness: ReadinessConfig,
    pub resources: ResourceThresholds,
}

impl BootstrapConfig {
    /// Config with built-in defaults for a single Raspberry Pi node.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Load a config file, falling back to defaults for anything it omits.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BootstrapError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| {
            BootstrapError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        let file = std::path::absolute(path).map_err(|e| {
            BootstrapError::Config(format!("cannot resolve {}: {e}", path.display()))
        })?;
        if let Some(dir) = file.parent() {
            config.resolve_relative_to(dir);
        }
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Anchor relative file references at `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let manifest = &mut self.gitops.root_manifest;
        if manifest.is_relative() {
            *manifest = base.join(&*manifest);
        }
    }

    /// Load from an optional file path.
    ///
    /// # Errors
    ///
    /// Returns an error if a path is given and loading it fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::with_defaults()),
        }
    }

    /// Reject combinations that would make readiness polling meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let r = &self.readiness;
        if r.poll_interval_secs == 0 {
            return Err(BootstrapError::Config(
                "readiness.poll_interval_secs must be greater than zero".into(),
            ));
        }
        if r.poll_interval_secs > r.timeout_secs {
            return Err(BootstrapError::Config(format!(
                "readiness.poll_interval_secs ({}) exceeds readiness.timeout_secs ({})",
                r.poll_interval_secs, r.timeout_secs
            )));
        }
        if self.resources.min_memory_mb > self.resources.warn_memory_mb
            || self.resources.min_disk_mb > self.resources.warn_disk_mb
        {
            return Err(BootstrapError::Config(
                "resource hard minimums must not exceed warning thresholds".into(),
            ));
        }
        for (key, path) in [
            ("storage.mount_point", &self.storage.mount_point),
            ("gitops.root_manifest", &self.gitops.root_manifest),
        ] {
            if !path.is_absolute() {
                return Err(BootstrapError::Config(format!(
                    "{key} must be absolute, got {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// K3s data directory, when kept on the storage mount.
    #[must_use]
    pub fn k3s_data_dir(&self) -> Option<PathBuf> {
        self.runtime
            .data_on_storage
            .then(|| self.storage.mount_point.join("k3s"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = BootstrapConfig::with_defaults();
        assert_eq!(config.storage.device, PathBuf::from("/dev/sda1"));
        assert_eq!(config.readiness.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.readiness.timeout(), Duration::from_secs(300));
        assert_eq!(config.gitops.namespace, "argocd");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[storage]\ndevice = \"/dev/nvme0n1p1\"\n\n[readiness]\ntimeout_secs = 600\n"
        )
        .unwrap();

        let config = BootstrapConfig::from_file(file.path()).unwrap();
        assert_eq!(config.storage.device, PathBuf::from("/dev/nvme0n1p1"));
        assert_eq!(config.storage.mount_point, PathBuf::from("/mnt/ssd"));
        assert_eq!(config.readiness.timeout_secs, 600);
        assert_eq!(config.readiness.poll_interval_secs, 5);
    }

    #[test]
    fn test_unparseable_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "storage = 12").unwrap();

        let err = BootstrapConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, BootstrapError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_polling() {
        let mut config = BootstrapConfig::with_defaults();
        config.readiness.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        config.readiness.poll_interval_secs = 30;
        config.readiness.timeout_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_manifest_resolves_against_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pi-bootstrap.toml");
        std::fs::write(&path, "[gitops]\nroot_manifest = \"apps/root.yaml\"\n").unwrap();

        let config = BootstrapConfig::from_file(&path).unwrap();
        assert_eq!(config.gitops.root_manifest, dir.path().join("apps/root.yaml"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_relative_manifest() {
        let mut config = BootstrapConfig::with_defaults();
        config.gitops.root_manifest = "argocd/root-app.yaml".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gitops.root_manifest"));
    }

    #[test]
    fn test_k3s_data_dir_follows_mount_point() {
        let mut config = BootstrapConfig::with_defaults();
        assert_eq!(config.k3s_data_dir(), Some(PathBuf::from("/mnt/ssd/k3s")));

        config.runtime.data_on_storage = false;
        assert_eq!(config.k3s_data_dir(), None);
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let example = include_str!("../config/pi-bootstrap.example.toml");
        let config: BootstrapConfig = toml::from_str(example).unwrap();
        assert_eq!(config, BootstrapConfig::with_defaults());
    }
}
