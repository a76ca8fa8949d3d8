//! A simulated Raspberry Pi for end-to-end runs.
//!
//! `FakePi` keeps just enough state (mount table, fstab, K3s service,
//! cluster objects) to answer the commands the steps issue, and records
//! every command it was asked to run.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pi_bootstrap::{
    BootstrapConfig, BootstrapError, CommandOutput, Host, HostCommand, ManualClock, Orchestrator,
    Result, RunContext, WaitPolicy,
};

pub const ROOT_MANIFEST: &str = "/etc/pi-bootstrap/root-app.yaml";
pub const ROOT_APP: &str = "\
apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: root
  namespace: argocd
spec:
  project: default
  source:
    repoURL: https://github.com/example/homelab
    path: apps
";

const MIB: u64 = 1024 * 1024;
const DEVICE: &str = "/dev/sda1";
pub const DEVICE_LINK: &str = "/dev/disk/by-uuid/1234-abcd";
const MOUNT_POINT: &str = "/mnt/ssd";

#[derive(Debug)]
pub struct PiState {
    pub device_present: bool,
    pub mounted: bool,
    pub fstab: String,
    pub k3s_installed: bool,
    pub k3s_active: bool,
    /// `get nodes` queries answered NotReady before the node turns Ready.
    /// `None` keeps it NotReady forever.
    pub node_ready_after: Option<usize>,
    pub node_queries: usize,
    /// `rollout status` queries answered "in progress" after Argo CD is
    /// applied. `None` never finishes.
    pub rollout_ready_after: Option<usize>,
    pub rollout_queries: usize,
    /// When set, every kubectl call fails with this stderr.
    pub api_error: Option<String>,
    pub argocd_namespace: bool,
    pub argocd_installed: bool,
    pub root_app: bool,
    pub memory_mb: u64,
    /// Free space on the SD card, seen at the mount point while unmounted.
    pub root_disk_mb: Option<u64>,
    pub ssd_disk_mb: Option<u64>,
    pub commands: Vec<String>,
}

impl Default for PiState {
    fn default() -> Self {
        Self {
            device_present: true,
            mounted: false,
            fstab: "proc /proc proc defaults 0 0\n".to_string(),
            k3s_installed: false,
            k3s_active: false,
            node_ready_after: Some(2),
            node_queries: 0,
            rollout_ready_after: Some(2),
            rollout_queries: 0,
            api_error: None,
            argocd_namespace: false,
            argocd_installed: false,
            root_app: false,
            memory_mb: 8192,
            root_disk_mb: Some(20_000),
            ssd_disk_mb: Some(200_000),
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakePi {
    state: Mutex<PiState>,
}

impl FakePi {
    pub fn new(state: PiState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn fresh() -> Arc<Self> {
        Self::new(PiState::default())
    }

    pub fn state(&self) -> MutexGuard<'_, PiState> {
        self.state.lock().unwrap()
    }

    /// Index of the first recorded command containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.state().commands.iter().position(|c| c.contains(needle))
    }

    /// Number of recorded commands containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.state()
            .commands
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }

    /// Number of times `program` ran with an argument line containing `needle`.
    pub fn count_runs(&self, program: &str, needle: &str) -> usize {
        let prefix = format!("{program} ");
        self.state()
            .commands
            .iter()
            .filter(|c| c.starts_with(&prefix) && c.contains(needle))
            .count()
    }

    fn kubectl(state: &mut PiState, args: &[String], stdin: Option<&str>) -> CommandOutput {
        if let Some(err) = &state.api_error {
            return CommandOutput::failed(1, err.clone());
        }
        // Drop `--kubeconfig <path>`.
        let args: Vec<&str> = args.iter().skip(2).map(String::as_str).collect();
        let found = |present: bool, name: &str| {
            if present {
                CommandOutput::ok(format!("{name}\n"))
            } else {
                CommandOutput::ok("")
            }
        };

        match args.as_slice() {
            ["create", "namespace", ns, ..] => {
                let manifest = format!("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {ns}\n");
                CommandOutput::ok(manifest)
            }
            ["get", "nodes", ..] => {
                state.node_queries += 1;
                let ready = state
                    .node_ready_after
                    .is_some_and(|n| state.node_queries > n);
                CommandOutput::ok(format!("pi-node={}\n", if ready { "True" } else { "False" }))
            }
            ["get", "deployment", "argocd-server", ..] => {
                found(state.argocd_installed, "deployment.apps/argocd-server")
            }
            ["get", "namespace", "argocd", ..] => {
                found(state.argocd_namespace, "namespace/argocd")
            }
            ["get", "applications.argoproj.io", "root", ..] => {
                found(state.root_app, "application.argoproj.io/root")
            }
            ["rollout", "status", ..] if state.argocd_installed => {
                state.rollout_queries += 1;
                let done = state
                    .rollout_ready_after
                    .is_some_and(|n| state.rollout_queries > n);
                if done {
                    CommandOutput::ok("deployment \"argocd-server\" successfully rolled out\n")
                } else {
                    CommandOutput::failed(1, "error: timed out waiting for the condition")
                }
            }
            ["rollout", "status", ..] => {
                CommandOutput::failed(1, "deployments.apps \"argocd-server\" not found")
            }
            ["apply", "--server-side", ..] => {
                state.argocd_installed = true;
                state.rollout_queries = 0;
                CommandOutput::ok("")
            }
            ["apply", ..] => match stdin {
                Some(y) if y.contains("kind: Namespace") => {
                    state.argocd_namespace = true;
                    CommandOutput::ok("namespace/argocd created\n")
                }
                Some(y) if y.contains("kind: Application") => {
                    state.root_app = true;
                    CommandOutput::ok("application.argoproj.io/root created\n")
                }
                _ => CommandOutput::failed(1, "error: no objects passed to apply"),
            },
            ["delete", "namespace", ..] => {
                state.argocd_namespace = false;
                state.argocd_installed = false;
                state.root_app = false;
                CommandOutput::ok("")
            }
            ["delete", ..] => {
                state.root_app = false;
                CommandOutput::ok("")
            }
            _ => CommandOutput::failed(1, format!("unexpected kubectl call: {args:?}")),
        }
    }
}

impl Host for FakePi {
    fn hostname(&self) -> String {
        "pi-node".to_string()
    }

    fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        let mut state = self.state();
        state.commands.push(command.to_string());
        let args = &command.args;

        let output = match command.program.as_str() {
            "mount" => {
                if state.device_present {
                    state.mounted = true;
                    CommandOutput::ok("")
                } else {
                    CommandOutput::failed(32, "mount: special device /dev/sda1 does not exist")
                }
            }
            "umount" => {
                state.mounted = false;
                CommandOutput::ok("")
            }
            "curl" => CommandOutput::ok(""),
            "sh" if args.first().is_some_and(|a| a.ends_with("k3s-install.sh")) => {
                state.k3s_installed = true;
                state.k3s_active = true;
                state.node_queries = 0;
                CommandOutput::ok("[INFO]  systemd: Starting k3s\n")
            }
            "sh" if args.first().is_some_and(|a| a.ends_with("k3s-uninstall.sh")) => {
                state.k3s_installed = false;
                state.k3s_active = false;
                state.argocd_namespace = false;
                state.argocd_installed = false;
                state.root_app = false;
                CommandOutput::ok("")
            }
            "systemctl" => match args.first().map(String::as_str) {
                Some("is-active") if state.k3s_active => CommandOutput::ok(""),
                Some("is-active") => CommandOutput::failed(3, ""),
                Some("start") if state.k3s_installed => {
                    state.k3s_active = true;
                    CommandOutput::ok("")
                }
                _ => CommandOutput::failed(5, "Unit k3s.service not found."),
            },
            "kubectl" => Self::kubectl(&mut state, args, command.stdin.as_deref()),
            other => {
                return Err(BootstrapError::fault(
                    format!("Failed to spawn {other}"),
                    "No such file or directory",
                ))
            }
        };
        Ok(output)
    }

    fn path_exists(&self, path: &Path) -> bool {
        let state = self.state();
        match path.to_str().unwrap_or_default() {
            DEVICE | DEVICE_LINK => state.device_present,
            "/etc/rancher/k3s/k3s.yaml" | "/usr/local/bin/k3s-uninstall.sh" => state.k3s_installed,
            "/etc/fstab" | MOUNT_POINT | ROOT_MANIFEST => true,
            _ => false,
        }
    }

    fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        match path.to_str().unwrap_or_default() {
            DEVICE_LINK if self.state().device_present => Some(PathBuf::from(DEVICE)),
            DEVICE_LINK => None,
            _ => Some(path.to_path_buf()),
        }
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.state();
        match path.to_str().unwrap_or_default() {
            "/proc/mounts" => {
                let mut table = "/dev/mmcblk0p2 / ext4 rw,noatime 0 0\n".to_string();
                if state.mounted {
                    table.push_str("/dev/sda1 /mnt/ssd ext4 rw,relatime 0 0\n");
                }
                Ok(table)
            }
            "/etc/fstab" => Ok(state.fstab.clone()),
            ROOT_MANIFEST => Ok(ROOT_APP.to_string()),
            other => Err(BootstrapError::fault(
                format!("Failed to read {other}"),
                "No such file or directory",
            )),
        }
    }

    fn create_dir_all(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        assert_eq!(path, Path::new("/etc/fstab"));
        let mut state = self.state();
        state.fstab.push_str(line);
        state.fstab.push('\n');
        Ok(())
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        let state = self.state();
        match name {
            "k3s" | "kubectl" if state.k3s_installed => {
                Some(PathBuf::from("/usr/local/bin").join(name))
            }
            "k3s" | "kubectl" => None,
            _ => Some(PathBuf::from("/usr/bin").join(name)),
        }
    }

    fn total_memory(&self) -> u64 {
        self.state().memory_mb * MIB
    }

    fn available_disk(&self, path: &Path) -> Option<u64> {
        let state = self.state();
        let mb = if state.mounted && path.starts_with(MOUNT_POINT) {
            state.ssd_disk_mb
        } else {
            state.root_disk_mb
        };
        mb.map(|mb| mb * MIB)
    }
}

pub fn context(pi: &Arc<FakePi>) -> RunContext {
    context_with(pi, BootstrapConfig::with_defaults())
}

pub fn context_with(pi: &Arc<FakePi>, config: BootstrapConfig) -> RunContext {
    RunContext::new(config, Arc::clone(pi) as Arc<dyn Host>)
}

/// Orchestrator on a virtual clock with the default 5 s / 300 s policy.
pub fn orchestrator(clock: &Arc<ManualClock>) -> Orchestrator {
    Orchestrator::new(WaitPolicy::new(
        Duration::from_secs(5),
        Duration::from_secs(300),
    ))
    .with_clock(Arc::clone(clock) as Arc<dyn pi_bootstrap::Clock>)
}
