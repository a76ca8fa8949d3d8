//! Prerequisite checks run before the step sequence.
//!
//! Preflight fills in [`HostFacts`](crate::context::HostFacts) and sorts
//! every finding into pass, warning (logged, run continues) or failure
//! (run aborts before any step executes).
//!
//! Free space is only measured here when the storage device is already
//! mounted. Otherwise the mount point still sits on the boot filesystem, and
//! `mount-storage` checks the device once it is mounted.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BootstrapConfig;
use crate::context::RunContext;
use crate::error::{BootstrapError, Result};
use crate::mounts;
use crate::steps;

const MIB: u64 = 1024 * 1024;

/// Outcome of a single prerequisite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CheckStatus {
    Pass(String),
    Warn(String),
    Fail(String),
}

/// A named prerequisite result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub status: CheckStatus,
    pub install_instructions: String,
}

impl CheckOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.status, CheckStatus::Fail(_))
    }
}

type CheckFn = Box<dyn Fn(&RunContext) -> CheckStatus + Send + Sync>;

struct Requirement {
    name: String,
    check: CheckFn,
    install_instructions: String,
}

/// Validates tools and host resources.
pub struct PrerequisitesValidator {
    requirements: Vec<Requirement>,
}

impl PrerequisitesValidator {
    #[must_use]
    pub fn new(config: &BootstrapConfig) -> Self {
        let mut requirements = Vec::new();

        for tool in &config.resources.required_tools {
            let name = tool.clone();
            requirements.push(Requirement {
                name: tool.clone(),
                check: Box::new(move |ctx| match ctx.host().find_program(&name) {
                    Some(path) => CheckStatus::Pass(path.display().to_string()),
                    None => CheckStatus::Fail(format!("{name} not found on PATH")),
                }),
                install_instructions: format!("Install {tool} with the system package manager"),
            });
        }

        requirements.push(Requirement {
            name: "System Memory".to_string(),
            check: Box::new(|ctx| {
                let total_mb = ctx.host().total_memory() / MIB;
                let t = &ctx.config.resources;
                if total_mb < t.min_memory_mb {
                    CheckStatus::Fail(format!(
                        "{total_mb} MiB total, at least {} MiB required",
                        t.min_memory_mb
                    ))
                } else if total_mb < t.warn_memory_mb {
                    CheckStatus::Warn(format!(
                        "{total_mb} MiB total, {} MiB recommended",
                        t.warn_memory_mb
                    ))
                } else {
                    CheckStatus::Pass(format!("{total_mb} MiB"))
                }
            }),
            install_instructions: "Use a board with more RAM or disable optional workloads"
                .to_string(),
        });

        requirements.push(Requirement {
            name: "Free Disk".to_string(),
            check: Box::new(|ctx| {
                let t = &ctx.config.resources;
                let mount_point = &ctx.config.storage.mount_point;
                if !ctx.facts.storage_mounted {
                    return CheckStatus::Pass(format!(
                        "checked once {} is mounted",
                        mount_point.display()
                    ));
                }
                match ctx.facts.available_disk_bytes {
                    None => CheckStatus::Warn(format!(
                        "could not determine free space at {}",
                        mount_point.display()
                    )),
                    Some(bytes) => {
                        let free_mb = bytes / MIB;
                        if free_mb < t.min_disk_mb {
                            CheckStatus::Fail(format!(
                                "{free_mb} MiB free at {}, at least {} MiB required",
                                mount_point.display(),
                                t.min_disk_mb
                            ))
                        } else if free_mb < t.warn_disk_mb {
                            CheckStatus::Warn(format!(
                                "{free_mb} MiB free at {}, {} MiB recommended",
                                mount_point.display(),
                                t.warn_disk_mb
                            ))
                        } else {
                            CheckStatus::Pass(format!("{free_mb} MiB free"))
                        }
                    }
                }
            }),
            install_instructions: "Free up space or attach a larger storage device".to_string(),
        });

        Self { requirements }
    }

    /// Run every check, recording warnings on the context.
    pub fn check_all(&self, ctx: &mut RunContext) -> Vec<CheckOutcome> {
        let mut outcomes = Vec::with_capacity(self.requirements.len());

        for requirement in &self.requirements {
            let status = (requirement.check)(ctx);
            match &status {
                CheckStatus::Pass(detail) => {
                    debug!(check = %requirement.name, %detail, "Prerequisite met");
                }
                CheckStatus::Warn(detail) => {
                    warn!(check = %requirement.name, %detail, "Resource below recommended level");
                    ctx.warn(&requirement.name, detail);
                }
                CheckStatus::Fail(detail) => {
                    warn!(check = %requirement.name, %detail, "Prerequisite not met");
                }
            }
            outcomes.push(CheckOutcome {
                name: requirement.name.clone(),
                status,
                install_instructions: requirement.install_instructions.clone(),
            });
        }

        outcomes
    }

    /// Run every check and fail on the first hard failure.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::PrerequisiteFailed`] naming the first failed check.
    pub fn validate(&self, ctx: &mut RunContext) -> Result<Vec<CheckOutcome>> {
        let outcomes = self.check_all(ctx);
        ensure_passed(&outcomes)?;
        Ok(outcomes)
    }
}

/// Turn the first failed outcome into an error.
///
/// # Errors
///
/// Returns [`BootstrapError::PrerequisiteFailed`] naming the first failed check.
pub fn ensure_passed(outcomes: &[CheckOutcome]) -> Result<()> {
    match outcomes.iter().find_map(|o| match &o.status {
        CheckStatus::Fail(detail) => Some((o, detail)),
        _ => None,
    }) {
        Some((failed, detail)) => Err(BootstrapError::PrerequisiteFailed {
            check: failed.name.clone(),
            detail: detail.clone(),
        }),
        None => Ok(()),
    }
}

/// Record memory, disk and storage facts on the context.
pub fn gather_facts(ctx: &mut RunContext) {
    let host = ctx.host();
    let storage = &ctx.config.storage;

    let total_memory_bytes = host.total_memory();
    let storage_device_present = host.path_exists(&storage.device);
    let storage_mounted = match host.read_to_string(&storage.mounts_path) {
        Ok(table) => mounts::mounted_at(&mounts::parse_mount_table(&table), &storage.mount_point)
            .is_some_and(|e| steps::is_storage_device(host, &storage.device, &e.source)),
        Err(e) => {
            debug!(error = %e, "Mount table unreadable; assuming not mounted");
            false
        }
    };
    let available_disk_bytes = if storage_mounted {
        host.available_disk(&storage.mount_point)
    } else {
        None
    };

    ctx.facts.total_memory_bytes = total_memory_bytes;
    ctx.facts.available_disk_bytes = available_disk_bytes;
    ctx.facts.storage_device_present = storage_device_present;
    ctx.facts.storage_mounted = storage_mounted;

    info!(
        host = %ctx.hostname,
        memory_mb = total_memory_bytes / MIB,
        disk_free_mb = available_disk_bytes.map(|b| b / MIB),
        device_present = storage_device_present,
        mounted = storage_mounted,
        "Collected host facts"
    );
}

/// Gather facts and validate prerequisites.
///
/// # Errors
///
/// Returns [`BootstrapError::PrerequisiteFailed`] if a hard requirement is unmet.
pub fn run(ctx: &mut RunContext) -> Result<Vec<CheckOutcome>> {
    gather_facts(ctx);
    PrerequisitesValidator::new(&ctx.config).validate(ctx)
}

/// Gather facts and run every check without failing, for display.
pub fn collect(ctx: &mut RunContext) -> Vec<CheckOutcome> {
    gather_facts(ctx);
    PrerequisitesValidator::new(&ctx.config).check_all(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockHost;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn host_with(memory_mb: u64, disk_mb: Option<u64>, tools_present: bool) -> MockHost {
        let mut host = MockHost::new();
        host.expect_hostname().return_const("pi".to_string());
        host.expect_total_memory().return_const(memory_mb * MIB);
        host.expect_available_disk()
            .return_const(disk_mb.map(|d| d * MIB));
        host.expect_find_program()
            .returning(move |name| tools_present.then(|| PathBuf::from("/usr/bin").join(name)));
        host.expect_path_exists().return_const(true);
        host.expect_canonicalize()
            .returning(|p| Some(p.to_path_buf()));
        host.expect_read_to_string()
            .returning(|_| Ok("/dev/sda1 /mnt/ssd ext4 rw 0 0\n".to_string()));
        host
    }

    fn context(host: MockHost) -> RunContext {
        RunContext::new(BootstrapConfig::with_defaults(), Arc::new(host))
    }

    #[test]
    fn test_healthy_host_passes_without_warnings() {
        let mut ctx = context(host_with(8192, Some(100_000), true));
        let outcomes = run(&mut ctx).unwrap();

        assert!(outcomes.iter().all(|o| matches!(o.status, CheckStatus::Pass(_))));
        assert!(ctx.warnings.is_empty());
        assert!(ctx.facts.storage_mounted);
        assert!(ctx.facts.storage_device_present);
    }

    #[test]
    fn test_low_memory_above_minimum_only_warns() {
        let mut ctx = context(host_with(1024, Some(100_000), true));
        let outcomes = run(&mut ctx).unwrap();

        assert_eq!(ctx.warnings.len(), 1);
        assert_eq!(ctx.warnings[0].resource, "System Memory");
        assert!(outcomes
            .iter()
            .any(|o| o.name == "System Memory" && matches!(o.status, CheckStatus::Warn(_))));
    }

    #[test]
    fn test_memory_below_hard_minimum_fails() {
        let mut ctx = context(host_with(256, Some(100_000), true));
        let err = run(&mut ctx).unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::PrerequisiteFailed { ref check, .. } if check == "System Memory"
        ));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_low_disk_warns_and_unknown_disk_warns() {
        let mut ctx = context(host_with(8192, Some(4096), true));
        run(&mut ctx).unwrap();
        assert_eq!(ctx.warnings[0].resource, "Free Disk");

        let mut ctx = context(host_with(8192, None, true));
        run(&mut ctx).unwrap();
        assert_eq!(ctx.warnings.len(), 1);
    }

    #[test]
    fn test_full_boot_disk_does_not_block_unmounted_storage() {
        let mut host = MockHost::new();
        host.expect_hostname().return_const("pi".to_string());
        host.expect_total_memory().return_const(8192 * MIB);
        // Before mounting, the mount point resolves to the nearly full SD card.
        host.expect_available_disk().return_const(Some(100 * MIB));
        host.expect_find_program()
            .returning(|name| Some(PathBuf::from("/usr/bin").join(name)));
        host.expect_path_exists().return_const(true);
        host.expect_canonicalize()
            .returning(|p| Some(p.to_path_buf()));
        host.expect_read_to_string()
            .returning(|_| Ok("/dev/mmcblk0p2 / ext4 rw 0 0\n".to_string()));
        let mut ctx = context(host);

        let outcomes = run(&mut ctx).unwrap();

        assert!(!ctx.facts.storage_mounted);
        assert!(ctx.warnings.is_empty());
        let disk = outcomes.iter().find(|o| o.name == "Free Disk").unwrap();
        assert!(matches!(disk.status, CheckStatus::Pass(ref d) if d.contains("/mnt/ssd")));
    }

    #[test]
    fn test_device_link_counts_as_mounted() {
        let mut host = MockHost::new();
        host.expect_hostname().return_const("pi".to_string());
        host.expect_total_memory().return_const(8192 * MIB);
        host.expect_available_disk().return_const(Some(100_000 * MIB));
        host.expect_find_program()
            .returning(|name| Some(PathBuf::from("/usr/bin").join(name)));
        host.expect_path_exists().return_const(true);
        host.expect_canonicalize().returning(|p| {
            if p == Path::new("/dev/disk/by-label/ssd") {
                Some(PathBuf::from("/dev/sda1"))
            } else {
                Some(p.to_path_buf())
            }
        });
        host.expect_read_to_string()
            .returning(|_| Ok("/dev/sda1 /mnt/ssd ext4 rw 0 0\n".to_string()));
        let mut config = BootstrapConfig::with_defaults();
        config.storage.device = "/dev/disk/by-label/ssd".into();
        let mut ctx = RunContext::new(config, Arc::new(host));

        gather_facts(&mut ctx);

        assert!(ctx.facts.storage_mounted);
    }

    #[test]
    fn test_collect_keeps_failures_for_display() {
        let mut ctx = context(host_with(256, Some(100_000), true));
        let outcomes = collect(&mut ctx);

        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().any(CheckOutcome::is_failure));
        assert!(ensure_passed(&outcomes).is_err());
    }

    #[test]
    fn test_missing_tool_fails_first() {
        let mut ctx = context(host_with(8192, Some(100_000), false));
        let err = run(&mut ctx).unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::PrerequisiteFailed { ref check, .. } if check == "sh"
        ));
    }
}
