//! External storage mount and unmount.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::{BootstrapError, Result};
use crate::host::{Host, HostCommand};
use crate::mounts::{self, MountEntry};
use crate::step::Step;

const MIB: u64 = 1024 * 1024;

/// Whether a mount table source is the configured device.
///
/// The kernel records the resolved node (`/dev/sda1`) even when the device
/// was configured through a `/dev/disk/by-*` link, so both sides are
/// resolved before comparing.
pub(crate) fn is_storage_device(host: &dyn Host, device: &Path, source: &Path) -> bool {
    if source == device {
        return true;
    }
    match (host.canonicalize(device), host.canonicalize(source)) {
        (Some(device), Some(source)) => device == source,
        _ => false,
    }
}

fn current_mount(ctx: &RunContext) -> Result<Option<MountEntry>> {
    let storage = &ctx.config.storage;
    let table = ctx.host().read_to_string(&storage.mounts_path)?;
    let entries = mounts::parse_mount_table(&table);
    Ok(mounts::mounted_at(&entries, &storage.mount_point).cloned())
}

fn mounted_from_device(ctx: &RunContext) -> Result<bool> {
    Ok(current_mount(ctx)?
        .is_some_and(|e| is_storage_device(ctx.host(), &ctx.config.storage.device, &e.source)))
}

/// Free space on the mounted device, checked against the resource thresholds.
fn check_free_space(ctx: &RunContext) -> Result<()> {
    let mount_point = &ctx.config.storage.mount_point;
    let thresholds = &ctx.config.resources;
    let Some(bytes) = ctx.host().available_disk(mount_point) else {
        warn!(mount_point = %mount_point.display(), "Could not determine free space");
        return Ok(());
    };

    let free_mb = bytes / MIB;
    if free_mb < thresholds.min_disk_mb {
        return Err(BootstrapError::MissingRequiredResource {
            resource: mount_point.display().to_string(),
            detail: format!(
                "{free_mb} MiB free, at least {} MiB required",
                thresholds.min_disk_mb
            ),
        });
    }
    if free_mb < thresholds.warn_disk_mb {
        warn!(
            mount_point = %mount_point.display(),
            free_mb,
            recommended_mb = thresholds.warn_disk_mb,
            "Storage below recommended free space"
        );
    }
    Ok(())
}

fn fstab_has_entry(ctx: &RunContext) -> Result<bool> {
    let storage = &ctx.config.storage;
    if !ctx.host().path_exists(&storage.fstab_path) {
        return Ok(false);
    }
    let fstab = ctx.host().read_to_string(&storage.fstab_path)?;
    Ok(mounts::has_entry_for(
        &mounts::parse_mount_table(&fstab),
        &storage.mount_point,
    ))
}

/// Mounts the storage device and persists it in fstab.
pub struct MountStorage;

impl Step for MountStorage {
    fn name(&self) -> &'static str {
        "mount-storage"
    }

    fn description(&self) -> &'static str {
        "Mount external storage"
    }

    fn check_precondition(&self, ctx: &RunContext) -> Result<bool> {
        if !mounted_from_device(ctx)? {
            return Ok(false);
        }
        if ctx.config.storage.persist_mount {
            return fstab_has_entry(ctx);
        }
        Ok(true)
    }

    fn execute(&self, ctx: &RunContext) -> Result<()> {
        let storage = &ctx.config.storage;
        let host = ctx.host();

        if !host.path_exists(&storage.device) {
            return Err(BootstrapError::MissingRequiredResource {
                resource: storage.device.display().to_string(),
                detail: "storage device not present; is the drive attached?".into(),
            });
        }

        match current_mount(ctx)? {
            Some(entry) if is_storage_device(host, &storage.device, &entry.source) => {
                debug!(mount_point = %storage.mount_point.display(), "Already mounted");
            }
            Some(entry) => {
                return Err(BootstrapError::fault(
                    format!("Mount point {} is busy", storage.mount_point.display()),
                    format!("already mounted from {}", entry.source.display()),
                ));
            }
            None => {
                host.create_dir_all(&storage.mount_point)?;
                let command = HostCommand::new("mount")
                    .args(["-t", storage.fs_type.as_str()])
                    .arg(storage.device.to_string_lossy())
                    .arg(storage.mount_point.to_string_lossy());
                info!(command = %command, "Mounting storage");
                host.run(&command)?.check("mount")?;
            }
        }

        check_free_space(ctx)?;

        if storage.persist_mount && !fstab_has_entry(ctx)? {
            let line = mounts::fstab_line(&storage.device, &storage.mount_point, &storage.fs_type);
            info!(fstab = %storage.fstab_path.display(), %line, "Persisting mount");
            host.append_line(&storage.fstab_path, &line)?;
        }

        Ok(())
    }

    fn check_postcondition(&self, ctx: &RunContext) -> Result<bool> {
        mounted_from_device(ctx)
    }
}

/// Unmounts the storage device. The fstab entry is left in place.
pub struct UnmountStorage;

impl Step for UnmountStorage {
    fn name(&self) -> &'static str {
        "unmount-storage"
    }

    fn description(&self) -> &'static str {
        "Unmount external storage"
    }

    fn check_precondition(&self, ctx: &RunContext) -> Result<bool> {
        Ok(current_mount(ctx)?.is_none())
    }

    fn execute(&self, ctx: &RunContext) -> Result<()> {
        let mount_point = &ctx.config.storage.mount_point;
        let command = HostCommand::new("umount").arg(mount_point.to_string_lossy());
        ctx.host().run(&command)?.check("umount")?;
        Ok(())
    }
}
